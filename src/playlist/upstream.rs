//! Upstream media playlist parsing
//!
//! The transcoder writes a plain media playlist next to its segments. Only
//! the fields the view builder needs are kept: target duration, the
//! media-sequence base, and the ordered segment list.

use std::path::Path;

use crate::error::{Result, SubtitleError};

/// One segment entry: duration from its `#EXTINF` line plus the URI line
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    pub duration_secs: f64,
    pub uri: String,
}

/// Parsed upstream media playlist
#[derive(Debug, Clone)]
pub struct UpstreamPlaylist {
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<SegmentEntry>,
}

impl UpstreamPlaylist {
    /// Parse a media playlist body
    pub fn parse(body: &str) -> Result<Self> {
        let mut target_duration = None;
        let mut media_sequence = 0u64;
        let mut segments = Vec::new();
        let mut pending_duration: Option<f64> = None;

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                target_duration = Some(value.trim().parse::<u64>().map_err(|_| {
                    SubtitleError::PlaylistParse(format!("bad target duration: {value}"))
                })?);
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                media_sequence = value.trim().parse::<u64>().map_err(|_| {
                    SubtitleError::PlaylistParse(format!("bad media sequence: {value}"))
                })?;
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let duration = value
                    .split(',')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| {
                        SubtitleError::PlaylistParse(format!("bad EXTINF duration: {value}"))
                    })?;
                pending_duration = Some(duration);
            } else if line.starts_with('#') {
                // Unrelated tag (VERSION, ENDLIST, ...)
                continue;
            } else if let Some(duration_secs) = pending_duration.take() {
                segments.push(SegmentEntry {
                    duration_secs,
                    uri: line.to_string(),
                });
            }
        }

        let target_duration = target_duration.ok_or_else(|| {
            SubtitleError::PlaylistParse("missing #EXT-X-TARGETDURATION".to_string())
        })?;

        Ok(Self {
            target_duration,
            media_sequence,
            segments,
        })
    }

    /// Read and parse the playlist file
    ///
    /// A missing file is reported as `PlaylistNotFound` so callers can
    /// answer 404 without treating it as a server fault.
    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SubtitleError::PlaylistNotFound(path.display().to_string())
            } else {
                SubtitleError::Io(e)
            }
        })?;
        Self::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#EXTM3U\n\
        #EXT-X-VERSION:3\n\
        #EXT-X-TARGETDURATION:2\n\
        #EXT-X-MEDIA-SEQUENCE:17\n\
        #EXTINF:2.000000,\n\
        seg00017.ts\n\
        #EXTINF:2.000000,\n\
        seg00018.ts\n\
        #EXTINF:1.500000,\n\
        seg00019.ts\n";

    #[test]
    fn test_parse_sample() {
        let playlist = UpstreamPlaylist::parse(SAMPLE).unwrap();
        assert_eq!(playlist.target_duration, 2);
        assert_eq!(playlist.media_sequence, 17);
        assert_eq!(playlist.segments.len(), 3);
        assert_eq!(playlist.segments[0].uri, "seg00017.ts");
        assert_eq!(playlist.segments[2].duration_secs, 1.5);
    }

    #[test]
    fn test_parse_missing_target_duration() {
        let err = UpstreamPlaylist::parse("#EXTM3U\n#EXTINF:2.0,\nseg0.ts\n").unwrap_err();
        assert!(err.to_string().contains("TARGETDURATION"));
    }

    #[test]
    fn test_parse_defaults_media_sequence_to_zero() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\na.ts\n";
        let playlist = UpstreamPlaylist::parse(body).unwrap();
        assert_eq!(playlist.media_sequence, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = UpstreamPlaylist::load(Path::new("/nonexistent/source.m3u8")).unwrap_err();
        assert!(matches!(err, SubtitleError::PlaylistNotFound(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.m3u8");
        std::fs::write(&path, SAMPLE).unwrap();
        let playlist = UpstreamPlaylist::load(&path).unwrap();
        assert_eq!(playlist.segments.len(), 3);
    }
}
