//! Derived live and delayed playlist views
//!
//! The live view trails the upstream playlist's tail; the delayed view is
//! shifted backward by `floor(delaySec / targetDuration)` segments so that
//! spectators see picture matching the fused captions.

use std::path::PathBuf;

use crate::error::{Result, SubtitleError};
use crate::playlist::upstream::{SegmentEntry, UpstreamPlaylist};

/// Presence and size of the upstream playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistStatus {
    pub has_manifest: bool,
    pub segment_count: usize,
}

/// Builds live and delayed views from the upstream playlist file
#[derive(Debug, Clone)]
pub struct PlaylistViewBuilder {
    source_path: PathBuf,
    window_size: usize,
}

impl PlaylistViewBuilder {
    pub fn new(source_path: PathBuf, window_size: usize) -> Self {
        Self {
            source_path,
            window_size,
        }
    }

    /// Playlist for the live edge: the last `min(window, total)` segments,
    /// with the media sequence advanced past the dropped head
    pub fn live_view(&self) -> Result<String> {
        let upstream = UpstreamPlaylist::load(&self.source_path)?;
        let total = upstream.segments.len();
        let kept = total.min(self.window_size);
        let start = total - kept;
        Ok(render_media_playlist(
            upstream.target_duration,
            upstream.media_sequence + start as u64,
            &upstream.segments[start..],
        ))
    }

    /// Playlist shifted backward by the spectator delay
    ///
    /// Fails with `NotEnoughSegments` while the transcoder has not yet
    /// produced `floor(delaySec / targetDuration)` segments.
    pub fn delayed_view(&self, delay_sec: u64) -> Result<String> {
        let upstream = UpstreamPlaylist::load(&self.source_path)?;
        let total = upstream.segments.len();
        let delay_segs = (delay_sec / upstream.target_duration) as usize;
        if total <= delay_segs {
            return Err(SubtitleError::NotEnoughSegments);
        }
        let end_idx = total - delay_segs;
        let start = end_idx.saturating_sub(self.window_size);
        Ok(render_media_playlist(
            upstream.target_duration,
            upstream.media_sequence + start as u64,
            &upstream.segments[start..end_idx],
        ))
    }

    /// Soft status: manifest presence and segment count
    pub fn status(&self) -> PlaylistStatus {
        match UpstreamPlaylist::load(&self.source_path) {
            Ok(upstream) => PlaylistStatus {
                has_manifest: true,
                segment_count: upstream.segments.len(),
            },
            Err(_) => PlaylistStatus {
                has_manifest: false,
                segment_count: 0,
            },
        }
    }
}

/// Render a live media playlist window (no ENDLIST: the stream is ongoing)
fn render_media_playlist(
    target_duration: u64,
    media_sequence: u64,
    segments: &[SegmentEntry],
) -> String {
    let mut output = String::new();
    output.push_str("#EXTM3U\n");
    output.push_str("#EXT-X-VERSION:3\n");
    output.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", target_duration));
    output.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", media_sequence));
    for segment in segments {
        output.push_str(&format!("#EXTINF:{:.6},\n", segment.duration_secs));
        output.push_str(&segment.uri);
        output.push('\n');
    }
    output
}
