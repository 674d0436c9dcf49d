//! Session data model
//!
//! Settings for a subtitling run with their derived values, plus the
//! per-slot records the engine accumulates: raw captions as they arrive,
//! the fusion result, and the fused-caption history entries.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{Result, SubtitleError};

/// Maximum caption length in characters; longer submissions are truncated
pub const MAX_CAPTION_CHARS: usize = 500;

/// How captions flow during a live run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Slot rotation with overlap fusion
    Fragmentation,
    /// Captions go straight to spectators with a display timestamp
    Direct,
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Fragmentation
    }
}

/// Admin-set session settings, validated before a run starts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Segment duration the transcoder was configured with, in seconds
    pub segment_duration: u64,

    /// Spectator delay in seconds
    pub delay_sec: u64,

    /// Slot duration D in seconds
    pub slot_duration: u64,

    /// Overlap O between consecutive slots in seconds
    pub overlap_duration: u64,

    /// Grace period as a percentage of the slot duration (0..=100)
    pub grace_percent: u64,

    /// Lead time for ending/prepare notices in seconds
    pub notify_before: u64,

    /// Number of subtitlers R required for rotation
    pub required_subtitlers: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            segment_duration: 4,
            delay_sec: 30,
            slot_duration: 15,
            overlap_duration: 5,
            grace_percent: 20,
            notify_before: 3,
            required_subtitlers: 2,
        }
    }
}

impl SessionSettings {
    /// Stride S = D - O: offset between consecutive slot starts
    pub fn stride(&self) -> u64 {
        self.slot_duration.saturating_sub(self.overlap_duration)
    }

    /// Grace G = floor(D * g / 100)
    pub fn grace(&self) -> u64 {
        self.slot_duration * self.grace_percent / 100
    }

    /// Submission deadline relative to slot start: D + G
    pub fn submit_deadline(&self) -> u64 {
        self.slot_duration + self.grace()
    }

    /// Minimum subtitler count so that a subtitler's next slot never opens
    /// before the previous one's submit deadline: ceil((D + G) / S)
    pub fn min_required(&self) -> usize {
        let stride = self.stride();
        if stride == 0 {
            return usize::MAX;
        }
        (self.submit_deadline().div_ceil(stride)) as usize
    }

    /// Minimum spectator delay: max(segmentDuration, D + G)
    pub fn min_delay(&self) -> u64 {
        self.segment_duration.max(self.submit_deadline())
    }

    /// Validate the settings as a whole
    pub fn validate(&self) -> Result<()> {
        if self.slot_duration == 0 {
            return Err(SubtitleError::Config(
                "slotDuration must be greater than 0".to_string(),
            ));
        }
        if self.overlap_duration >= self.slot_duration {
            return Err(SubtitleError::Config(format!(
                "overlapDuration ({}) must be less than slotDuration ({})",
                self.overlap_duration, self.slot_duration
            )));
        }
        if self.grace_percent > 100 {
            return Err(SubtitleError::Config(format!(
                "gracePercent must be within 0..=100, got {}",
                self.grace_percent
            )));
        }
        let min_required = self.min_required();
        if self.required_subtitlers < min_required {
            return Err(SubtitleError::Config(format!(
                "requiredSubtitlers ({}) is below minRequired={}: a subtitler \
                 would be handed a new slot before their previous submit deadline",
                self.required_subtitlers, min_required
            )));
        }
        self.validate_delay(self.delay_sec)
    }

    /// Validate a spectator delay against the derived minimum
    pub fn validate_delay(&self, delay_sec: u64) -> Result<()> {
        let min_delay = self.min_delay();
        if delay_sec < min_delay {
            return Err(SubtitleError::DelayOutOfRange(format!(
                "delaySec ({}) is below minDelay={}",
                delay_sec, min_delay
            )));
        }
        Ok(())
    }
}

/// A connected subtitler as seen by the rotation
#[derive(Debug, Clone)]
pub struct Subtitler {
    pub id: Uuid,
    pub name: String,
    /// Monotonic join instant; the rotation order is ascending joined_at
    pub joined_at: Instant,
}

/// One caption submission as received by the gate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCaption {
    pub text: String,
    /// Video offset the caption refers to, capped at the slot body end
    #[serde(rename = "videoTimestamp")]
    pub video_timestamp_ms: u64,
    /// Wall-clock arrival, epoch milliseconds
    #[serde(rename = "receivedAt")]
    pub received_at_ms: u64,
    pub auto_sent: bool,
}

/// Lifecycle of a slot record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotPhase {
    /// Accepting submissions from the assigned subtitler
    Open,
    /// Past the slot body, inside the grace window
    Grace,
    /// Grace elapsed, waiting out the settle window before fusion
    Closing,
    /// Final text computed
    Fused,
}

/// One record per started slot
#[derive(Debug, Clone)]
pub struct Slot {
    /// Strictly increasing from 0, never reused
    pub slot_index: u64,

    /// Assignment captured at start time; never reassigned
    pub subtitler_id: Uuid,
    pub subtitler_name: String,

    /// Monotonic start instant; every deadline derives from this
    pub started: Instant,
    /// Wall-clock start, epoch milliseconds
    pub start_at_ms: u64,
    /// now - liveStartedAt at slot start
    pub start_video_offset_ms: u64,

    /// Filled at grace end
    pub end_at_ms: Option<u64>,
    pub end_video_offset_ms: Option<u64>,

    /// Received raw captions in arrival order
    pub captions: Vec<RawCaption>,

    /// Token count trimmed off this slot's start; set when the NEXT slot
    /// finalizes
    pub overlap_from_prev: Option<usize>,

    /// The text actually emitted to spectators
    pub final_text: String,
    pub sent: bool,

    pub phase: SlotPhase,
}

impl Slot {
    /// Concatenated raw text of all received captions, in arrival order
    pub fn raw_text(&self) -> String {
        self.captions
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A fused caption as appended to the history on emission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedCaption {
    pub id: Uuid,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
    /// The emitting slot's start video offset
    #[serde(rename = "videoTimestamp")]
    pub video_timestamp_ms: u64,
    /// Slot the text belongs to
    pub slot_index: u64,
    /// Slot whose finalization triggered the emission
    pub next_slot_index: u64,
    /// Tokens removed from the start of `next_slot_index`'s text
    pub overlap_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(d: u64, o: u64, g: u64, r: usize) -> SessionSettings {
        SessionSettings {
            segment_duration: 2,
            delay_sec: 60,
            slot_duration: d,
            overlap_duration: o,
            grace_percent: g,
            notify_before: 3,
            required_subtitlers: r,
        }
    }

    #[test]
    fn test_derived_values() {
        let s = settings(10, 5, 40, 3);
        assert_eq!(s.stride(), 5);
        assert_eq!(s.grace(), 4);
        assert_eq!(s.submit_deadline(), 14);
        assert_eq!(s.min_required(), 3);
        assert_eq!(s.min_delay(), 14);
    }

    #[test]
    fn test_min_required_exact_division() {
        // D=6, O=0, g=0: deadline 6, stride 6 -> a single subtitler suffices
        let s = settings(6, 0, 0, 1);
        assert_eq!(s.min_required(), 1);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_refuses_short_roster() {
        // Scenario: D=10, O=5, g=40 -> minRequired=3, R=2 refused
        let s = settings(10, 5, 40, 2);
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("minRequired=3"), "got: {err}");
    }

    #[test]
    fn test_refuses_overlap_not_below_duration() {
        let s = settings(10, 10, 0, 5);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_refuses_grace_percent_above_100() {
        let s = settings(10, 0, 101, 5);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_delay_floor() {
        let s = settings(10, 4, 0, 3);
        assert_eq!(s.min_delay(), 10);
        assert!(s.validate_delay(9).is_err());
        assert!(s.validate_delay(10).is_ok());
    }

    #[test]
    fn test_raw_text_concatenation() {
        let slot = Slot {
            slot_index: 0,
            subtitler_id: Uuid::new_v4(),
            subtitler_name: "S1".to_string(),
            started: Instant::now(),
            start_at_ms: 0,
            start_video_offset_ms: 0,
            end_at_ms: None,
            end_video_offset_ms: None,
            captions: vec![
                RawCaption {
                    text: "un deux".to_string(),
                    video_timestamp_ms: 0,
                    received_at_ms: 0,
                    auto_sent: false,
                },
                RawCaption {
                    text: "trois".to_string(),
                    video_timestamp_ms: 0,
                    received_at_ms: 0,
                    auto_sent: true,
                },
            ],
            overlap_from_prev: None,
            final_text: String::new(),
            sent: false,
            phase: SlotPhase::Open,
        };
        assert_eq!(slot.raw_text(), "un deux trois");
    }
}
