//! Submission gate
//!
//! Validates an incoming caption against the open-slot map and attaches
//! it to the correct slot. Outside fragment mode captions bypass the gate
//! and go straight to spectators with a display timestamp.

use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{Result, SubtitleError};
use crate::messages::{CaptionEcho, ServerMessage};
use crate::session::engine::Engine;
use crate::session::types::{RawCaption, MAX_CAPTION_CHARS};
use crate::timer::epoch_ms;

enum GateOutcome {
    /// Fragment mode off: forward with a display timestamp
    Direct { delay_sec: u64 },
    /// Attached to a slot
    Accepted { caption: RawCaption, slot_index: u64 },
}

impl Engine {
    /// Process a `caption` frame from a subtitler connection
    pub fn submit_caption(
        self: &Arc<Self>,
        sender: Uuid,
        text: &str,
        subtitler_name: Option<String>,
        auto_sent: bool,
    ) -> Result<()> {
        let now = Instant::now();
        let outcome = {
            let mut state = self.state.lock();
            if !state.fragment_active {
                GateOutcome::Direct {
                    delay_sec: state.settings.delay_sec,
                }
            } else {
                let deadline_ms = state.settings.submit_deadline() * 1000;
                let slot_index = match state.open_slots.get(&sender).copied() {
                    Some(index) => Some(index),
                    None => {
                        // The open-slot entry is cleared at grace end, but
                        // an auto-send can still be in flight; manual
                        // captions get the same fallback within the
                        // deadline.
                        state
                            .slots
                            .iter()
                            .rev()
                            .find(|slot| slot.subtitler_id == sender)
                            .and_then(|slot| {
                                let elapsed_ms =
                                    now.duration_since(slot.started).as_millis() as u64;
                                if auto_sent || elapsed_ms <= deadline_ms {
                                    Some(slot.slot_index)
                                } else {
                                    None
                                }
                            })
                    }
                };
                let Some(slot_index) = slot_index else {
                    return Err(SubtitleError::CaptionRejected("no-open-slot"));
                };

                let slot = state.slot(slot_index).expect("indexed slot exists");
                let elapsed_ms = now.duration_since(slot.started).as_millis() as u64;
                if !auto_sent && elapsed_ms > deadline_ms {
                    return Err(SubtitleError::CaptionRejected("deadline-passed"));
                }

                // Timestamp against the slot body; grace-time submissions
                // still point at the slot's last covered frame.
                let body_ms = state.settings.slot_duration * 1000;
                let video_timestamp_ms = slot.start_video_offset_ms + elapsed_ms.min(body_ms);

                let text: String = text.trim().chars().take(MAX_CAPTION_CHARS).collect();
                let caption = RawCaption {
                    text,
                    video_timestamp_ms,
                    received_at_ms: epoch_ms(),
                    auto_sent,
                };
                state
                    .slot_mut(slot_index)
                    .expect("indexed slot exists")
                    .captions
                    .push(caption.clone());
                GateOutcome::Accepted {
                    caption,
                    slot_index,
                }
            }
        };

        let display_name = subtitler_name.or_else(|| self.hub.name_of(sender));
        match outcome {
            GateOutcome::Direct { delay_sec } => {
                self.hub.to_spectators(&ServerMessage::Caption {
                    caption: CaptionEcho {
                        text: text.trim().chars().take(MAX_CAPTION_CHARS).collect(),
                        subtitler_name: display_name,
                        auto_sent,
                    },
                    display_at: Some(epoch_ms() + delay_sec * 1000),
                });
            }
            GateOutcome::Accepted {
                caption,
                slot_index,
            } => {
                tracing::debug!(slot = slot_index, auto_sent, "caption accepted");
                self.hub.to_admins(&ServerMessage::FragmentRawCaption {
                    caption: caption.clone(),
                    slot_index,
                });
                self.hub.to_subtitlers_except(
                    sender,
                    &ServerMessage::Caption {
                        caption: CaptionEcho {
                            text: caption.text,
                            subtitler_name: display_name,
                            auto_sent,
                        },
                        display_at: None,
                    },
                );
            }
        }
        Ok(())
    }
}
