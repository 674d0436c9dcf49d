//! Slot scheduler
//!
//! Slots start every stride while individual slots live for the full
//! slot duration plus grace. The settings validation guarantees that a
//! subtitler's next slot never opens before their previous submit
//! deadline, so the open-slot map holds at most one entry per subtitler.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::messages::ServerMessage;
use crate::session::engine::Engine;
use crate::session::types::{Slot, SlotPhase};
use crate::timer::{epoch_ms, TimerGroup};

impl Engine {
    /// Start the slot at the current index and arm its four timers
    ///
    /// With the roster below the required count, no slot is created and
    /// the index does not advance; the stride interval keeps re-checking.
    pub(crate) fn start_next_slot(self: &Arc<Self>) {
        let generation = self.generation();
        let (slot_index, current_id, next_id, settings) = {
            let mut state = self.state.lock();
            if !state.fragment_active || !state.rotation_started {
                return;
            }
            if state.active_subtitlers().len() < state.settings.required_subtitlers {
                drop(state);
                tracing::warn!("slot start skipped: roster below required count");
                self.broadcast_status();
                return;
            }

            let slot_index = state.current_slot_index;
            let current = state
                .subtitler_for_slot(slot_index)
                .cloned()
                .expect("roster checked non-empty");
            let next = state
                .subtitler_for_slot(slot_index + 1)
                .cloned()
                .expect("roster checked non-empty");

            let now = Instant::now();
            let start_video_offset_ms = state.video_offset_ms(now);
            state.slots.push(Slot {
                slot_index,
                subtitler_id: current.id,
                subtitler_name: current.name.clone(),
                started: now,
                start_at_ms: epoch_ms(),
                start_video_offset_ms,
                end_at_ms: None,
                end_video_offset_ms: None,
                captions: Vec::new(),
                overlap_from_prev: None,
                final_text: String::new(),
                sent: false,
                phase: SlotPhase::Open,
            });
            state.open_slots.insert(current.id, slot_index);
            state.current_slot_index = slot_index + 1;

            tracing::debug!(slot = slot_index, subtitler = %current.name, "slot started");
            (slot_index, current.id, next.id, state.settings)
        };

        let slot_duration = settings.slot_duration;
        let stride = settings.stride();
        let grace = settings.grace();
        let notify_before = settings.notify_before;

        {
            // The ending notice is never skipped; an oversized
            // notifyBefore clamps it to the slot start.
            let engine = self.clone();
            self.timers.schedule(
                Duration::from_secs(slot_duration.saturating_sub(notify_before)),
                TimerGroup::Slot(slot_index),
                move || {
                    if engine.generation() != generation {
                        return;
                    }
                    engine.hub.send_to(
                        current_id,
                        &ServerMessage::FragmentEnding {
                            seconds_left: notify_before,
                        },
                    );
                    engine.broadcast_status();
                },
            );
        }

        if notify_before < stride {
            let engine = self.clone();
            self.timers.schedule(
                Duration::from_secs(stride - notify_before),
                TimerGroup::Slot(slot_index),
                move || {
                    if engine.generation() != generation {
                        return;
                    }
                    engine.hub.send_to(
                        next_id,
                        &ServerMessage::FragmentPrepare {
                            seconds_left: notify_before,
                        },
                    );
                    engine.broadcast_status();
                },
            );
        }

        {
            let engine = self.clone();
            let grace_percent = settings.grace_percent;
            self.timers.schedule(
                Duration::from_secs(slot_duration),
                TimerGroup::Slot(slot_index),
                move || {
                    if engine.generation() != generation {
                        return;
                    }
                    {
                        let mut state = engine.state.lock();
                        if let Some(slot) = state.slot_mut(slot_index) {
                            if slot.phase == SlotPhase::Open {
                                slot.phase = SlotPhase::Grace;
                            }
                        }
                    }
                    engine.hub.send_to(
                        current_id,
                        &ServerMessage::FragmentGraceStart {
                            grace_period_percent: grace_percent,
                        },
                    );
                    engine.broadcast_status();
                },
            );
        }

        {
            let engine = self.clone();
            self.timers.schedule(
                Duration::from_secs(slot_duration + grace),
                TimerGroup::Slot(slot_index),
                move || {
                    if engine.generation() != generation {
                        return;
                    }
                    engine.on_grace_end(slot_index);
                },
            );
        }

        self.broadcast_status();
    }

    /// Grace end: close the submission window and queue finalization
    /// after the settle delay
    pub(crate) fn on_grace_end(self: &Arc<Self>, slot_index: u64) {
        let generation = self.generation();
        let assignee = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let end_video_offset_ms = state.video_offset_ms(now);
            let Some(slot) = state.slot_mut(slot_index) else {
                return;
            };
            slot.end_at_ms = Some(epoch_ms());
            slot.end_video_offset_ms = Some(end_video_offset_ms);
            slot.phase = SlotPhase::Closing;
            let assignee = slot.subtitler_id;

            // The same subtitler may already hold a newer slot; only clear
            // the mapping while it still points at this one.
            if state.open_slots.get(&assignee) == Some(&slot_index) {
                state.open_slots.remove(&assignee);
            }
            assignee
        };

        self.hub.send_to(assignee, &ServerMessage::FragmentAutoSend {});
        self.broadcast_status();

        let engine = self.clone();
        self.timers.schedule(
            Duration::from_millis(self.settle_ms),
            TimerGroup::Settle(slot_index),
            move || {
                if engine.generation() != generation {
                    return;
                }
                engine.finalize_slot(slot_index);
            },
        );
    }
}
