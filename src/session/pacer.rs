//! Delivery pacer
//!
//! Spreads a finalized slot's words over the slot duration, aligned to
//! `slot start + spectator delay`, so spectators read at typing pace
//! while the delayed picture catches up.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::messages::ServerMessage;
use crate::session::engine::{Engine, SlotEmission};
use crate::timer::TimerGroup;

/// Word events of one emission, ready to broadcast
fn word_events(emission: &SlotEmission, caption_id: Uuid) -> Vec<ServerMessage> {
    let words: Vec<&str> = emission.final_text.split_whitespace().collect();
    let total = words.len();
    words
        .iter()
        .enumerate()
        .map(|(index, word)| ServerMessage::CaptionWord {
            id: caption_id,
            word: word.to_string(),
            word_index: index,
            total_words: total,
            is_last: index + 1 == total,
            video_timestamp: emission.start_video_offset_ms,
            slot_index: emission.slot_index,
            subtitler_name: emission.subtitler_name.clone(),
            slot_duration_ms: emission.slot_duration_ms,
        })
        .collect()
}

impl Engine {
    /// Schedule the word-paced delivery of a finalized slot
    pub(crate) fn deliver_slot(self: &Arc<Self>, emission: SlotEmission) {
        let events = word_events(&emission, Uuid::new_v4());
        if events.is_empty() {
            return;
        }
        let interval_ms = emission.slot_duration_ms / events.len() as u64;
        let elapsed_ms = emission.started.elapsed().as_millis() as u64;
        let delay_ms = (emission.delay_sec * 1000).saturating_sub(elapsed_ms);
        let generation = self.generation();

        tracing::debug!(
            slot = emission.slot_index,
            words = events.len(),
            delay_ms,
            interval_ms,
            "pacing slot delivery"
        );
        for (index, event) in events.into_iter().enumerate() {
            let engine = self.clone();
            self.timers.schedule(
                Duration::from_millis(delay_ms + index as u64 * interval_ms),
                TimerGroup::Pacer,
                move || {
                    if engine.generation() != generation {
                        return;
                    }
                    engine.hub.to_spectators(&event);
                },
            );
        }
    }

    /// Emit every word of an emission immediately: best-effort catch-up
    /// for slots flushed when the rotation stops
    pub(crate) fn deliver_slot_now(&self, emission: SlotEmission) {
        for event in word_events(&emission, Uuid::new_v4()) {
            self.hub.to_spectators(&event);
        }
    }
}
