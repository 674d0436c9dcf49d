//! Session state store
//!
//! All mutable run state behind one lock: the live-run flags, the slot
//! history, the open-slot map, the subtitler roster, and the fused-caption
//! history. The engine is the single writer; queries here are pure.

use std::collections::HashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::session::types::{FusedCaption, SessionMode, SessionSettings, Slot, Subtitler};

/// Mutable session state, serialized behind the engine's mutex
pub struct SessionState {
    /// Settings for the current (or next) run
    pub settings: SessionSettings,
    pub mode: SessionMode,

    /// Live-run lifecycle
    pub running: bool,
    pub live_started: Option<Instant>,
    pub live_started_at_ms: Option<u64>,
    /// Media source name handed to the transcoder (recorded, not used)
    pub source: Option<String>,

    /// Fragment engine lifecycle: active may park waiting for the roster
    pub fragment_active: bool,
    pub rotation_started: bool,

    /// Index of the next slot to start; strictly increasing, never reused
    pub current_slot_index: u64,
    /// One record per started slot; position equals slot_index
    pub slots: Vec<Slot>,
    /// subtitler id -> slot index currently accepting their submissions
    pub open_slots: HashMap<Uuid, u64>,

    /// Connected subtitlers ordered by join time
    pub subtitlers: Vec<Subtitler>,

    /// Fused captions in emission order
    pub fused_history: Vec<FusedCaption>,
}

impl SessionState {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            mode: SessionMode::Fragmentation,
            running: false,
            live_started: None,
            live_started_at_ms: None,
            source: None,
            fragment_active: false,
            rotation_started: false,
            current_slot_index: 0,
            slots: Vec::new(),
            open_slots: HashMap::new(),
            subtitlers: Vec::new(),
            fused_history: Vec::new(),
        }
    }

    /// Clear run state. The roster survives: membership is
    /// connection-scoped, and clients stay connected across runs.
    pub fn reset_run(&mut self) {
        self.running = false;
        self.live_started = None;
        self.live_started_at_ms = None;
        self.source = None;
        self.fragment_active = false;
        self.rotation_started = false;
        self.current_slot_index = 0;
        self.slots.clear();
        self.open_slots.clear();
        self.fused_history.clear();
    }

    /// Subtitlers in rotation order
    pub fn active_subtitlers(&self) -> &[Subtitler] {
        &self.subtitlers
    }

    /// Rotation assignment for a slot index, against the current roster
    pub fn subtitler_for_slot(&self, slot_index: u64) -> Option<&Subtitler> {
        if self.subtitlers.is_empty() {
            return None;
        }
        let pos = (slot_index as usize) % self.subtitlers.len();
        self.subtitlers.get(pos)
    }

    /// Assignee of the most recently started slot
    pub fn current_subtitler(&self) -> Option<(Uuid, &str)> {
        self.slots
            .last()
            .map(|s| (s.subtitler_id, s.subtitler_name.as_str()))
    }

    /// Add to the roster; a second join from the same connection is a no-op
    pub fn join_subtitler(&mut self, id: Uuid, name: String, now: Instant) -> bool {
        if self.subtitlers.iter().any(|s| s.id == id) {
            return false;
        }
        self.subtitlers.push(Subtitler {
            id,
            name,
            joined_at: now,
        });
        // join_subtitler is called with a fresh monotonic now, so the list
        // stays sorted; make it explicit for the rotation invariant.
        self.subtitlers.sort_by_key(|s| s.joined_at);
        true
    }

    /// Drop from the roster on leave or disconnect
    pub fn leave_subtitler(&mut self, id: Uuid) -> bool {
        let before = self.subtitlers.len();
        self.subtitlers.retain(|s| s.id != id);
        self.subtitlers.len() != before
    }

    pub fn slot(&self, slot_index: u64) -> Option<&Slot> {
        self.slots.get(slot_index as usize)
    }

    pub fn slot_mut(&mut self, slot_index: u64) -> Option<&mut Slot> {
        self.slots.get_mut(slot_index as usize)
    }

    /// Total raw captions across all slots
    pub fn raw_captions_count(&self) -> usize {
        self.slots.iter().map(|s| s.captions.len()).sum()
    }

    /// Milliseconds of video elapsed since the live run started
    pub fn video_offset_ms(&self, now: Instant) -> u64 {
        self.live_started
            .map(|started| now.duration_since(started).as_millis() as u64)
            .unwrap_or(0)
    }
}
