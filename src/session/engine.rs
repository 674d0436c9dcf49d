//! Session engine
//!
//! Owns the session state behind a single mutex and ties the timer
//! service, the client hub, and the slot machinery together. Timer
//! callbacks and inbound client messages both funnel through methods on
//! this type, so every state mutation is serialized.
//!
//! A run-generation counter is attached to every scheduled callback:
//! callbacks from a previous run observe a newer generation and return
//! without acting.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{Result, SubtitleError};
use crate::hub::ClientHub;
use crate::messages::{
    AdminStatusPayload, FragmentStatusPayload, LiveStatus, ServerMessage, StatusCommon,
    SubtitlerInfo,
};
use crate::session::store::SessionState;
use crate::session::types::{SessionMode, SessionSettings, Slot};
use crate::timer::{epoch_ms, TimerGroup, TimerService};

/// Everything the delivery pacer needs from a finalized slot, snapshotted
/// under the state lock
#[derive(Debug, Clone)]
pub struct SlotEmission {
    pub slot_index: u64,
    pub subtitler_name: String,
    pub started: Instant,
    pub start_video_offset_ms: u64,
    pub final_text: String,
    pub slot_duration_ms: u64,
    pub delay_sec: u64,
}

impl SlotEmission {
    pub fn of(slot: &Slot, settings: &SessionSettings) -> Self {
        Self {
            slot_index: slot.slot_index,
            subtitler_name: slot.subtitler_name.clone(),
            started: slot.started,
            start_video_offset_ms: slot.start_video_offset_ms,
            final_text: slot.final_text.clone(),
            slot_duration_ms: settings.slot_duration * 1000,
            delay_sec: settings.delay_sec,
        }
    }
}

/// One slot in the export dump
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotExport {
    pub slot_index: u64,
    pub subtitler_id: Uuid,
    pub subtitler_name: String,
    pub start_at: u64,
    pub start_video_offset_ms: u64,
    pub end_at: Option<u64>,
    pub captions: Vec<crate::session::types::RawCaption>,
    pub overlap_from_prev: Option<usize>,
    pub final_text: String,
    pub sent: bool,
}

/// Snapshot of the run for the REST status endpoints
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub running: bool,
    pub live_started_at_ms: Option<u64>,
    pub mode: SessionMode,
    pub delay_sec: u64,
    pub fragment_mode: bool,
    pub min_subtitlers: usize,
}

/// The subtitling coordination engine
pub struct Engine {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) hub: Arc<ClientHub>,
    pub(crate) timers: TimerService,
    pub(crate) settle_ms: u64,
    generation: AtomicU64,
}

impl Engine {
    pub fn new(hub: Arc<ClientHub>, defaults: SessionSettings, settle_ms: u64) -> Self {
        Self {
            state: Mutex::new(SessionState::new(defaults)),
            hub,
            timers: TimerService::new(),
            settle_ms,
            generation: AtomicU64::new(0),
        }
    }

    /// Current run generation; scheduled callbacks compare against the
    /// value they captured when scheduled
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Init frame for a freshly accepted connection
    pub fn init_message(&self, conn_id: Uuid) -> ServerMessage {
        let state = self.state.lock();
        ServerMessage::Init {
            conn_id,
            running: state.running,
            delay_sec: state.settings.delay_sec,
            mode: state.mode,
            fragment_mode: state.fragment_active,
        }
    }

    pub fn live_snapshot(&self) -> LiveSnapshot {
        let state = self.state.lock();
        LiveSnapshot {
            running: state.running,
            live_started_at_ms: state.live_started_at_ms,
            mode: state.mode,
            delay_sec: state.settings.delay_sec,
            fragment_mode: state.fragment_active,
            min_subtitlers: state.settings.required_subtitlers,
        }
    }

    pub fn settings(&self) -> SessionSettings {
        self.state.lock().settings
    }

    /// Start a live run
    pub fn start_live(
        self: &Arc<Self>,
        source: Option<String>,
        mode: SessionMode,
        settings: SessionSettings,
    ) -> Result<()> {
        settings.validate()?;
        {
            let mut state = self.state.lock();
            if state.running {
                return Err(SubtitleError::AlreadyRunning);
            }
            if mode == SessionMode::Fragmentation
                && state.active_subtitlers().len() < settings.required_subtitlers
            {
                return Err(SubtitleError::NotEnoughSubtitlers {
                    have: state.active_subtitlers().len(),
                    need: settings.required_subtitlers,
                });
            }
            state.settings = settings;
            state.mode = mode;
            state.running = true;
            state.live_started = Some(Instant::now());
            state.live_started_at_ms = Some(epoch_ms());
            state.source = source;
        }
        self.bump_generation();

        let (delay_sec, started_ms) = {
            let state = self.state.lock();
            (state.settings.delay_sec, state.live_started_at_ms)
        };
        self.hub.broadcast_all(&ServerMessage::Live {
            status: LiveStatus::Starting,
            delay_sec,
            live_started_at: None,
        });

        if mode == SessionMode::Fragmentation {
            self.activate_fragments()?;
        }

        tracing::info!(?mode, delay_sec, "live run started");
        self.hub.broadcast_all(&ServerMessage::Live {
            status: LiveStatus::Started,
            delay_sec,
            live_started_at: started_ms,
        });
        Ok(())
    }

    /// Stop the live run; a stop without a run is a no-op
    pub fn stop_live(self: &Arc<Self>) -> Result<()> {
        let fragment_active = {
            let state = self.state.lock();
            if !state.running {
                return Ok(());
            }
            state.fragment_active
        };
        if fragment_active {
            self.deactivate_fragments()?;
        }
        self.bump_generation();
        self.timers.cancel_all();

        let delay_sec = {
            let mut state = self.state.lock();
            let delay = state.settings.delay_sec;
            state.reset_run();
            delay
        };
        tracing::info!("live run stopped");
        self.hub.broadcast_all(&ServerMessage::Live {
            status: LiveStatus::Stopped,
            delay_sec,
            live_started_at: None,
        });
        Ok(())
    }

    /// Turn the slot rotation on for the current run
    ///
    /// If fewer than the required subtitlers are connected the engine
    /// parks in a waiting state; the rotation begins on the join that
    /// fills the roster.
    pub fn activate_fragments(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.running {
                return Err(SubtitleError::NotRunning);
            }
            if state.fragment_active {
                return Err(SubtitleError::Config(
                    "fragment mode already active".to_string(),
                ));
            }
            state.fragment_active = true;
            state.mode = SessionMode::Fragmentation;
            state.rotation_started = false;
            state.current_slot_index = 0;
            state.slots.clear();
            state.open_slots.clear();
            state.fused_history.clear();
        }
        self.timers.cancel_all();
        self.hub.broadcast_all(&ServerMessage::FragmentStarted {});

        let engine = self.clone();
        let generation = self.generation();
        self.timers
            .schedule_every(Duration::from_secs(1), TimerGroup::Status, move || {
                if engine.generation() == generation {
                    engine.broadcast_status();
                }
            });

        self.maybe_begin_rotation();
        self.broadcast_status();
        Ok(())
    }

    /// Turn the slot rotation off, flushing still-unsent slots
    pub fn deactivate_fragments(self: &Arc<Self>) -> Result<()> {
        {
            let state = self.state.lock();
            if !state.fragment_active {
                return Err(SubtitleError::FragmentsInactive);
            }
        }
        // Invalidate pending pacer/settle callbacks before flushing.
        self.bump_generation();
        self.cancel_run_timers();
        self.flush_remaining_slots();
        {
            let mut state = self.state.lock();
            state.fragment_active = false;
            state.rotation_started = false;
            state.open_slots.clear();
            state.mode = SessionMode::Direct;
        }
        tracing::info!("fragment rotation stopped");
        self.hub.broadcast_all(&ServerMessage::FragmentStopped {});
        Ok(())
    }

    /// Cancel the stride interval, every per-slot timer set, pending
    /// settle tasks, the status interval, and all pacer word timers
    fn cancel_run_timers(&self) {
        tracing::debug!(pending = self.timers.pending(), "cancelling run timers");
        self.timers.cancel_group(TimerGroup::Stride);
        self.timers.cancel_group(TimerGroup::Status);
        self.timers.cancel_group(TimerGroup::Pacer);
        let slot_count = self.state.lock().slots.len() as u64;
        for index in 0..slot_count {
            self.timers.cancel_group(TimerGroup::Slot(index));
            self.timers.cancel_group(TimerGroup::Settle(index));
        }
    }

    /// Begin slot rotation once active and fully staffed
    pub(crate) fn maybe_begin_rotation(self: &Arc<Self>) {
        let begin = {
            let mut state = self.state.lock();
            if state.fragment_active
                && !state.rotation_started
                && state.active_subtitlers().len() >= state.settings.required_subtitlers
            {
                state.rotation_started = true;
                true
            } else {
                false
            }
        };
        if !begin {
            return;
        }

        let stride = { self.state.lock().settings.stride() };
        tracing::info!(stride, "slot rotation starting");
        self.start_next_slot();

        let engine = self.clone();
        let generation = self.generation();
        self.timers.schedule_every(
            Duration::from_secs(stride),
            TimerGroup::Stride,
            move || {
                if engine.generation() == generation {
                    engine.start_next_slot();
                }
            },
        );
    }

    /// Handle `fragment:join`; joining twice is acknowledged but inert
    pub fn join_subtitler(self: &Arc<Self>, conn_id: Uuid, name: Option<String>) {
        let display_name = name
            .or_else(|| self.hub.name_of(conn_id))
            .unwrap_or_else(|| format!("subtitler-{}", &conn_id.to_string()[..8]));
        let (joined, active) = {
            let mut state = self.state.lock();
            let joined = state.join_subtitler(conn_id, display_name.clone(), Instant::now());
            (joined, state.fragment_active)
        };
        self.hub
            .send_to(conn_id, &ServerMessage::FragmentJoined { conn_id, active });
        if joined {
            tracing::info!(%conn_id, name = %display_name, "subtitler joined");
            self.maybe_begin_rotation();
            self.broadcast_status();
        }
    }

    /// Handle `fragment:leave` or a disconnect
    ///
    /// A slot already assigned to the leaver is untouched: its grace still
    /// elapses and rotation simply proceeds with the remaining roster.
    pub fn leave_subtitler(self: &Arc<Self>, conn_id: Uuid) {
        let left = {
            let mut state = self.state.lock();
            state.leave_subtitler(conn_id)
        };
        if left {
            tracing::info!(%conn_id, "subtitler left");
            self.broadcast_status();
        }
    }

    /// Set the spectator delay, enforcing the derived floor and the
    /// configured ceiling
    pub fn set_delay(&self, delay_sec: u64, max_delay: u64) -> Result<u64> {
        {
            let mut state = self.state.lock();
            if delay_sec > max_delay {
                return Err(SubtitleError::DelayOutOfRange(format!(
                    "delaySec ({delay_sec}) is above maxDelay={max_delay}"
                )));
            }
            state.settings.validate_delay(delay_sec)?;
            state.settings.delay_sec = delay_sec;
        }
        tracing::info!(delay_sec, "spectator delay changed");
        self.hub
            .broadcast_all(&ServerMessage::Config { delay_sec });
        Ok(delay_sec)
    }

    /// Replace the session settings between runs
    pub fn update_settings(&self, settings: SessionSettings) -> Result<()> {
        settings.validate()?;
        let mut state = self.state.lock();
        if state.fragment_active {
            return Err(SubtitleError::Config(
                "cannot change fragment settings while the rotation is active".to_string(),
            ));
        }
        state.settings = settings;
        Ok(())
    }

    /// Aggregate view for the REST status endpoint
    pub fn fragment_overview(&self) -> AdminStatusPayload {
        let state = self.state.lock();
        AdminStatusPayload {
            common: Self::status_common(&state),
            raw_captions_count: state.raw_captions_count(),
            fused_captions_count: state.fused_history.len(),
            slots_count: state.slots.len(),
        }
    }

    /// Slot-indexed dump of everything received and fused, for export
    pub fn export_slots(&self) -> Vec<SlotExport> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .map(|slot| SlotExport {
                slot_index: slot.slot_index,
                subtitler_id: slot.subtitler_id,
                subtitler_name: slot.subtitler_name.clone(),
                start_at: slot.start_at_ms,
                start_video_offset_ms: slot.start_video_offset_ms,
                end_at: slot.end_at_ms,
                captions: slot.captions.clone(),
                overlap_from_prev: slot.overlap_from_prev,
                final_text: slot.final_text.clone(),
                sent: slot.sent,
            })
            .collect()
    }

    pub(crate) fn status_common(state: &SessionState) -> StatusCommon {
        let (current_subtitler_id, current_subtitler_name) = match state.current_subtitler() {
            Some((id, name)) => (Some(id), Some(name.to_string())),
            None => (None, None),
        };
        StatusCommon {
            active: state.fragment_active,
            slot_duration: state.settings.slot_duration,
            grace_period_percent: state.settings.grace_percent,
            required_subtitlers: state.settings.required_subtitlers,
            overlap_duration: state.settings.overlap_duration,
            current_slot_index: state.slots.last().map(|s| s.slot_index),
            current_subtitler_id,
            current_subtitler_name,
            subtitler_count: state.subtitlers.len(),
            subtitlers: state
                .subtitlers
                .iter()
                .map(|s| SubtitlerInfo {
                    id: s.id,
                    name: s.name.clone(),
                })
                .collect(),
        }
    }

    /// Countdown fields for one subtitler: their open-slot deadline when
    /// they have one, or the start of their next assigned slot otherwise
    pub(crate) fn personal_status(
        state: &SessionState,
        subtitler_id: Uuid,
        now: Instant,
    ) -> (Option<u64>, bool, bool) {
        if let Some(&slot_index) = state.open_slots.get(&subtitler_id) {
            if let Some(slot) = state.slot(slot_index) {
                let elapsed_ms = now.duration_since(slot.started).as_millis() as u64;
                let body_ms = state.settings.slot_duration * 1000;
                let deadline_ms = state.settings.submit_deadline() * 1000;
                if elapsed_ms < body_ms {
                    return (Some((body_ms - elapsed_ms).div_ceil(1000)), true, false);
                }
                return (
                    Some(deadline_ms.saturating_sub(elapsed_ms).div_ceil(1000)),
                    true,
                    true,
                );
            }
        }

        // No open slot: count down to the next slot of this subtitler.
        let Some(last) = state.slots.last() else {
            return (None, false, false);
        };
        let len = state.subtitlers.len() as u64;
        let Some(pos) = state.subtitlers.iter().position(|s| s.id == subtitler_id) else {
            return (None, false, false);
        };
        let next_index = state.current_slot_index;
        let offset = (pos as u64 + len - (next_index % len)) % len;
        let target = next_index + offset;
        let stride_ms = state.settings.stride() * 1000;
        let target_start_ms = (target - last.slot_index) * stride_ms;
        let elapsed_ms = now.duration_since(last.started).as_millis() as u64;
        (
            Some(target_start_ms.saturating_sub(elapsed_ms).div_ceil(1000)),
            false,
            false,
        )
    }

    /// Individualized status fan-out: one frame per roster member, one
    /// aggregate frame for admins. At-least-once; recipients tolerate
    /// redelivery.
    pub fn broadcast_status(&self) {
        let mut per_subtitler: Vec<(Uuid, ServerMessage)> = Vec::new();
        let admin_message;
        {
            let state = self.state.lock();
            if !state.fragment_active {
                return;
            }
            let common = Self::status_common(&state);
            let now = Instant::now();
            for subtitler in &state.subtitlers {
                let (seconds_remaining, is_my_turn, in_grace_period) =
                    Self::personal_status(&state, subtitler.id, now);
                per_subtitler.push((
                    subtitler.id,
                    ServerMessage::FragmentStatus(FragmentStatusPayload {
                        common: common.clone(),
                        seconds_remaining,
                        is_my_turn,
                        in_grace_period,
                    }),
                ));
            }
            admin_message = ServerMessage::FragmentAdminStatus(AdminStatusPayload {
                common,
                raw_captions_count: state.raw_captions_count(),
                fused_captions_count: state.fused_history.len(),
                slots_count: state.slots.len(),
            });
        }
        for (conn_id, message) in per_subtitler {
            self.hub.send_to(conn_id, &message);
        }
        self.hub.to_admins(&admin_message);
    }
}
