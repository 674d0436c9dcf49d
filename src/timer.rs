//! Clock and timer service
//!
//! One-shot and interval timers with cancellable handles, grouped so a
//! whole family (per-slot notices, pacer emissions, the stride interval)
//! can be cleared in one call when a run stops. All deadlines are
//! monotonic; wall-clock values surfaced to clients come from `epoch_ms`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Wall-clock now in epoch milliseconds
pub fn epoch_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Cancellation scope of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerGroup {
    /// The interval advancing the slot rotation
    Stride,
    /// The periodic status broadcast
    Status,
    /// Notice and grace timers of one slot
    Slot(u64),
    /// Post-grace settle timer of one slot
    Settle(u64),
    /// Word delivery timers
    Pacer,
}

/// Timer identifier returned by `schedule`/`schedule_every`
pub type TimerId = u64;

struct TimerInner {
    timers: DashMap<TimerId, (TimerGroup, AbortHandle)>,
    next_id: AtomicU64,
}

/// Grouped, cancellable timers on top of the tokio runtime
pub struct TimerService {
    inner: Arc<TimerInner>,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TimerInner {
                timers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Run `f` once after `delay`
    pub fn schedule<F>(&self, delay: Duration, group: TimerGroup, f: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
            inner.timers.remove(&id);
        });
        self.inner.timers.insert(id, (group, handle.abort_handle()));
        id
    }

    /// Run `f` every `period`, first firing after one full period
    pub fn schedule_every<F>(&self, period: Duration, group: TimerGroup, f: F) -> TimerId
    where
        F: Fn() + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            // Slots must not bunch up after a stall; skip missed ticks.
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                f();
            }
        });
        self.inner.timers.insert(id, (group, handle.abort_handle()));
        id
    }

    /// Cancel a single timer
    pub fn cancel(&self, id: TimerId) {
        if let Some((_, (_, handle))) = self.inner.timers.remove(&id) {
            handle.abort();
        }
    }

    /// Cancel every timer in `group`
    pub fn cancel_group(&self, group: TimerGroup) {
        let ids: Vec<TimerId> = self
            .inner
            .timers
            .iter()
            .filter(|entry| entry.value().0 == group)
            .map(|entry| *entry.key())
            .collect();
        for id in ids {
            self.cancel(id);
        }
    }

    /// Cancel everything
    pub fn cancel_all(&self) {
        let ids: Vec<TimerId> = self.inner.timers.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.cancel(id);
        }
    }

    /// Number of timers currently registered
    pub fn pending(&self) -> usize {
        self.inner.timers.len()
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        timers.schedule(Duration::from_millis(100), TimerGroup::Pacer, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_group() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let fired = fired.clone();
            timers.schedule(Duration::from_millis(100), TimerGroup::Slot(7), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        let fired2 = fired.clone();
        timers.schedule(Duration::from_millis(100), TimerGroup::Slot(8), move || {
            fired2.fetch_add(10, Ordering::SeqCst);
        });
        timers.cancel_group(TimerGroup::Slot(7));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_fires_repeatedly() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let id = timers.schedule_every(Duration::from_millis(50), TimerGroup::Status, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(175)).await;
        let seen = fired.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected >= 3 ticks, saw {seen}");
        timers.cancel(id);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f1 = fired.clone();
        timers.schedule(Duration::from_millis(100), TimerGroup::Stride, move || {
            f1.fetch_add(1, Ordering::SeqCst);
        });
        let f2 = fired.clone();
        timers.schedule_every(Duration::from_millis(50), TimerGroup::Status, move || {
            f2.fetch_add(1, Ordering::SeqCst);
        });
        timers.cancel_all();
        assert_eq!(timers.pending(), 0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
