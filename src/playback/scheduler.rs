//! Per-lobby advance deadline scheduler
//!
//! Each lobby holds at most one outstanding "track finished" deadline. The
//! scheduler keys cancellation handles by lobby id and stores nothing else;
//! the fire callback re-fetches current lobby state, so a replaced head can
//! never be advanced from a stale snapshot.

use crate::types::LobbyId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Milliseconds until a head track's playback window elapses; zero when the
/// window has already passed
pub fn remaining_ms(started_at: DateTime<Utc>, duration_secs: u32, now: DateTime<Utc>) -> u64 {
    let end = started_at + chrono::Duration::seconds(i64::from(duration_secs));
    (end - now).num_milliseconds().max(0) as u64
}

struct TimerSlot {
    seq: u64,
    handle: JoinHandle<()>,
}

/// One cancelable deadline per lobby; arming replaces (and aborts) any
/// previously armed timer for that lobby
#[derive(Default)]
pub struct AdvanceScheduler {
    next_seq: AtomicU64,
    timers: Mutex<HashMap<LobbyId, TimerSlot>>,
}

impl AdvanceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline that runs `fire` after `delay`.
    ///
    /// The spawned task disarms itself before firing; a timer that was
    /// replaced or canceled in the meantime never fires. Sequence numbers
    /// keep a freshly armed successor from being disarmed by its
    /// predecessor's wakeup.
    pub fn arm<F>(self: &Arc<Self>, lobby_id: LobbyId, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let scheduler = Arc::clone(self);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !scheduler.disarm_if_current(lobby_id, seq) {
                return;
            }
            fire.await;
        });

        match self.timers.lock() {
            Ok(mut timers) => {
                if let Some(old) = timers.insert(lobby_id, TimerSlot { seq, handle }) {
                    debug!("Replacing armed timer for lobby {}", lobby_id);
                    old.handle.abort();
                }
            }
            Err(_) => {
                warn!("Timer map lock poisoned; aborting new timer for lobby {}", lobby_id);
                handle.abort();
            }
        }
    }

    /// Cancel the lobby's armed timer, if any
    pub fn cancel(&self, lobby_id: LobbyId) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(slot) = timers.remove(&lobby_id) {
                slot.handle.abort();
            }
        }
    }

    /// Whether a deadline is currently armed for the lobby
    pub fn is_armed(&self, lobby_id: LobbyId) -> bool {
        self.timers
            .lock()
            .map(|timers| timers.contains_key(&lobby_id))
            .unwrap_or(false)
    }

    /// Number of currently armed timers (for health reporting)
    pub fn armed_count(&self) -> usize {
        self.timers.lock().map(|timers| timers.len()).unwrap_or(0)
    }

    fn disarm_if_current(&self, lobby_id: LobbyId, seq: u64) -> bool {
        let Ok(mut timers) = self.timers.lock() else {
            return false;
        };
        match timers.get(&lobby_id) {
            Some(slot) if slot.seq == seq => {
                timers.remove(&lobby_id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{current_timestamp, generate_lobby_id};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_remaining_ms_math() {
        let now = current_timestamp();

        // Fresh stamp: the whole window remains
        assert_eq!(remaining_ms(now, 240, now), 240_000);

        // Partially elapsed
        let started = now - chrono::Duration::seconds(100);
        assert_eq!(remaining_ms(started, 240, now), 140_000);

        // Already elapsed clamps to zero
        let started = now - chrono::Duration::seconds(500);
        assert_eq!(remaining_ms(started, 240, now), 0);
    }

    #[tokio::test]
    async fn test_timer_fires_once_and_disarms() {
        let scheduler = Arc::new(AdvanceScheduler::new());
        let lobby_id = generate_lobby_id();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler.arm(lobby_id, Duration::from_millis(20), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_armed(lobby_id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed(lobby_id));
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let scheduler = Arc::new(AdvanceScheduler::new());
        let lobby_id = generate_lobby_id();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler.arm(lobby_id, Duration::from_millis(30), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.cancel(lobby_id);
        assert!(!scheduler.is_armed(lobby_id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rearm_replaces_prior_deadline() {
        let scheduler = Arc::new(AdvanceScheduler::new());
        let lobby_id = generate_lobby_id();
        let fired = Arc::new(AtomicUsize::new(0));

        let first = fired.clone();
        scheduler.arm(lobby_id, Duration::from_millis(30), async move {
            first.fetch_add(10, Ordering::SeqCst);
        });

        let second = fired.clone();
        scheduler.arm(lobby_id, Duration::from_millis(60), async move {
            second.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Only the replacement fired; a lobby never has two live deadlines
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.armed_count(), 0);
    }
}
