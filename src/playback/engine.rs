//! Playback-advance engine
//!
//! The engine owns every lobby mutation and is the only caller of the
//! advance scheduler. Its central operation is `advance`: dequeue the
//! finished head, re-stamp the successor, and re-arm the timer, with a
//! per-lobby in-flight guard absorbing duplicate triggers (timer wakeup
//! racing a client `track_ended` report) so each head is dequeued exactly
//! once.

use crate::config::PlaybackSettings;
use crate::error::Result;
use crate::gateway::{Broadcaster, ServerMessage};
use crate::lobby::{LobbyInstance, LobbyRegistry, RemoveOutcome};
use crate::metrics::MetricsCollector;
use crate::playback::scheduler::{remaining_ms, AdvanceScheduler};
use crate::types::{LobbyId, LobbySnapshot, Track, TrackSource, TrackSubmission, User, UserId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a single advance trigger did, decided under the registry write lock
enum AdvanceOutcome {
    /// Head dequeued; carries the fan-out list, the new queue, and the new
    /// head's playback window (if any) for re-arming
    Advanced {
        recipients: Vec<UserId>,
        queue: Vec<Track>,
        next_head: Option<(DateTime<Utc>, u32)>,
    },
    /// Another trigger for the same head got here first
    Suppressed,
    /// Nothing to dequeue
    EmptyQueue,
}

/// Orchestrates lobby lifecycle, queue mutation, and the advance loop
pub struct PlaybackEngine {
    registry: Arc<LobbyRegistry>,
    scheduler: Arc<AdvanceScheduler>,
    broadcaster: Arc<dyn Broadcaster>,
    settings: PlaybackSettings,
    metrics: Arc<MetricsCollector>,
}

impl PlaybackEngine {
    pub fn new(
        broadcaster: Arc<dyn Broadcaster>,
        settings: PlaybackSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry: Arc::new(LobbyRegistry::new()),
            scheduler: Arc::new(AdvanceScheduler::new()),
            broadcaster,
            settings,
            metrics,
        }
    }

    /// Create a lobby with the creator already joined as dj.
    ///
    /// The join runs before the registry insert so a rejected display name
    /// never leaves an empty lobby behind.
    pub fn create_lobby(&self, creator: UserId, name: &str) -> Result<LobbySnapshot> {
        let mut lobby = LobbyInstance::new();
        lobby.join(creator, name)?;
        let snapshot = lobby.snapshot();

        let lobby_id = self.registry.insert(lobby)?;
        self.metrics.lobbies_created_total.inc();
        self.metrics
            .active_lobbies
            .set(self.registry.active_count() as i64);

        info!("Created lobby {} for user {}", lobby_id, creator);
        Ok(snapshot)
    }

    /// Join an existing lobby; notifies the members already present.
    pub async fn join_lobby(
        &self,
        lobby_id: LobbyId,
        user_id: UserId,
        name: &str,
    ) -> Result<LobbySnapshot> {
        let (user, others, snapshot) = self.registry.with_lobby_mut(lobby_id, |lobby| {
            let user = lobby.join(user_id, name)?;
            let others = lobby.user_ids_except(user_id);
            Ok::<(User, Vec<UserId>, LobbySnapshot), anyhow::Error>((
                user,
                others,
                lobby.snapshot(),
            ))
        })??;

        info!(
            "User {} joined lobby {} as {}",
            user_id, lobby_id, user.role
        );
        self.broadcaster
            .broadcast(&others, ServerMessage::UserJoined { user })
            .await?;

        Ok(snapshot)
    }

    /// Remove a user from a lobby; the last departure tears the lobby down.
    pub async fn leave_lobby(&self, lobby_id: LobbyId, user_id: UserId) -> Result<()> {
        let departed = self.registry.with_lobby_mut(lobby_id, |lobby| {
            let user = lobby.remove_user(user_id)?;
            Some((user, lobby.user_ids(), lobby.is_empty()))
        })?;

        let Some((user, remaining, now_empty)) = departed else {
            return Ok(());
        };

        info!("User {} left lobby {}", user_id, lobby_id);
        if now_empty {
            self.delete_lobby(lobby_id)?;
        } else {
            self.broadcaster
                .broadcast(&remaining, ServerMessage::UserLeft { user })
                .await?;
        }

        Ok(())
    }

    /// Tear a lobby down and cancel its armed timer.
    pub fn delete_lobby(&self, lobby_id: LobbyId) -> Result<()> {
        self.scheduler.cancel(lobby_id);
        if self.registry.remove(lobby_id)?.is_some() {
            info!("Deleted lobby {}", lobby_id);
        }
        self.metrics
            .active_lobbies
            .set(self.registry.active_count() as i64);
        Ok(())
    }

    /// Queue a track submitted by a dj.
    ///
    /// When the queue was empty the track becomes the playing head. Its
    /// `started_at` is stamped inside the write lock and the timer is armed
    /// here, after the lock is released.
    pub async fn add_track(
        self: &Arc<Self>,
        lobby_id: LobbyId,
        actor: UserId,
        submission: TrackSubmission,
    ) -> Result<()> {
        let track = Track::from_submission(submission, self.settings.default_track_duration_secs);

        let (became_head, queue, recipients, head_window) =
            self.registry.with_lobby_mut(lobby_id, |lobby| {
                let became_head = lobby.add_track(actor, track)?;
                let head_window = lobby
                    .head()
                    .and_then(|h| h.started_at.map(|s| (s, h.duration_secs)));
                Ok::<_, anyhow::Error>((
                    became_head,
                    lobby.queue_snapshot(),
                    lobby.user_ids(),
                    head_window,
                ))
            })??;

        self.metrics.tracks_queued_total.inc();
        if became_head {
            if let Some((started_at, duration_secs)) = head_window {
                self.schedule_for_head(lobby_id, started_at, duration_secs);
            }
        }

        self.broadcaster
            .broadcast(&recipients, ServerMessage::QueueUpdated { queue })
            .await?;

        Ok(())
    }

    /// Remove a queued track by `(source, id)`.
    ///
    /// An id that is not queued is a silent no-op with no broadcast. Removing
    /// the playing head cancels the armed timer and, if a successor exists,
    /// re-arms for its freshly stamped window.
    pub async fn remove_track(
        self: &Arc<Self>,
        lobby_id: LobbyId,
        actor: UserId,
        source: TrackSource,
        track_id: &str,
    ) -> Result<()> {
        let (outcome, queue, recipients, head_window) =
            self.registry.with_lobby_mut(lobby_id, |lobby| {
                let outcome = lobby.remove_track(actor, source, track_id)?;
                let head_window = lobby
                    .head()
                    .and_then(|h| h.started_at.map(|s| (s, h.duration_secs)));
                Ok::<_, anyhow::Error>((
                    outcome,
                    lobby.queue_snapshot(),
                    lobby.user_ids(),
                    head_window,
                ))
            })??;

        match outcome {
            RemoveOutcome::NotFound => {
                debug!(
                    "Remove of unknown track {}:{} in lobby {} ignored",
                    source, track_id, lobby_id
                );
                return Ok(());
            }
            RemoveOutcome::Removed { was_head: true } => {
                self.scheduler.cancel(lobby_id);
                if let Some((started_at, duration_secs)) = head_window {
                    self.schedule_for_head(lobby_id, started_at, duration_secs);
                }
            }
            RemoveOutcome::Removed { was_head: false } => {}
        }

        self.broadcaster
            .broadcast(&recipients, ServerMessage::QueueUpdated { queue })
            .await?;

        Ok(())
    }

    /// Client-reported track end. The report is only a fallback: while the
    /// authoritative timer is still armed the report is ignored, otherwise
    /// (timer lost or lagging) it drives a normal guarded advance.
    pub async fn handle_track_ended(self: &Arc<Self>, lobby_id: LobbyId) -> Result<()> {
        if self.scheduler.is_armed(lobby_id) {
            debug!(
                "Ignoring track_ended for lobby {}; timer still armed",
                lobby_id
            );
            return Ok(());
        }
        self.advance(lobby_id).await
    }

    /// Advance the lobby's queue by one head, exactly once per head.
    ///
    /// Guard check-and-set, dequeue, and successor re-stamp all happen inside
    /// one registry write-lock critical section; whichever duplicate trigger
    /// loses the lock race observes the guard and backs off. Timer re-arm and
    /// the queue broadcast happen after the lock is released, and the guard is
    /// cleared by a cooldown task rather than inline so a straggling duplicate
    /// arriving just after the dequeue is still absorbed.
    pub async fn advance(self: &Arc<Self>, lobby_id: LobbyId) -> Result<()> {
        let outcome = self.registry.with_lobby_mut(lobby_id, |lobby| {
            if lobby.advance_in_flight() {
                return AdvanceOutcome::Suppressed;
            }
            if lobby.queue_is_empty() {
                return AdvanceOutcome::EmptyQueue;
            }

            lobby.set_advance_in_flight(true);
            let _ = lobby.pop_head();

            let now = current_timestamp();
            lobby.stamp_head(now);
            // Drain successors whose window is already spent so one trigger
            // never leaves an expired head waiting for a timer that fires
            // immediately.
            while let Some(head) = lobby.head() {
                if remaining_ms(head.started_at.unwrap_or(now), head.duration_secs, now) > 0 {
                    break;
                }
                let _ = lobby.pop_head();
                lobby.stamp_head(now);
            }

            let next_head = lobby
                .head()
                .and_then(|h| h.started_at.map(|s| (s, h.duration_secs)));
            AdvanceOutcome::Advanced {
                recipients: lobby.user_ids(),
                queue: lobby.queue_snapshot(),
                next_head,
            }
        })?;

        match outcome {
            AdvanceOutcome::Suppressed => {
                debug!("Suppressed duplicate advance for lobby {}", lobby_id);
                self.metrics.duplicate_advances_suppressed_total.inc();
                Ok(())
            }
            AdvanceOutcome::EmptyQueue => {
                debug!("Advance on empty queue for lobby {} is a no-op", lobby_id);
                Ok(())
            }
            AdvanceOutcome::Advanced {
                recipients,
                queue,
                next_head,
            } => {
                self.metrics.advances_total.inc();
                self.scheduler.cancel(lobby_id);
                if let Some((started_at, duration_secs)) = next_head {
                    self.schedule_for_head(lobby_id, started_at, duration_secs);
                }
                self.spawn_guard_reset(lobby_id);

                if let Err(err) = self
                    .broadcaster
                    .broadcast(&recipients, ServerMessage::QueueUpdated { queue })
                    .await
                {
                    warn!(
                        "Failed to broadcast queue update for lobby {}: {}",
                        lobby_id, err
                    );
                }
                Ok(())
            }
        }
    }

    /// Lobby state for HTTP/debug surfaces.
    pub fn lobby_snapshot(&self, lobby_id: LobbyId) -> Result<LobbySnapshot> {
        self.registry.with_lobby(lobby_id, |lobby| lobby.snapshot())
    }

    pub fn active_lobbies(&self) -> usize {
        self.registry.active_count()
    }

    pub fn armed_timers(&self) -> usize {
        self.scheduler.armed_count()
    }

    /// Arm the deadline for a head stamped at `started_at`. A window that has
    /// already elapsed advances immediately instead of arming a zero timer.
    fn schedule_for_head(
        self: &Arc<Self>,
        lobby_id: LobbyId,
        started_at: DateTime<Utc>,
        duration_secs: u32,
    ) {
        let remaining = remaining_ms(started_at, duration_secs, current_timestamp());
        if remaining == 0 {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = engine.advance(lobby_id).await {
                    warn!("Immediate advance for lobby {} failed: {}", lobby_id, err);
                }
            });
            return;
        }

        debug!(
            "Arming advance timer for lobby {} in {}ms",
            lobby_id, remaining
        );
        let engine = Arc::clone(self);
        self.scheduler
            .arm(lobby_id, Duration::from_millis(remaining), async move {
                if let Err(err) = engine.advance(lobby_id).await {
                    warn!("Timer-driven advance for lobby {} failed: {}", lobby_id, err);
                }
            });
    }

    /// Clear the advance guard once the cooldown elapses.
    fn spawn_guard_reset(self: &Arc<Self>, lobby_id: LobbyId) {
        let engine = Arc::clone(self);
        let cooldown = Duration::from_millis(self.settings.advance_cooldown_ms);
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if let Err(err) = engine
                .registry
                .with_lobby_mut(lobby_id, |lobby| lobby.set_advance_in_flight(false))
            {
                debug!(
                    "Skipping guard reset; lobby {} is gone ({})",
                    lobby_id, err
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LobbyError;
    use crate::gateway::MockBroadcaster;
    use crate::utils::generate_user_id;
    use tokio::time::sleep;

    fn test_engine(cooldown_ms: u64) -> (Arc<PlaybackEngine>, Arc<MockBroadcaster>) {
        let broadcaster = Arc::new(MockBroadcaster::new());
        let settings = PlaybackSettings {
            default_track_duration_secs: 240,
            advance_cooldown_ms: cooldown_ms,
        };
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let engine = Arc::new(PlaybackEngine::new(
            broadcaster.clone(),
            settings,
            metrics,
        ));
        (engine, broadcaster)
    }

    fn submission(id: &str, duration_secs: i64) -> TrackSubmission {
        TrackSubmission {
            id: id.to_string(),
            title: format!("Track {}", id),
            artist: "Artist".to_string(),
            url: format!("https://example.com/{}", id),
            artwork_url: None,
            preview_url: None,
            stream_url: None,
            source: TrackSource::Spotify,
            duration_secs: Some(duration_secs),
        }
    }

    async fn seeded_lobby(
        engine: &Arc<PlaybackEngine>,
        track_ids: &[(&str, i64)],
    ) -> (LobbyId, UserId) {
        let dj = generate_user_id();
        let snapshot = engine.create_lobby(dj, "alice").unwrap();
        for (id, duration) in track_ids {
            engine
                .add_track(snapshot.id, dj, submission(id, *duration))
                .await
                .unwrap();
        }
        (snapshot.id, dj)
    }

    #[tokio::test]
    async fn test_advance_dequeues_and_restamps() {
        let (engine, _broadcaster) = test_engine(1000);
        let (lobby_id, _dj) = seeded_lobby(&engine, &[("t1", 300), ("t2", 300)]).await;

        engine.advance(lobby_id).await.unwrap();

        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].id, "t2");
        assert!(snapshot.queue[0].started_at.is_some());
        assert!(engine.armed_timers() >= 1);
    }

    #[tokio::test]
    async fn test_duplicate_advance_suppressed_during_cooldown() {
        let (engine, broadcaster) = test_engine(60_000);
        let (lobby_id, _dj) =
            seeded_lobby(&engine, &[("t1", 300), ("t2", 300), ("t3", 300)]).await;
        broadcaster.clear();

        // Timer wakeup and client report landing together
        engine.advance(lobby_id).await.unwrap();
        engine.advance(lobby_id).await.unwrap();

        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        assert_eq!(snapshot.queue.len(), 2);
        assert_eq!(snapshot.queue[0].id, "t2");
        assert_eq!(broadcaster.count_of_kind("queue_updated"), 1);
    }

    #[tokio::test]
    async fn test_advance_on_empty_queue_is_noop() {
        let (engine, broadcaster) = test_engine(1000);
        let (lobby_id, _dj) = seeded_lobby(&engine, &[]).await;
        broadcaster.clear();

        engine.advance(lobby_id).await.unwrap();

        assert_eq!(broadcaster.sent_messages().len(), 0);
        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        // Guard must not be left set by the no-op path
        assert!(snapshot.queue.is_empty());
        engine
            .add_track(lobby_id, snapshot.users[0].id, submission("t1", 1))
            .await
            .unwrap();
        sleep(Duration::from_millis(1400)).await;
        assert!(engine.lobby_snapshot(lobby_id).unwrap().queue.is_empty());
    }

    #[tokio::test]
    async fn test_timer_drives_advance() {
        let (engine, broadcaster) = test_engine(200);
        let (lobby_id, _dj) = seeded_lobby(&engine, &[("t1", 1), ("t2", 300)]).await;

        sleep(Duration::from_millis(1400)).await;

        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].id, "t2");
        assert_eq!(broadcaster.last_queue_update().unwrap()[0].id, "t2");
    }

    #[tokio::test]
    async fn test_cooldown_expiry_allows_next_advance() {
        let (engine, _broadcaster) = test_engine(100);
        let (lobby_id, _dj) =
            seeded_lobby(&engine, &[("t1", 300), ("t2", 300), ("t3", 300)]).await;

        engine.advance(lobby_id).await.unwrap();
        sleep(Duration::from_millis(250)).await;
        engine.advance(lobby_id).await.unwrap();

        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].id, "t3");
    }

    #[tokio::test]
    async fn test_track_ended_ignored_while_timer_armed() {
        let (engine, _broadcaster) = test_engine(1000);
        let (lobby_id, _dj) = seeded_lobby(&engine, &[("t1", 300), ("t2", 300)]).await;
        assert!(engine.scheduler.is_armed(lobby_id));

        engine.handle_track_ended(lobby_id).await.unwrap();

        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        assert_eq!(snapshot.queue.len(), 2);
        assert_eq!(snapshot.queue[0].id, "t1");
    }

    #[tokio::test]
    async fn test_track_ended_advances_when_timer_lost() {
        let (engine, _broadcaster) = test_engine(100);
        let (lobby_id, _dj) = seeded_lobby(&engine, &[("t1", 300), ("t2", 300)]).await;

        // Simulate a lost timer; the client report becomes the only trigger
        engine.scheduler.cancel(lobby_id);
        engine.handle_track_ended(lobby_id).await.unwrap();

        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].id, "t2");
        // The advance re-armed the timer for the new head
        assert!(engine.scheduler.is_armed(lobby_id));
    }

    #[tokio::test]
    async fn test_remove_head_cancels_and_rearms() {
        let (engine, _broadcaster) = test_engine(1000);
        let (lobby_id, dj) = seeded_lobby(&engine, &[("t1", 300), ("t2", 300)]).await;

        engine
            .remove_track(lobby_id, dj, TrackSource::Spotify, "t1")
            .await
            .unwrap();

        let snapshot = engine.lobby_snapshot(lobby_id).unwrap();
        assert_eq!(snapshot.queue[0].id, "t2");
        assert!(snapshot.queue[0].started_at.is_some());
        assert!(engine.scheduler.is_armed(lobby_id));
    }

    #[tokio::test]
    async fn test_remove_last_track_cancels_timer() {
        let (engine, _broadcaster) = test_engine(1000);
        let (lobby_id, dj) = seeded_lobby(&engine, &[("t1", 300)]).await;

        engine
            .remove_track(lobby_id, dj, TrackSource::Spotify, "t1")
            .await
            .unwrap();

        assert!(!engine.scheduler.is_armed(lobby_id));
        assert!(engine.lobby_snapshot(lobby_id).unwrap().queue.is_empty());
    }

    #[tokio::test]
    async fn test_last_leave_tears_down_lobby() {
        let (engine, _broadcaster) = test_engine(1000);
        let (lobby_id, dj) = seeded_lobby(&engine, &[("t1", 300)]).await;

        engine.leave_lobby(lobby_id, dj).await.unwrap();

        assert_eq!(engine.active_lobbies(), 0);
        assert!(!engine.scheduler.is_armed(lobby_id));
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members() {
        let (engine, broadcaster) = test_engine(1000);
        let dj = generate_user_id();
        let snapshot = engine.create_lobby(dj, "alice").unwrap();
        broadcaster.clear();

        let bob = generate_user_id();
        engine.join_lobby(snapshot.id, bob, "bob").await.unwrap();

        let to_alice = broadcaster.messages_for(dj);
        assert_eq!(to_alice.len(), 1);
        assert!(matches!(to_alice[0], ServerMessage::UserJoined { .. }));
        // The joiner gets the snapshot reply, not a user_joined echo
        assert!(broadcaster.messages_for(bob).is_empty());
    }

    #[tokio::test]
    async fn test_join_unknown_lobby_fails() {
        let (engine, _broadcaster) = test_engine(1000);
        let err = engine
            .join_lobby(crate::utils::generate_lobby_id(), generate_user_id(), "zoe")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::LobbyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_creator_name_leaves_no_lobby() {
        let (engine, _broadcaster) = test_engine(1000);
        assert!(engine.create_lobby(generate_user_id(), "  ").is_err());
        assert_eq!(engine.active_lobbies(), 0);
    }
}
