//! Lobby instance implementation and lifecycle management
//!
//! This module contains the per-lobby state: the member list with its
//! two-dj role cap and the ordered playback queue with its head-stamping
//! invariant. All mutation goes through the playback engine; nothing here
//! touches timers or the network.

use crate::error::{LobbyError, Result};
use crate::types::{LobbyId, LobbySnapshot, Role, Track, TrackSource, User, UserId};
use crate::utils::{current_timestamp, generate_lobby_id};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Maximum number of dj roles per lobby
pub const MAX_DJS: usize = 2;

/// Result of a track removal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The id was not queued; silent no-op
    NotFound,
    /// The track was removed; `was_head` marks a head change
    Removed { was_head: bool },
}

/// One lobby: join-ordered users and the shared playback queue
#[derive(Debug, Clone)]
pub struct LobbyInstance {
    id: LobbyId,
    users: Vec<User>,
    queue: VecDeque<Track>,
    /// Advance guard: set while a dequeue-and-rearm is settling.
    /// Check-and-set is atomic because it happens under the registry lock.
    advance_in_flight: bool,
    created_at: DateTime<Utc>,
}

impl LobbyInstance {
    /// Create a new empty lobby with a fresh ID
    pub fn new() -> Self {
        Self::with_id(generate_lobby_id())
    }

    /// Create a lobby instance with a specific ID
    pub fn with_id(id: LobbyId) -> Self {
        Self {
            id,
            users: Vec::new(),
            queue: VecDeque::new(),
            advance_in_flight: false,
            created_at: current_timestamp(),
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Add a user. The first two joiners (creator included) become dj,
    /// everyone after that is a spectator; the role never changes.
    pub fn join(&mut self, user_id: UserId, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LobbyError::InvalidInput {
                reason: "display name cannot be empty".to_string(),
            }
            .into());
        }

        if self.users.iter().any(|u| u.id == user_id) {
            return Err(LobbyError::InvalidInput {
                reason: format!("user {} already in lobby", user_id),
            }
            .into());
        }

        let role = if self.dj_count() < MAX_DJS {
            Role::Dj
        } else {
            Role::Spectator
        };

        let user = User {
            id: user_id,
            name: name.to_string(),
            role,
            joined_at: current_timestamp(),
        };
        self.users.push(user.clone());

        Ok(user)
    }

    /// Remove a user; does not otherwise mutate the queue
    pub fn remove_user(&mut self, user_id: UserId) -> Option<User> {
        let idx = self.users.iter().position(|u| u.id == user_id)?;
        Some(self.users.remove(idx))
    }

    /// Append a track to the tail of the queue.
    ///
    /// Fails with `Unauthorized` unless the acting user holds the dj role and
    /// with `DuplicateTrack` when the same `(source, id)` pair is already
    /// queued. Returns whether the track became the new head, in which case
    /// its `started_at` has been stamped and the caller must arm the
    /// scheduler for it.
    pub fn add_track(&mut self, actor: UserId, mut track: Track) -> Result<bool> {
        self.require_dj(actor)?;

        if self
            .queue
            .iter()
            .any(|t| t.source == track.source && t.id == track.id)
        {
            return Err(LobbyError::DuplicateTrack {
                source: track.source.to_string(),
                track_id: track.id,
            }
            .into());
        }

        let became_head = self.queue.is_empty();
        if became_head {
            track.started_at = Some(current_timestamp());
        }
        self.queue.push_back(track);

        Ok(became_head)
    }

    /// Remove a queued track by `(source, id)`.
    ///
    /// A missing id is a silent no-op. When the head is removed and the queue
    /// stays non-empty, the new head is re-stamped (overwrite-always) and the
    /// caller must re-arm the scheduler; when the queue empties, the caller
    /// cancels the timer instead.
    pub fn remove_track(
        &mut self,
        actor: UserId,
        source: TrackSource,
        track_id: &str,
    ) -> Result<RemoveOutcome> {
        self.require_dj(actor)?;

        let Some(idx) = self
            .queue
            .iter()
            .position(|t| t.source == source && t.id == track_id)
        else {
            return Ok(RemoveOutcome::NotFound);
        };

        let was_head = idx == 0;
        let _ = self.queue.remove(idx);

        if was_head {
            self.stamp_head(current_timestamp());
        }

        Ok(RemoveOutcome::Removed { was_head })
    }

    /// Dequeue the head track
    pub fn pop_head(&mut self) -> Option<Track> {
        self.queue.pop_front()
    }

    /// Overwrite the head's `started_at`; no-op on an empty queue
    pub fn stamp_head(&mut self, now: DateTime<Utc>) {
        if let Some(head) = self.queue.front_mut() {
            head.started_at = Some(now);
        }
    }

    pub fn head(&self) -> Option<&Track> {
        self.queue.front()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn user(&self, user_id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|u| u.id).collect()
    }

    /// Member ids excluding one user (for join/leave fan-out)
    pub fn user_ids_except(&self, excluded: UserId) -> Vec<UserId> {
        self.users
            .iter()
            .filter(|u| u.id != excluded)
            .map(|u| u.id)
            .collect()
    }

    pub fn dj_count(&self) -> usize {
        self.users.iter().filter(|u| u.role == Role::Dj).count()
    }

    pub fn queue_snapshot(&self) -> Vec<Track> {
        self.queue.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            id: self.id,
            users: self.users.clone(),
            queue: self.queue_snapshot(),
        }
    }

    pub fn advance_in_flight(&self) -> bool {
        self.advance_in_flight
    }

    pub fn set_advance_in_flight(&mut self, value: bool) {
        self.advance_in_flight = value;
    }

    fn require_dj(&self, actor: UserId) -> Result<()> {
        match self.user(actor) {
            Some(user) if user.role == Role::Dj => Ok(()),
            Some(_) => Err(LobbyError::Unauthorized.into()),
            None => Err(LobbyError::UserNotFound {
                user_id: actor.to_string(),
            }
            .into()),
        }
    }
}

impl Default for LobbyInstance {
    fn default() -> Self {
        Self::new()
    }
}
