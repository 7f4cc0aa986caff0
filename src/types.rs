//! Common types used throughout the listening-room service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for lobbies
pub type LobbyId = Uuid;

/// Unique identifier for users; scoped to one live connection
pub type UserId = Uuid;

/// Role a user holds within a lobby, assigned once at join time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Dj,
    Spectator,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Dj => write!(f, "dj"),
            Role::Spectator => write!(f, "spectator"),
        }
    }
}

/// Music catalog a track descriptor originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Spotify,
    Soundcloud,
    Youtube,
}

impl TrackSource {
    pub const ALL: [TrackSource; 3] = [
        TrackSource::Spotify,
        TrackSource::Soundcloud,
        TrackSource::Youtube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackSource::Spotify => "spotify",
            TrackSource::Soundcloud => "soundcloud",
            TrackSource::Youtube => "youtube",
        }
    }
}

impl std::fmt::Display for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spotify" => Ok(TrackSource::Spotify),
            "soundcloud" => Ok(TrackSource::Soundcloud),
            "youtube" => Ok(TrackSource::Youtube),
            other => Err(format!("unknown track source: {}", other)),
        }
    }
}

/// A member of a lobby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// A queued track. Catalog identifiers are only unique within one source,
/// so deduplication is always scoped by the `(source, id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    pub source: TrackSource,
    /// Wall-clock instant playback began; stamped by the server whenever
    /// the track becomes queue head, never by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: u32,
}

/// Client-supplied track descriptor, before duration sanitization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSubmission {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub url: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    pub source: TrackSource,
    #[serde(default)]
    pub duration_secs: Option<i64>,
}

impl Track {
    /// Build a queueable track from a submission, applying the default
    /// duration when the source provided none, a non-positive value, or
    /// one too large to represent.
    pub fn from_submission(submission: TrackSubmission, default_duration_secs: u32) -> Self {
        let duration_secs = match submission.duration_secs {
            Some(secs) if secs > 0 => u32::try_from(secs).unwrap_or(default_duration_secs),
            _ => default_duration_secs,
        };

        Self {
            id: submission.id,
            title: submission.title,
            artist: submission.artist,
            url: submission.url,
            artwork_url: submission.artwork_url,
            preview_url: submission.preview_url,
            stream_url: submission.stream_url,
            source: submission.source,
            started_at: None,
            duration_secs,
        }
    }
}

/// Full lobby state as fanned out to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub id: LobbyId,
    pub users: Vec<User>,
    pub queue: Vec<Track>,
}
