//! Wire protocol for the real-time duplex channel
//!
//! JSON messages tagged by `type`. Inbound messages after `join_lobby` are
//! connection-scoped: the gateway resolves the acting user and lobby from
//! the socket session, so `add_track` and friends carry no lobby id.

use crate::types::{LobbyId, LobbySnapshot, Track, TrackSource, TrackSubmission, User};
use serde::{Deserialize, Serialize};

/// Messages a client may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateLobby {
        name: String,
    },
    JoinLobby {
        lobby_id: LobbyId,
        name: String,
    },
    AddTrack {
        track: TrackSubmission,
    },
    RemoveTrack {
        source: TrackSource,
        track_id: String,
    },
    /// Fallback completion signal; the server-side deadline is authoritative
    /// and this is only honored when no timer is armed for the lobby
    TrackEnded,
}

/// Messages the server fans out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LobbyCreated { lobby: LobbySnapshot },
    LobbyJoined { lobby: LobbySnapshot },
    UserJoined { user: User },
    UserLeft { user: User },
    QueueUpdated { queue: Vec<Track> },
    LobbyError { message: String },
}

impl ServerMessage {
    /// Wire tag, mirrored from the serde rename; handy for test assertions
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::LobbyCreated { .. } => "lobby_created",
            ServerMessage::LobbyJoined { .. } => "lobby_joined",
            ServerMessage::UserJoined { .. } => "user_joined",
            ServerMessage::UserLeft { .. } => "user_left",
            ServerMessage::QueueUpdated { .. } => "queue_updated",
            ServerMessage::LobbyError { .. } => "lobby_error",
        }
    }
}
