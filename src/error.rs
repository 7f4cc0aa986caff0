//! Error types for the listening-room service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific lobby scenarios
///
/// `Display` and `std::error::Error` are implemented by hand because the
/// `DuplicateTrack::source` field names a track provider, not an error
/// cause, and the `thiserror` derive would unconditionally treat it as
/// the latter.
#[derive(Debug)]
pub enum LobbyError {
    InvalidInput { reason: String },

    LobbyNotFound { lobby_id: String },

    UserNotFound { user_id: String },

    Unauthorized,

    DuplicateTrack { source: String, track_id: String },

    ProviderUnavailable { message: String },

    ConfigurationError { message: String },

    InternalError { message: String },
}

impl std::fmt::Display for LobbyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyError::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
            LobbyError::LobbyNotFound { lobby_id } => write!(f, "lobby not found: {lobby_id}"),
            LobbyError::UserNotFound { user_id } => write!(f, "user not found: {user_id}"),
            LobbyError::Unauthorized => write!(f, "only a dj may modify the queue"),
            LobbyError::DuplicateTrack { source, track_id } => {
                write!(f, "track already queued: {source}:{track_id}")
            }
            LobbyError::ProviderUnavailable { message } => {
                write!(f, "provider unavailable: {message}")
            }
            LobbyError::ConfigurationError { message } => {
                write!(f, "configuration error: {message}")
            }
            LobbyError::InternalError { message } => {
                write!(f, "internal service error: {message}")
            }
        }
    }
}

impl std::error::Error for LobbyError {}

impl LobbyError {
    /// Message that may be surfaced to the originating client.
    ///
    /// Internal faults are logged at the process level and never sent out.
    pub fn client_message(&self) -> Option<String> {
        match self {
            LobbyError::InvalidInput { .. }
            | LobbyError::LobbyNotFound { .. }
            | LobbyError::UserNotFound { .. }
            | LobbyError::Unauthorized
            | LobbyError::DuplicateTrack { .. } => Some(self.to_string()),
            LobbyError::ProviderUnavailable { .. }
            | LobbyError::ConfigurationError { .. }
            | LobbyError::InternalError { .. } => None,
        }
    }
}
