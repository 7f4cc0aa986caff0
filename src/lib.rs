//! Listening Room - synchronized group-listening service
//!
//! This crate provides shared music lobbies over WebSockets: a per-lobby
//! playback queue with server-side advance timing, duplicate-trigger
//! suppression, and catalog search across Spotify, SoundCloud, and YouTube.

pub mod config;
pub mod error;
pub mod gateway;
pub mod lobby;
pub mod metrics;
pub mod playback;
pub mod providers;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LobbyError, Result};
pub use types::*;

// Re-export key components
pub use gateway::{Broadcaster, SessionGateway};
pub use lobby::{LobbyInstance, LobbyRegistry};
pub use playback::PlaybackEngine;
pub use providers::{CatalogProvider, SearchAggregator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
