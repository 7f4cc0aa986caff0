//! Lobby domain: per-lobby state and the process-wide registry

pub mod instance;
pub mod registry;

pub use instance::{LobbyInstance, RemoveOutcome};
pub use registry::LobbyRegistry;
