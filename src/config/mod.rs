//! Configuration management for the listening-room service
//!
//! This module handles all configuration loading from environment variables,
//! TOML files, validation, and default values.

pub mod app;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, PlaybackSettings, ProviderSettings, ServiceSettings,
};
