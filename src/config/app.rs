//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! listening-room service, including environment variable loading and
//! validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the HTTP and WebSocket server
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Catalog provider credentials; each provider is optional and an
/// unconfigured one degrades searches to a warning, never an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    /// Redirect URI registered for the Spotify authorization-code flow
    pub spotify_redirect_uri: String,
    pub soundcloud_client_id: Option<String>,
    pub youtube_api_key: Option<String>,
    /// Per-request timeout against provider APIs in seconds
    pub request_timeout_seconds: u64,
}

/// Playback-advance engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Applied when a source provided no duration or a non-positive one
    pub default_track_duration_secs: u32,
    /// Cool-down after an advance during which duplicate triggers are absorbed
    pub advance_cooldown_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "listening-room".to_string(),
            log_level: "info".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            spotify_client_id: None,
            spotify_client_secret: None,
            spotify_redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            soundcloud_client_id: None,
            youtube_api_key: None,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_track_duration_secs: 240,
            advance_cooldown_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            config.service.http_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HTTP_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Provider settings
        if let Ok(id) = env::var("SPOTIFY_CLIENT_ID") {
            config.providers.spotify_client_id = Some(id);
        }
        if let Ok(secret) = env::var("SPOTIFY_CLIENT_SECRET") {
            config.providers.spotify_client_secret = Some(secret);
        }
        if let Ok(uri) = env::var("SPOTIFY_REDIRECT_URI") {
            config.providers.spotify_redirect_uri = uri;
        }
        if let Ok(id) = env::var("SOUNDCLOUD_CLIENT_ID") {
            config.providers.soundcloud_client_id = Some(id);
        }
        if let Ok(key) = env::var("YOUTUBE_API_KEY") {
            config.providers.youtube_api_key = Some(key);
        }
        if let Ok(timeout) = env::var("PROVIDER_TIMEOUT_SECONDS") {
            config.providers.request_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid PROVIDER_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Playback settings
        if let Ok(duration) = env::var("DEFAULT_TRACK_DURATION_SECONDS") {
            config.playback.default_track_duration_secs = duration.parse().map_err(|_| {
                anyhow!("Invalid DEFAULT_TRACK_DURATION_SECONDS value: {}", duration)
            })?;
        }
        if let Ok(cooldown) = env::var("ADVANCE_COOLDOWN_MS") {
            config.playback.advance_cooldown_ms = cooldown
                .parse()
                .map_err(|_| anyhow!("Invalid ADVANCE_COOLDOWN_MS value: {}", cooldown))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the advance-guard cool-down as Duration
    pub fn advance_cooldown(&self) -> Duration {
        Duration::from_millis(self.playback.advance_cooldown_ms)
    }

    /// Get the provider request timeout as Duration
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.request_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.playback.default_track_duration_secs == 0 {
        return Err(anyhow!("Default track duration must be greater than 0"));
    }
    if config.playback.advance_cooldown_ms == 0 {
        return Err(anyhow!("Advance cool-down must be greater than 0"));
    }

    if config.providers.request_timeout_seconds == 0 {
        return Err(anyhow!("Provider timeout must be greater than 0"));
    }
    if config.providers.spotify_redirect_uri.is_empty() {
        return Err(anyhow!("Spotify redirect URI cannot be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.playback.default_track_duration_secs, 240);
        assert_eq!(config.playback.advance_cooldown_ms, 1000);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_cooldown_rejected() {
        let mut config = AppConfig::default();
        config.playback.advance_cooldown_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = AppConfig::default();
        assert_eq!(config.advance_cooldown(), Duration::from_millis(1000));
        assert_eq!(config.provider_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_toml_roundtrip() {
        let toml = r#"
            [service]
            name = "listening-room"
            log_level = "debug"
            http_port = 9000
            shutdown_timeout_seconds = 15

            [playback]
            default_track_duration_secs = 180
            advance_cooldown_ms = 500
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.service.http_port, 9000);
        assert_eq!(config.playback.default_track_duration_secs, 180);
        // Providers section omitted entirely falls back to defaults
        assert!(config.providers.spotify_client_id.is_none());
    }
}
