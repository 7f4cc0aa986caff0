//! Test fixtures shared by the integration tests

use listening_room::config::PlaybackSettings;
use listening_room::gateway::MockBroadcaster;
use listening_room::metrics::MetricsCollector;
use listening_room::types::{TrackSource, TrackSubmission};
use listening_room::PlaybackEngine;
use std::sync::Arc;

/// Cooldown short enough for tests to wait out
pub const TEST_COOLDOWN_MS: u64 = 150;

/// Engine wired to a capturing broadcaster
pub fn create_test_engine() -> (Arc<PlaybackEngine>, Arc<MockBroadcaster>) {
    create_test_engine_with_cooldown(TEST_COOLDOWN_MS)
}

pub fn create_test_engine_with_cooldown(
    cooldown_ms: u64,
) -> (Arc<PlaybackEngine>, Arc<MockBroadcaster>) {
    let broadcaster = Arc::new(MockBroadcaster::new());
    let settings = PlaybackSettings {
        default_track_duration_secs: 240,
        advance_cooldown_ms: cooldown_ms,
    };
    let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));
    let engine = Arc::new(PlaybackEngine::new(broadcaster.clone(), settings, metrics));
    (engine, broadcaster)
}

/// Track submission with an explicit duration in seconds
pub fn submission(id: &str, source: TrackSource, duration_secs: i64) -> TrackSubmission {
    TrackSubmission {
        id: id.to_string(),
        title: format!("Track {}", id),
        artist: "Integration Artist".to_string(),
        url: format!("https://example.com/{}", id),
        artwork_url: None,
        preview_url: None,
        stream_url: None,
        source,
        duration_secs: Some(duration_secs),
    }
}
