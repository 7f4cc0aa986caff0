//! Prometheus metrics for the listening-room service.

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector shared across the service.
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    /// Lobbies currently in the registry
    pub active_lobbies: IntGauge,

    /// WebSocket sessions currently connected
    pub connected_clients: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounter,

    /// Total tracks accepted into queues
    pub tracks_queued_total: IntCounter,

    /// Total queue advances performed
    pub advances_total: IntCounter,

    /// Advance triggers suppressed by the in-flight guard
    pub duplicate_advances_suppressed_total: IntCounter,

    /// Catalog search requests by source
    pub search_requests_total: IntCounterVec,

    started_at: Instant,
}

impl MetricsCollector {
    /// Create a collector with a fresh registry.
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let active_lobbies = IntGauge::new(
            "listening_room_active_lobbies",
            "Number of lobbies currently active",
        )?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let connected_clients = IntGauge::new(
            "listening_room_connected_clients",
            "Number of WebSocket sessions currently connected",
        )?;
        registry.register(Box::new(connected_clients.clone()))?;

        let lobbies_created_total = IntCounter::new(
            "listening_room_lobbies_created_total",
            "Total lobbies created",
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let tracks_queued_total = IntCounter::new(
            "listening_room_tracks_queued_total",
            "Total tracks accepted into lobby queues",
        )?;
        registry.register(Box::new(tracks_queued_total.clone()))?;

        let advances_total = IntCounter::new(
            "listening_room_advances_total",
            "Total queue advances performed",
        )?;
        registry.register(Box::new(advances_total.clone()))?;

        let duplicate_advances_suppressed_total = IntCounter::new(
            "listening_room_duplicate_advances_suppressed_total",
            "Advance triggers suppressed while an advance was in flight",
        )?;
        registry.register(Box::new(duplicate_advances_suppressed_total.clone()))?;

        let search_requests_total = IntCounterVec::new(
            Opts::new(
                "listening_room_search_requests_total",
                "Catalog search requests by source",
            ),
            &["source"],
        )?;
        registry.register(Box::new(search_requests_total.clone()))?;

        Ok(Self {
            registry,
            active_lobbies,
            connected_clients,
            lobbies_created_total,
            tracks_queued_total,
            advances_total,
            duplicate_advances_suppressed_total,
            search_requests_total,
            started_at: Instant::now(),
        })
    }

    /// Get the Prometheus registry for exposition.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Seconds since the collector was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_registers_metrics() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.active_lobbies.set(3);
        metrics.lobbies_created_total.inc();
        metrics
            .search_requests_total
            .with_label_values(&["spotify"])
            .inc();

        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "listening_room_active_lobbies"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "listening_room_search_requests_total"));
    }

    #[test]
    fn test_collector_counts() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.advances_total.inc();
        metrics.advances_total.inc();
        metrics.duplicate_advances_suppressed_total.inc();

        assert_eq!(metrics.advances_total.get(), 2);
        assert_eq!(metrics.duplicate_advances_suppressed_total.get(), 1);
    }
}
