//! Health reporting for the listening-room service

use serde::{Deserialize, Serialize};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Snapshot handed out by the `/health` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub stats: ServiceStats,
}

/// Live service statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub active_lobbies: usize,
    pub connected_clients: usize,
    pub armed_timers: usize,
    pub configured_providers: usize,
    pub uptime_seconds: u64,
}

impl HealthReport {
    /// Build a report from live counters. The service is degraded, not
    /// unhealthy, when no catalog provider has credentials; lobbies still
    /// work without search.
    pub fn from_stats(service: &str, stats: ServiceStats) -> Self {
        let status = if stats.configured_providers == 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            service: service.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: crate::utils::current_timestamp(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(configured_providers: usize) -> ServiceStats {
        ServiceStats {
            active_lobbies: 2,
            connected_clients: 5,
            armed_timers: 1,
            configured_providers,
            uptime_seconds: 90,
        }
    }

    #[test]
    fn test_no_providers_is_degraded() {
        let report = HealthReport::from_stats("listening-room", stats(0));
        assert_eq!(report.status, HealthStatus::Degraded);

        let report = HealthReport::from_stats("listening-room", stats(2));
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(HealthStatus::Degraded).unwrap();
        assert_eq!(json, "degraded");
    }
}
