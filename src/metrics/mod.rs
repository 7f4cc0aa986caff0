//! Metrics collection and Prometheus exposition

pub mod collector;

pub use collector::MetricsCollector;
