//! Service wiring: shared state, HTTP surface, and health reporting

pub mod app;
pub mod health;

pub use app::AppState;
pub use health::{HealthReport, HealthStatus};
