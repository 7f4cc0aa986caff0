//! Playback-advance engine: the deadline scheduler and the guarded
//! dequeue-and-rearm state machine

pub mod engine;
pub mod scheduler;

pub use engine::PlaybackEngine;
pub use scheduler::{remaining_ms, AdvanceScheduler};
