//! Delayed job scheduler with priority dispatch
//!
//! A single scheduler task keeps submitted jobs in a time-ordered pending
//! heap. When the earliest deadline passes it moves every due job into a
//! priority-ordered ready heap and hands them to the worker pool, highest
//! priority first.

mod config;
mod core;
mod queue;

pub use config::SchedulerConfig;
pub use core::JobManager;
pub use queue::{JobId, PendingJob, ScheduledJob, SchedulerState, SchedulerStats};
