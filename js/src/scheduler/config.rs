//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Priority given to jobs that don't name one
    #[serde(default, rename = "default-priority")]
    pub default_priority: i32,

    /// Upper bound on a single timer wait; unset waits exactly until the deadline
    #[serde(default, rename = "max-wait-secs", skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,
}

impl SchedulerConfig {
    /// Get the max wait as a Duration
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}
