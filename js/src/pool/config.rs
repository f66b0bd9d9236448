//! Worker pool configuration

use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_CHANNEL_CAPACITY;

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker tasks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the job event channel
    #[serde(default = "default_event_capacity", rename = "event-capacity")]
    pub event_capacity: usize,
}

fn default_workers() -> usize {
    2
}

fn default_event_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl PoolConfig {
    /// Config with the given worker count and default everything else
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_with_workers() {
        let config = PoolConfig::with_workers(8);
        assert_eq!(config.workers, 8);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: PoolConfig = serde_yaml::from_str("workers: 4").unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.event_capacity, DEFAULT_CHANNEL_CAPACITY);
    }
}
