//! Scheduler error types

use thiserror::Error;

/// Errors returned synchronously at the scheduler boundary
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Recurring job requires a positive interval, got {interval_secs}s")]
    InvalidInterval { interval_secs: u64 },

    #[error("Interval of {interval_secs}s puts the next run past the end of time")]
    IntervalTooLarge { interval_secs: u64 },

    #[error("Delay of {delay_secs}s puts the first run past the end of time")]
    DelayTooLarge { delay_secs: u64 },

    #[error("Worker pool needs at least one worker, got {count}")]
    InvalidWorkerCount { count: usize },

    #[error("No tokio runtime available to spawn onto")]
    NoRuntime,
}

impl SchedulerError {
    /// Check if this error was caused by the caller's scheduling parameters
    pub fn is_invalid_parameters(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidInterval { .. }
                | SchedulerError::IntervalTooLarge { .. }
                | SchedulerError::DelayTooLarge { .. }
                | SchedulerError::InvalidWorkerCount { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_interval_message() {
        let err = SchedulerError::InvalidInterval { interval_secs: 0 };
        let msg = err.to_string();
        assert!(msg.contains("positive interval"));
        assert!(msg.contains("0s"));
    }

    #[test]
    fn test_invalid_worker_count_message() {
        let err = SchedulerError::InvalidWorkerCount { count: 0 };
        assert!(err.to_string().contains("at least one worker"));
    }

    #[test]
    fn test_is_invalid_parameters() {
        assert!(SchedulerError::InvalidInterval { interval_secs: 0 }.is_invalid_parameters());
        assert!(SchedulerError::InvalidWorkerCount { count: 0 }.is_invalid_parameters());
        assert!(SchedulerError::IntervalTooLarge { interval_secs: u64::MAX }.is_invalid_parameters());
        assert!(SchedulerError::DelayTooLarge { delay_secs: u64::MAX }.is_invalid_parameters());
        assert!(!SchedulerError::NoRuntime.is_invalid_parameters());
    }
}
