//! jobscheduler - delayed job scheduler with priority dispatch
//!
//! A single scheduler task holds submitted jobs until they are due, then
//! hands them to a fixed-size [`WorkerPool`] highest priority first.
//!
//! # Core Concepts
//!
//! - **Pending**: time-ordered heap of jobs waiting for their `next_execution`
//! - **Ready**: priority-ordered heap of jobs that came due in one wake cycle
//! - **Recurring**: re-armed at dispatch time (`wake + interval`), not at completion
//! - **Graceful shutdown**: the manager discards pending work, the pool drains what it was given
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use jobscheduler::{JobManager, SleepJob, WorkerPool};
//!
//! let pool = Arc::new(WorkerPool::new(2)?);
//! let manager = JobManager::new(pool.clone())?;
//! manager.submit_after(Arc::new(SleepJob::new(1, Duration::from_secs(3))), 1, Duration::from_secs(2), false, 0)?;
//! manager.submit_after(Arc::new(SleepJob::new(2, Duration::from_secs(3))), 3, Duration::from_secs(2), true, 5)?;
//! // ...
//! manager.shutdown().await;
//! pool.shutdown().await;
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod pool;
pub mod scheduler;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{Config, JobSpec};
pub use error::SchedulerError;
pub use events::{EventBus, JobEvent};
pub use job::{FnJob, Job, SleepJob};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use scheduler::{JobId, JobManager, PendingJob, ScheduledJob, SchedulerConfig, SchedulerState, SchedulerStats};
pub use tokio::time::Instant;
