//! Fixed-size worker pool
//!
//! N workers consume a shared FIFO of jobs. Shutdown is a graceful drain:
//! queued work still runs, then the workers exit.

mod config;
mod core;

pub use config::PoolConfig;
pub use core::{PoolStats, WorkerPool};
