//! Job capability and a few ready-made implementations

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

/// A unit of work the scheduler can dispatch
///
/// `execute` runs on whichever worker picks the job up. It must not assume
/// anything about which worker that is, or when it happens.
#[async_trait]
pub trait Job: Send + Sync {
    /// Label used in logs and events
    fn name(&self) -> &str {
        "job"
    }

    /// Perform the work
    async fn execute(&self) -> eyre::Result<()>;
}

type BoxedJobFuture = Pin<Box<dyn Future<Output = eyre::Result<()>> + Send>>;

/// Adapter turning an async closure into a [`Job`]
pub struct FnJob {
    name: String,
    func: Box<dyn Fn() -> BoxedJobFuture + Send + Sync>,
}

impl FnJob {
    /// Create a job from a closure returning a future
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let name = name.into();
        debug!(%name, "FnJob::new: called");
        Self {
            name,
            func: Box::new(move || Box::pin(func())),
        }
    }
}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl Job for FnJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> eyre::Result<()> {
        (self.func)().await
    }
}

/// Demo job that announces itself, sleeps, and announces completion
#[derive(Debug, Clone)]
pub struct SleepJob {
    id: u32,
    name: String,
    duration: Duration,
}

impl SleepJob {
    pub fn new(id: u32, duration: Duration) -> Self {
        Self {
            id,
            name: format!("job-{}", id),
            duration,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl Job for SleepJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> eyre::Result<()> {
        info!(id = self.id, "Starting: {}", self.id);
        println!("Starting: {}", self.id);
        tokio::time::sleep(self.duration).await;
        info!(id = self.id, "Ended: {}", self.id);
        println!("Ended: {}", self.id);
        Ok(())
    }
}
