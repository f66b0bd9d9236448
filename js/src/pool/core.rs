//! Worker pool implementation

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SchedulerError};
use crate::events::{EventBus, JobEvent};
use crate::job::Job;

use super::config::PoolConfig;

/// Queue state protected by the pool lock
struct PoolQueue {
    jobs: VecDeque<Arc<dyn Job>>,
    stopping: bool,
}

/// State shared between the pool handle and its workers
struct PoolShared {
    queue: Mutex<PoolQueue>,
    notify: Notify,
    events: EventBus,
    executed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    dropped: AtomicU64,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

/// Snapshot of pool counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs whose `execute` returned Ok
    pub executed: u64,
    /// Jobs whose `execute` returned an error
    pub failed: u64,
    /// Jobs whose `execute` panicked
    pub panicked: u64,
    /// Jobs pushed after shutdown began
    pub dropped: u64,
    /// Jobs executing right now
    pub running: usize,
    /// Most jobs ever executing at once
    pub peak_running: usize,
}

impl PoolStats {
    /// Jobs that ran to an outcome, successful or not
    pub fn finished(&self) -> u64 {
        self.executed + self.failed + self.panicked
    }
}

/// Fixed set of workers consuming a shared FIFO of jobs
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Create a pool with `worker_count` workers on the current tokio runtime
    pub fn new(worker_count: usize) -> Result<Self> {
        Self::with_config(PoolConfig::with_workers(worker_count))
    }

    /// Create a pool from configuration
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        debug!(?config, "WorkerPool::with_config: called");
        if config.workers == 0 {
            return Err(SchedulerError::InvalidWorkerCount { count: config.workers });
        }
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let shared = Arc::new(PoolShared {
            queue: Mutex::new(PoolQueue {
                jobs: VecDeque::new(),
                stopping: false,
            }),
            notify: Notify::new(),
            events: EventBus::new(config.event_capacity),
            executed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        });

        let workers = (0..config.workers)
            .map(|worker| handle.spawn(run_worker(worker, shared.clone())))
            .collect();

        info!(workers = config.workers, "Worker pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count: config.workers,
        })
    }

    /// Enqueue a job and wake one idle worker
    ///
    /// Once shutdown has begun this silently drops the job.
    pub fn push(&self, job: Arc<dyn Job>) {
        debug!(job = job.name(), "WorkerPool::push: called");
        {
            let mut queue = self.shared.lock_queue();
            if queue.stopping {
                debug!(job = job.name(), "WorkerPool::push: shutting down, dropping job");
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            queue.jobs.push_back(job);
        }
        self.shared.notify.notify_one();
    }

    /// Stop accepting work, drain the queue, and wait for every worker to exit
    ///
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        debug!("WorkerPool::shutdown: called");
        self.shared.request_stop();

        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        if handles.is_empty() {
            debug!("WorkerPool::shutdown: already shut down");
            return;
        }

        for (worker, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(worker, error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool shut down");
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// The bus this pool reports on
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.lock_queue().jobs.len()
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shared.lock_queue().stopping
    }

    /// Get the pool counters
    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            executed: shared.executed.load(Ordering::Relaxed),
            failed: shared.failed.load(Ordering::Relaxed),
            panicked: shared.panicked.load(Ordering::Relaxed),
            dropped: shared.dropped.load(Ordering::Relaxed),
            running: shared.running.load(Ordering::Relaxed),
            peak_running: shared.peak_running.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers drain whatever is queued and exit on their own
        self.shared.request_stop();
    }
}

impl PoolShared {
    fn lock_queue(&self) -> MutexGuard<'_, PoolQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_stop(&self) {
        let mut queue = self.lock_queue();
        if !queue.stopping {
            debug!(queued = queue.jobs.len(), "PoolShared::request_stop: stopping");
            queue.stopping = true;
        }
        drop(queue);
        self.notify.notify_waiters();
    }

    /// Pop the front job, waiting while the queue is empty
    ///
    /// Returns None once stop is requested and nothing is left. A worker is
    /// only registered with `notify` while it has nothing to run, so a push
    /// always wakes an idle worker.
    async fn next_job(&self) -> Option<Arc<dyn Job>> {
        loop {
            let next = self.lock_queue().jobs.pop_front();
            if next.is_some() {
                return next;
            }

            // Register before re-checking so a push or stop in between is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (next, stopping) = {
                let mut queue = self.lock_queue();
                (queue.jobs.pop_front(), queue.stopping)
            };
            if next.is_some() || stopping {
                return next;
            }
            notified.await;
        }
    }

    async fn run_job(&self, worker: usize, job: Arc<dyn Job>) {
        let name = job.name().to_string();
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);
        debug!(worker, job = %name, running, "PoolShared::run_job: executing");
        self.events.emit(JobEvent::Started {
            name: name.clone(),
            worker,
        });

        let outcome = AssertUnwindSafe(job.execute()).catch_unwind().await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(Ok(())) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                self.events.emit(JobEvent::Completed { name, worker });
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, job = %name, error = %e, "Job failed");
                self.events.emit(JobEvent::Failed {
                    name,
                    worker,
                    error: format!("{:#}", e),
                });
            }
            Err(payload) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(payload.as_ref());
                error!(worker, job = %name, %message, "Job panicked");
                self.events.emit(JobEvent::Panicked { name, worker, message });
            }
        }
    }
}

/// Worker loop: take the front job, run it, repeat until stopped and drained
async fn run_worker(worker: usize, shared: Arc<PoolShared>) {
    debug!(worker, "run_worker: started");
    while let Some(job) = shared.next_job().await {
        shared.run_job(worker, job).await;
    }
    debug!(worker, "run_worker: exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
