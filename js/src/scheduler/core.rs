//! Job manager implementation

use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::{Clock, TokioClock};
use crate::error::{Result, SchedulerError};
use crate::events::JobEvent;
use crate::job::Job;
use crate::pool::WorkerPool;

use super::config::SchedulerConfig;
use super::queue::{JobId, PendingEntry, deadline_after, PendingJob, ReadyTicket, ScheduledJob, SchedulerState, SchedulerStats};

/// Internal state protected by the manager lock
struct ManagerInner {
    /// Time-ordered jobs not yet due
    pending: BinaryHeap<PendingEntry>,

    /// Priority-ordered due jobs, filled and emptied within one wake cycle
    ready: BinaryHeap<ReadyTicket>,

    next_id: u64,
    stopping: bool,
    state: SchedulerState,
    stats: SchedulerStats,
}

/// State shared between the manager handle and the scheduler task
struct ManagerShared {
    inner: Mutex<ManagerInner>,
    wakeup: Notify,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

/// The JobManager holds delayed and recurring jobs and feeds due ones to a
/// [`WorkerPool`] in priority order.
pub struct JobManager {
    shared: Arc<ManagerShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JobManager {
    /// Create a manager driven by the tokio clock
    pub fn new(pool: Arc<WorkerPool>) -> Result<Self> {
        Self::with_clock(pool, Arc::new(TokioClock))
    }

    /// Create a manager driven by the given clock
    pub fn with_clock(pool: Arc<WorkerPool>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_config(pool, clock, SchedulerConfig::default())
    }

    /// Create a manager with explicit clock and configuration
    pub fn with_config(pool: Arc<WorkerPool>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Result<Self> {
        debug!(?config, workers = pool.worker_count(), "JobManager::with_config: called");
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let shared = Arc::new(ManagerShared {
            inner: Mutex::new(ManagerInner {
                pending: BinaryHeap::new(),
                ready: BinaryHeap::new(),
                next_id: 1,
                stopping: false,
                state: SchedulerState::WaitingForWork,
                stats: SchedulerStats::default(),
            }),
            wakeup: Notify::new(),
            pool,
            clock,
            config,
        });

        let task = handle.spawn(run_scheduler(shared.clone()));
        Ok(Self {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// Submit a job to run at `next_execution`
    ///
    /// A recurring job is re-armed `interval_secs` after each dispatch, so a
    /// slow job may overlap its own next run. `recurring` with a zero interval
    /// is rejected. After shutdown the job is silently dropped.
    pub fn submit(
        &self,
        job: Arc<dyn Job>,
        priority: i32,
        next_execution: Instant,
        recurring: bool,
        interval_secs: u64,
    ) -> Result<JobId> {
        self.schedule(ScheduledJob::new(job, priority, next_execution, recurring, interval_secs))
    }

    /// Submit a job to run `delay` from now
    ///
    /// A delay too large for `Instant` to represent is rejected.
    pub fn submit_after(
        &self,
        job: Arc<dyn Job>,
        priority: i32,
        delay: Duration,
        recurring: bool,
        interval_secs: u64,
    ) -> Result<JobId> {
        let next_execution = self
            .shared
            .clock
            .now()
            .checked_add(delay)
            .ok_or(SchedulerError::DelayTooLarge {
                delay_secs: delay.as_secs(),
            })?;
        self.submit(job, priority, next_execution, recurring, interval_secs)
    }

    /// Submit a prebuilt scheduled job
    pub fn schedule(&self, scheduled: ScheduledJob) -> Result<JobId> {
        debug!(?scheduled, "JobManager::schedule: called");
        let mut inner = self.shared.lock_inner();

        if let Err(e) = scheduled.validate() {
            debug!(error = %e, "JobManager::schedule: rejected");
            inner.stats.total_rejected += 1;
            return Err(e);
        }

        let id = JobId(inner.next_id);
        inner.next_id += 1;

        if inner.stopping {
            debug!(%id, "JobManager::schedule: shutting down, dropping job");
            inner.stats.total_dropped += 1;
            return Ok(id);
        }

        inner.pending.push(PendingEntry::new(id, scheduled));
        inner.stats.total_submitted += 1;
        inner.stats.peak_pending = inner.stats.peak_pending.max(inner.pending.len());
        drop(inner);

        // Wake the scheduler in case this deadline is earlier than the one it waits on
        self.shared.wakeup.notify_one();
        Ok(id)
    }

    /// Stop the scheduler task, discarding pending jobs, and wait for it to exit
    ///
    /// Jobs already handed to the pool are untouched; shut the pool down
    /// separately to drain them. Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        debug!("JobManager::shutdown: called");
        self.shared.request_stop();

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    warn!(error = %e, "Scheduler task ended abnormally");
                }
            }
            None => debug!("JobManager::shutdown: already shut down"),
        }
    }

    /// Number of jobs waiting for their time
    pub fn pending_len(&self) -> usize {
        self.shared.lock_inner().pending.len()
    }

    /// Pending jobs, earliest first
    pub fn pending_snapshot(&self) -> Vec<PendingJob> {
        let inner = self.shared.lock_inner();
        let mut jobs: Vec<_> = inner.pending.iter().map(PendingEntry::snapshot).collect();
        jobs.sort_by(|a, b| a.next_execution.cmp(&b.next_execution).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Where the scheduler loop currently is
    pub fn state(&self) -> SchedulerState {
        self.shared.lock_inner().state
    }

    /// Get the scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        self.shared.lock_inner().stats.clone()
    }

    /// The pool this manager dispatches to
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.shared.pool
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        // The task discards pending work and exits on its own
        self.shared.request_stop();
    }
}

impl ManagerShared {
    fn lock_inner(&self) -> MutexGuard<'_, ManagerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_stop(&self) {
        let mut inner = self.lock_inner();
        if !inner.stopping {
            debug!(pending = inner.pending.len(), "ManagerShared::request_stop: stopping");
            inner.stopping = true;
        }
        drop(inner);
        self.wakeup.notify_one();
    }

    /// Pick the wait state for the current pending heap
    fn next_wait_state(&self, inner: &mut ManagerInner) -> SchedulerState {
        if inner.stopping {
            return self.stop(inner);
        }
        match inner.pending.peek() {
            Some(entry) => SchedulerState::WaitingForTimer(entry.next_execution),
            None => SchedulerState::WaitingForWork,
        }
    }

    /// Discard everything pending and enter the terminal state
    fn stop(&self, inner: &mut ManagerInner) -> SchedulerState {
        let discarded: Vec<_> = inner.pending.drain().collect();
        if !discarded.is_empty() {
            info!(count = discarded.len(), "Discarding pending jobs at shutdown");
        }
        for entry in discarded {
            inner.stats.total_discarded += 1;
            self.pool.events().emit(JobEvent::Discarded {
                id: entry.id,
                name: entry.job.name().to_string(),
            });
        }
        SchedulerState::Stopped
    }

    /// One wake cycle: drain due jobs, dispatch them, pick the next wait
    ///
    /// Runs under a single manager-lock acquisition, so a concurrent submit
    /// is only considered on the next wake.
    fn run_cycle(&self) -> SchedulerState {
        let mut inner = self.lock_inner();
        let next = if inner.stopping {
            self.stop(&mut inner)
        } else {
            inner.state = SchedulerState::Draining;
            self.drain(&mut inner);
            inner.state = SchedulerState::Dispatching;
            self.dispatch(&mut inner);
            self.next_wait_state(&mut inner)
        };
        inner.state = next;
        next
    }

    /// Move every due job from pending to ready, re-arming recurring ones
    fn drain(&self, inner: &mut ManagerInner) {
        let now = self.clock.now();
        inner.stats.wake_cycles += 1;

        while inner.pending.peek().is_some_and(|entry| entry.next_execution <= now) {
            let Some(mut entry) = inner.pending.pop() else {
                break;
            };
            inner.ready.push(entry.ticket());

            if let Some(interval) = entry.interval {
                // Re-armed from the wake time, not from when the job finishes
                entry.next_execution = deadline_after(now, interval);
                debug!(id = %entry.id, ?interval, "ManagerShared::drain: re-armed recurring job");
                inner.pending.push(entry);
            }
        }

        debug!(ready = inner.ready.len(), pending = inner.pending.len(), "ManagerShared::drain: done");
    }

    /// Hand every ready job to the pool, highest priority first
    fn dispatch(&self, inner: &mut ManagerInner) {
        while let Some(ticket) = inner.ready.pop() {
            debug!(id = %ticket.id, priority = ticket.priority, "ManagerShared::dispatch: dispatching");
            self.pool.events().emit(JobEvent::Dispatched {
                id: ticket.id,
                name: ticket.job.name().to_string(),
                priority: ticket.priority,
            });
            self.pool.push(ticket.job);
            inner.stats.total_dispatched += 1;
        }
    }

    /// Bound a timer wait by the configured maximum
    fn cap_deadline(&self, deadline: Instant) -> Instant {
        match self.config.max_wait() {
            Some(max_wait) => deadline.min(deadline_after(self.clock.now(), max_wait)),
            None => deadline,
        }
    }
}

/// Scheduler task: wait, drain due jobs, dispatch them, repeat until stopped
async fn run_scheduler(shared: Arc<ManagerShared>) {
    info!("Scheduler started");
    let mut state = {
        let mut inner = shared.lock_inner();
        let state = shared.next_wait_state(&mut inner);
        inner.state = state;
        state
    };

    loop {
        match state {
            SchedulerState::WaitingForWork => {
                debug!("run_scheduler: waiting for work");
                shared.wakeup.notified().await;
            }
            SchedulerState::WaitingForTimer(deadline) => {
                let deadline = shared.cap_deadline(deadline);
                debug!(?deadline, "run_scheduler: waiting for timer");
                tokio::select! {
                    _ = shared.wakeup.notified() => {}
                    _ = shared.clock.sleep_until(deadline) => {}
                }
            }
            SchedulerState::Stopped => break,
            // Only held inside run_cycle's critical section
            SchedulerState::Draining | SchedulerState::Dispatching => {}
        }
        state = shared.run_cycle();
    }
    info!("Scheduler stopped");
}
