//! Queue types for the scheduler

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{Result, SchedulerError};
use crate::job::Job;

/// Stand-in for "never" when a deadline would overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `base + delay`, saturating to a far-future deadline instead of overflowing
pub(crate) fn deadline_after(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay).unwrap_or_else(|| base + FAR_FUTURE)
}

/// Identity assigned to a job at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A job bound to a priority, a next execution time, and optional recurrence
#[derive(Clone)]
pub struct ScheduledJob {
    pub job: Arc<dyn Job>,
    pub next_execution: Instant,
    pub priority: i32,
    pub recurring: bool,
    pub interval_secs: u64,
}

impl ScheduledJob {
    pub fn new(job: Arc<dyn Job>, priority: i32, next_execution: Instant, recurring: bool, interval_secs: u64) -> Self {
        Self {
            job,
            next_execution,
            priority,
            recurring,
            interval_secs,
        }
    }

    /// Run once at `at`
    pub fn once(job: Arc<dyn Job>, priority: i32, at: Instant) -> Self {
        Self::new(job, priority, at, false, 0)
    }

    /// Run first at `at`, then every `interval_secs` after each dispatch
    pub fn every(job: Arc<dyn Job>, priority: i32, at: Instant, interval_secs: u64) -> Self {
        Self::new(job, priority, at, true, interval_secs)
    }

    /// A recurring job needs a positive interval that `Instant` can represent
    pub fn validate(&self) -> Result<()> {
        let Some(interval) = self.interval() else {
            return Ok(());
        };
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval {
                interval_secs: self.interval_secs,
            });
        }
        if self.next_execution.checked_add(interval).is_none() {
            return Err(SchedulerError::IntervalTooLarge {
                interval_secs: self.interval_secs,
            });
        }
        Ok(())
    }

    /// Re-arm interval, if recurring
    pub fn interval(&self) -> Option<Duration> {
        self.recurring.then(|| Duration::from_secs(self.interval_secs))
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("job", &self.job.name())
            .field("next_execution", &self.next_execution)
            .field("priority", &self.priority)
            .field("recurring", &self.recurring)
            .field("interval_secs", &self.interval_secs)
            .finish()
    }
}

/// Record held in the pending heap
///
/// Heap order: earliest `next_execution` on top, lower id first on ties.
pub(crate) struct PendingEntry {
    pub id: JobId,
    pub job: Arc<dyn Job>,
    pub next_execution: Instant,
    pub priority: i32,
    pub interval: Option<Duration>,
}

impl PendingEntry {
    pub fn new(id: JobId, scheduled: ScheduledJob) -> Self {
        Self {
            id,
            interval: scheduled.interval(),
            job: scheduled.job,
            next_execution: scheduled.next_execution,
            priority: scheduled.priority,
        }
    }

    /// Dispatch ticket for the ready heap
    pub fn ticket(&self) -> ReadyTicket {
        ReadyTicket {
            id: self.id,
            job: self.job.clone(),
            priority: self.priority,
            due: self.next_execution,
        }
    }

    pub fn snapshot(&self) -> PendingJob {
        PendingJob {
            id: self.id,
            name: self.job.name().to_string(),
            priority: self.priority,
            next_execution: self.next_execution,
            interval: self.interval,
        }
    }
}

impl Eq for PendingEntry {}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.next_execution == other.next_execution
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so reverse both keys
        other
            .next_execution
            .cmp(&self.next_execution)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Due job waiting in the ready heap for dispatch
///
/// Heap order: higher priority first, then the one that was due earlier,
/// then lower id (submission order).
pub(crate) struct ReadyTicket {
    pub id: JobId,
    pub job: Arc<dyn Job>,
    pub priority: i32,
    pub due: Instant,
}

impl Eq for ReadyTicket {}

impl PartialEq for ReadyTicket {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for ReadyTicket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.due.cmp(&self.due))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ReadyTicket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending job as seen from outside the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJob {
    pub id: JobId,
    pub name: String,
    pub priority: i32,
    pub next_execution: Instant,
    pub interval: Option<Duration>,
}

impl PendingJob {
    pub fn is_recurring(&self) -> bool {
        self.interval.is_some()
    }
}

/// Where the scheduler loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing pending, waiting for a submit or stop
    WaitingForWork,
    /// Waiting until the earliest pending deadline, or an earlier submit or stop
    WaitingForTimer(Instant),
    /// Moving due jobs from pending to ready
    Draining,
    /// Handing ready jobs to the worker pool, highest priority first
    Dispatching,
    /// Terminal
    Stopped,
}

impl SchedulerState {
    /// Whether the scheduler task is parked until a submit, stop, or deadline
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingForWork | Self::WaitingForTimer(_))
    }
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_rejected: u64,
    pub total_dispatched: u64,
    pub total_discarded: u64,
    pub total_dropped: u64,
    pub wake_cycles: u64,
    pub peak_pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    use proptest::prelude::*;

    use crate::job::FnJob;

    fn noop() -> Arc<dyn Job> {
        Arc::new(FnJob::new("noop", || async { Ok(()) }))
    }

    fn pending(id: u64, at: Instant, priority: i32) -> PendingEntry {
        PendingEntry::new(JobId(id), ScheduledJob::once(noop(), priority, at))
    }

    #[test]
    fn test_recurring_zero_interval_invalid() {
        let job = ScheduledJob::every(noop(), 1, Instant::now(), 0);
        assert_eq!(
            job.validate(),
            Err(SchedulerError::InvalidInterval { interval_secs: 0 })
        );
    }

    #[test]
    fn test_one_shot_zero_interval_valid() {
        let job = ScheduledJob::once(noop(), 1, Instant::now());
        assert!(job.validate().is_ok());
        assert_eq!(job.interval(), None);
    }

    #[test]
    fn test_recurring_interval() {
        let job = ScheduledJob::every(noop(), 1, Instant::now(), 5);
        assert!(job.validate().is_ok());
        assert_eq!(job.interval(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_recurring_interval_past_instant_range_invalid() {
        let job = ScheduledJob::every(noop(), 1, Instant::now(), u64::MAX);
        assert_eq!(
            job.validate(),
            Err(SchedulerError::IntervalTooLarge { interval_secs: u64::MAX })
        );

        // Only recurrence matters; a one-shot never adds its interval
        let job = ScheduledJob::new(noop(), 1, Instant::now(), false, u64::MAX);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_deadline_after_saturates() {
        let base = Instant::now();
        assert_eq!(deadline_after(base, Duration::from_secs(5)), base + Duration::from_secs(5));
        assert_eq!(deadline_after(base, Duration::MAX), base + FAR_FUTURE);
    }

    #[test]
    fn test_pending_earliest_first() {
        let base = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(pending(1, base + Duration::from_secs(3), 9));
        heap.push(pending(2, base + Duration::from_secs(1), 0));
        heap.push(pending(3, base + Duration::from_secs(2), 5));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|e| e.id.0)).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_ready_same_priority_submission_order() {
        let due = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(pending(5, due, 1).ticket());
        heap.push(pending(2, due, 1).ticket());
        heap.push(pending(9, due, 1).ticket());

        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|t| t.id.0)).collect();
        assert_eq!(order, vec![2, 5, 9]);
    }

    #[test]
    fn test_ready_same_priority_earlier_due_first() {
        let base = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(pending(1, base + Duration::from_secs(1), 1).ticket());
        heap.push(pending(2, base, 1).ticket());

        assert_eq!(heap.pop().map(|t| t.id), Some(JobId(2)));
    }

    #[test]
    fn test_snapshot_reports_recurrence() {
        let at = Instant::now();
        let entry = PendingEntry::new(JobId(4), ScheduledJob::every(noop(), 3, at, 5));
        let snapshot = entry.snapshot();
        assert_eq!(snapshot.id, JobId(4));
        assert_eq!(snapshot.name, "noop");
        assert_eq!(snapshot.next_execution, at);
        assert!(snapshot.is_recurring());
    }

    #[test]
    fn test_waiting_states() {
        assert!(SchedulerState::WaitingForWork.is_waiting());
        assert!(SchedulerState::WaitingForTimer(Instant::now()).is_waiting());
        assert!(!SchedulerState::Draining.is_waiting());
        assert!(!SchedulerState::Dispatching.is_waiting());
        assert!(!SchedulerState::Stopped.is_waiting());
    }

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId(12).to_string(), "#12");
    }

    proptest! {
        #[test]
        fn prop_pending_pops_in_deadline_order(offsets in proptest::collection::vec(0u64..10_000, 1..64)) {
            let base = Instant::now();
            let mut heap: BinaryHeap<_> = offsets
                .iter()
                .enumerate()
                .map(|(i, ms)| pending(i as u64, base + Duration::from_millis(*ms), 0))
                .collect();

            let mut last: Option<(Instant, JobId)> = None;
            while let Some(entry) = heap.pop() {
                let key = (entry.next_execution, entry.id);
                if let Some(prev) = last {
                    prop_assert!(prev < key);
                }
                last = Some(key);
            }
        }

        #[test]
        fn prop_ready_pops_in_priority_order(priorities in proptest::collection::vec(-50i32..50, 1..64)) {
            let due = Instant::now();
            let mut heap: BinaryHeap<_> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| pending(i as u64, due, *p).ticket())
                .collect();

            let mut last: Option<(i32, JobId)> = None;
            while let Some(ticket) = heap.pop() {
                if let Some((prev_priority, prev_id)) = last {
                    prop_assert!(prev_priority >= ticket.priority);
                    if prev_priority == ticket.priority {
                        prop_assert!(prev_id < ticket.id);
                    }
                }
                last = Some((ticket.priority, ticket.id));
            }
        }
    }
}
