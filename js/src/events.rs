//! Event bus for job lifecycle and failure reporting
//!
//! Workers catch job failures at their boundary and report them here instead
//! of letting them escape. Subscribers (the CLI, tests) get every event
//! emitted after they subscribe; with no subscribers, events are dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::scheduler::JobId;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Something that happened to a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Scheduler handed the job to the worker pool
    Dispatched { id: JobId, name: String, priority: i32 },

    /// A worker began executing the job
    Started { name: String, worker: usize },

    /// `execute` returned Ok
    Completed { name: String, worker: usize },

    /// `execute` returned an error
    Failed { name: String, worker: usize, error: String },

    /// `execute` panicked
    Panicked { name: String, worker: usize, message: String },

    /// Pending job thrown away at scheduler shutdown
    Discarded { id: JobId, name: String },
}

impl JobEvent {
    /// Short event type name for logs
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Dispatched { .. } => "dispatched",
            JobEvent::Started { .. } => "started",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
            JobEvent::Panicked { .. } => "panicked",
            JobEvent::Discarded { .. } => "discarded",
        }
    }

    /// Name of the job this event concerns
    pub fn job_name(&self) -> &str {
        match self {
            JobEvent::Dispatched { name, .. }
            | JobEvent::Started { name, .. }
            | JobEvent::Completed { name, .. }
            | JobEvent::Failed { name, .. }
            | JobEvent::Panicked { name, .. }
            | JobEvent::Discarded { name, .. } => name,
        }
    }

    /// Whether this event reports a job failure
    pub fn is_failure(&self) -> bool {
        matches!(self, JobEvent::Failed { .. } | JobEvent::Panicked { .. })
    }
}

/// Broadcast bus shared by the pool and the scheduler
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: no subscribers is fine, and a lagging subscriber loses
    /// the oldest events.
    pub fn emit(&self, event: JobEvent) {
        debug!(event_type = event.event_type(), job = event.job_name(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(JobEvent::Completed {
            name: "a".to_string(),
            worker: 0,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "completed");
        assert_eq!(event.job_name(), "a");
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new(4);
        bus.emit(JobEvent::Started {
            name: "a".to_string(),
            worker: 1,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_is_failure() {
        let failed = JobEvent::Failed {
            name: "a".to_string(),
            worker: 0,
            error: "boom".to_string(),
        };
        let panicked = JobEvent::Panicked {
            name: "a".to_string(),
            worker: 0,
            message: "oops".to_string(),
        };
        let completed = JobEvent::Completed {
            name: "a".to_string(),
            worker: 0,
        };
        assert!(failed.is_failure());
        assert!(panicked.is_failure());
        assert!(!completed.is_failure());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = JobEvent::Dispatched {
            id: JobId(3),
            name: "b".to_string(),
            priority: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "dispatched");
        assert_eq!(json["id"], 3);
        assert_eq!(json["priority"], 3);
    }
}
