//! Clock sources for the scheduler
//!
//! The scheduler never reads time directly. It asks a [`Clock`] for `now()`
//! and waits on `sleep_until(deadline)`, which lets tests drive time by hand
//! with [`ManualClock`] instead of sleeping for real.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Monotonic time source with wait-until-deadline support
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Resolve once `now() >= deadline`
    async fn sleep_until(&self, deadline: Instant);
}

/// Clock backed by `tokio::time`
///
/// Honors tokio's paused test time, so `#[tokio::test(start_paused = true)]`
/// runs scheduler timers without real waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Simulated clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    tx: watch::Sender<Instant>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock frozen at `start`
    pub fn starting_at(start: Instant) -> Self {
        debug!(?start, "ManualClock::starting_at: called");
        let (tx, _rx) = watch::channel(start);
        Self { tx }
    }

    /// Move time forward, waking every sleeper whose deadline has passed
    pub fn advance(&self, by: Duration) {
        debug!(?by, "ManualClock::advance: called");
        self.tx.send_modify(|now| *now += by);
    }

    /// Jump to `instant`; moving backwards is ignored
    pub fn set(&self, instant: Instant) {
        debug!(?instant, "ManualClock::set: called");
        self.tx.send_if_modified(|now| {
            if instant > *now {
                *now = instant;
                true
            } else {
                false
            }
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.tx.borrow()
    }

    async fn sleep_until(&self, deadline: Instant) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|now| *now >= deadline).await.is_err() {
            debug!("ManualClock::sleep_until: clock closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), start + Duration::from_secs(5));
    }

    #[test]
    fn test_manual_clock_never_goes_backwards() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(10));
        clock.set(start);
        assert_eq!(clock.now(), start + Duration::from_secs(10));

        clock.set(start + Duration::from_secs(20));
        assert_eq!(clock.now(), start + Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_until_past_deadline_returns() {
        let clock = ManualClock::new();
        let deadline = clock.now();
        tokio::time::timeout(Duration::from_secs(1), clock.sleep_until(deadline))
            .await
            .expect("deadline already reached");
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_wakes_on_advance() {
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(2);

        let sleeper = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.sleep_until(deadline).await })
        };

        clock.advance(Duration::from_secs(1));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        clock.advance(Duration::from_secs(1));
        tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("sleeper should wake")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep_until(start + Duration::from_secs(30)).await;
        assert!(clock.now() >= start + Duration::from_secs(30));
    }
}
