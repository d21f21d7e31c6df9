//! Clock seam for real and virtual time.
//!
//! Every delay and duration measurement in the protocols goes through the
//! [`Clock`] trait, so tests can substitute [`ManualClock`] and drive a
//! long run in microseconds instead of sleeping wall-clock time.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

/// Provider trait for time operations.
///
/// `now()` is monotonic time since the clock was created, which is all the
/// protocols need: they only ever compare instants and compute elapsed
/// durations, never absolute wall-clock time.
#[async_trait(?Send)]
pub trait Clock: Clone {
    /// Monotonic time since clock creation.
    fn now(&self) -> Duration;

    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);
}

/// Real time provider backed by tokio timers.
#[derive(Debug, Clone)]
pub struct TokioClock {
    start: std::time::Instant,
}

impl TokioClock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time instantly.
///
/// All clones share the same time cell, so a protocol holding one clone
/// and a test holding another observe the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Create a virtual clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `duration` without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

#[async_trait(?Send)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_instantly() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.now(), Duration::from_secs(3600));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let observer = clock.clone();

        clock.advance(Duration::from_millis(250));
        assert_eq!(observer.now(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_tokio_clock_sleeps_and_advances() {
        let clock = TokioClock::new();
        clock.sleep(Duration::from_millis(1)).await;
        assert!(clock.now() >= Duration::from_millis(1));
    }
}
