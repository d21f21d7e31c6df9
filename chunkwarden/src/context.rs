//! Run context: seed, deadline, cancellation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// Everything a protocol run needs beyond its own options: the seed for
/// deterministic streams, the clock, and the bounds that end the run.
///
/// The deadline is resolved against the injected clock when
/// [`with_duration`](RunContext::with_duration) is called, so runs under a
/// virtual clock expire deterministically.
pub struct RunContext<C: Clock> {
    seed: u64,
    clock: C,
    deadline: Option<Duration>,
    iteration_limit: Option<u64>,
    cancel: CancellationToken,
}

impl<C: Clock> RunContext<C> {
    /// Create a context with no deadline, no iteration limit, and a fresh
    /// cancellation token.
    pub fn new(seed: u64, clock: C) -> Self {
        Self {
            seed,
            clock,
            deadline: None,
            iteration_limit: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound the run by wall-clock (or virtual) duration from now.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.deadline = Some(self.clock.now() + duration);
        self
    }

    /// Bound looping protocols to at most `limit` iterations.
    pub fn with_iteration_limit(mut self, limit: u64) -> Self {
        self.iteration_limit = Some(limit);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The seed for deterministic stream derivation.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The injected clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The cancellation token checked at iteration boundaries and inside
    /// every retry loop.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.deadline
            .map(|deadline| self.clock.now() >= deadline)
            .unwrap_or(false)
    }

    /// Whether the run should stop: cancelled or past its deadline.
    pub fn finished(&self) -> bool {
        self.is_cancelled() || self.expired()
    }

    /// Whether another iteration is allowed after `completed` iterations.
    pub fn allows_iteration(&self, completed: u64) -> bool {
        self.iteration_limit
            .map(|limit| completed < limit)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;

    use super::*;

    #[test]
    fn test_deadline_resolved_against_clock() {
        let clock = ManualClock::new();
        let ctx = RunContext::new(0, clock.clone()).with_duration(Duration::from_secs(10));

        assert!(!ctx.expired());
        clock.advance(Duration::from_secs(10));
        assert!(ctx.expired());
        assert!(ctx.finished());
    }

    #[test]
    fn test_no_deadline_never_expires() {
        let clock = ManualClock::new();
        let ctx = RunContext::new(0, clock.clone());

        clock.advance(Duration::from_secs(3600));
        assert!(!ctx.expired());
        assert!(!ctx.finished());
    }

    #[test]
    fn test_cancellation_finishes_run() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(0, clock).with_cancellation(cancel.clone());

        assert!(!ctx.finished());
        cancel.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.finished());
    }

    #[test]
    fn test_iteration_limit() {
        let clock = ManualClock::new();
        let ctx = RunContext::new(0, clock).with_iteration_limit(2);

        assert!(ctx.allows_iteration(0));
        assert!(ctx.allows_iteration(1));
        assert!(!ctx.allows_iteration(2));
    }
}
