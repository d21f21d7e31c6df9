//! Bounded retry and poll execution.
//!
//! Every network-dependent step in the protocols runs under a
//! [`RetryPolicy`]: a fixed number of attempts with a fixed delay, aware
//! of cooperative cancellation. Two delay placements cover the two loop
//! shapes the protocols need: backoff after a failed attempt, and a
//! propagation allowance before every attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// When the fixed delay is applied relative to each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMode {
    /// Wait after a failed attempt, before trying again.
    AfterFailure,
    /// Wait before every attempt, regardless of the previous outcome.
    /// Used when the awaited condition needs time to propagate through
    /// the network even when nothing has failed yet.
    BeforeAttempt,
}

/// Outcome of [`RetryPolicy::execute`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded on the `attempts`-th try.
    Success {
        /// The operation's value.
        value: T,
        /// Attempts consumed, including the successful one.
        attempts: u32,
    },
    /// Cancellation was observed; no attempt was consumed by it.
    Cancelled,
    /// Every attempt failed.
    Exhausted {
        /// The error from the final attempt.
        last_error: E,
        /// Attempts consumed.
        attempts: u32,
    },
}

/// Outcome of [`RetryPolicy::poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on the `attempts`-th probe.
    Satisfied {
        /// Probes consumed, including the satisfying one.
        attempts: u32,
    },
    /// Cancellation was observed mid-poll.
    Cancelled,
    /// The condition never held within the attempt bound.
    Exhausted {
        /// Probes consumed.
        attempts: u32,
    },
}

/// A bounded-attempt executor with a fixed inter-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    mode: DelayMode,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least one; a
    /// zero-attempt executor has no outcome to report.
    pub fn new(max_attempts: u32, delay: Duration, mode: DelayMode) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            mode,
        }
    }

    /// The attempt bound.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, the attempts are exhausted, or
    /// `cancel` fires.
    ///
    /// Cancellation is checked before every attempt and during every
    /// delay; it never consumes an attempt.
    pub async fn execute<C, F, Fut, T, E>(
        &self,
        clock: &C,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        C: Clock,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled;
            }
            if self.mode == DelayMode::BeforeAttempt
                && sleep_cancellable(clock, cancel, self.delay).await
            {
                return RetryOutcome::Cancelled;
            }
            match operation().await {
                Ok(value) => {
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    }
                }
                Err(error) => {
                    last_error = Some(error);
                    if self.mode == DelayMode::AfterFailure
                        && attempt < self.max_attempts
                        && sleep_cancellable(clock, cancel, self.delay).await
                    {
                        return RetryOutcome::Cancelled;
                    }
                }
            }
        }
        match last_error {
            Some(last_error) => RetryOutcome::Exhausted {
                last_error,
                attempts: self.max_attempts,
            },
            None => unreachable!("max_attempts is clamped to at least one"),
        }
    }

    /// Probe `condition` until it holds, the attempts are exhausted, or
    /// `cancel` fires.
    ///
    /// A probe that reports `false` is not an error, it is "not yet";
    /// callers map transport failures to `false` when the distinction
    /// does not matter for the awaited condition.
    pub async fn poll_until<C, F, Fut>(
        &self,
        clock: &C,
        cancel: &CancellationToken,
        mut condition: F,
    ) -> PollOutcome
    where
        C: Clock,
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            if self.mode == DelayMode::BeforeAttempt
                && sleep_cancellable(clock, cancel, self.delay).await
            {
                return PollOutcome::Cancelled;
            }
            if condition().await {
                return PollOutcome::Satisfied { attempts: attempt };
            }
            if self.mode == DelayMode::AfterFailure
                && attempt < self.max_attempts
                && sleep_cancellable(clock, cancel, self.delay).await
            {
                return PollOutcome::Cancelled;
            }
        }
        PollOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}

/// Sleep for `delay`, returning `true` if cancellation fired first.
///
/// The select is biased so that an already-cancelled token wins even when
/// a virtual clock completes the sleep instantly; unbiased selection
/// would make cancellation timing nondeterministic under [`ManualClock`].
///
/// [`ManualClock`]: crate::clock::ManualClock
pub async fn sleep_cancellable<C: Clock>(
    clock: &C,
    cancel: &CancellationToken,
    delay: Duration,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = clock.sleep(delay) => false,
    }
}
