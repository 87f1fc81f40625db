//! Retry policy shared by the remote client and the batch orchestrator.
//!
//! A policy is a value: attempt ceiling, backoff schedule and a predicate
//! deciding which errors are worth another attempt. Both retry layers build
//! their own policy, so they can be configured and tested independently.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// Random delay in `[0, min(multiplier * 2^retry, max)]`.
    ExponentialJitter { multiplier: Duration, max: Duration },
}

impl Backoff {
    /// Upper bound of the delay before retry number `retry` (1-based).
    pub fn ceiling(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::ExponentialJitter { multiplier, max } => {
                let factor = 2u32.saturating_pow(retry.min(20));
                multiplier.saturating_mul(factor).min(max)
            }
        }
    }

    /// Actual delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::ExponentialJitter { .. } => {
                let cap_ms = self.ceiling(retry).as_millis() as u64;
                if cap_ms == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::rng().random_range(0..=cap_ms))
            }
        }
    }
}

/// Retry policy: `{max_attempts, backoff, retryable}`.
pub struct RetryPolicy<E> {
    name: String,
    max_attempts: u32,
    backoff: Backoff,
    retryable: fn(&E) -> bool,
}

impl<E> RetryPolicy<E> {
    /// Create a policy. `max_attempts` counts the first attempt and is at least 1.
    pub fn new(name: impl Into<String>, max_attempts: u32, backoff: Backoff, retryable: fn(&E) -> bool) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            backoff,
            retryable,
        }
    }

    /// Single attempt, never retries.
    pub fn none(name: impl Into<String>) -> Self {
        Self::new(name, 1, Backoff::Fixed(Duration::ZERO), |_| false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retryable)(error)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retryable: self.retryable,
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    Failed {
        error: E,
        attempts: u32,
        /// The error was retryable but the attempt ceiling was reached.
        exhausted: bool,
    },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Failed { error, .. } => Err(error),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempt ceiling is reached.
pub async fn retry_async<F, Fut, T, E>(policy: &RetryPolicy<E>, mut operation: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 1u32;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(policy = %policy.name, attempt, "Operation succeeded after retry");
                }
                return RetryOutcome::Success { value, attempts: attempt };
            }
            Err(e) if policy.is_retryable(&e) && attempt < policy.max_attempts => {
                let delay = policy.backoff.delay(attempt);
                warn!(
                    policy = %policy.name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                let exhausted = policy.is_retryable(&e);
                return RetryOutcome::Failed {
                    error: e,
                    attempts: attempt,
                    exhausted,
                };
            }
        }
    }
}
