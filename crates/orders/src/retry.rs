//! Bounded retry with deterministic backoff.
//!
//! Stock writes are optimistic: a conflicting write is expected under
//! contention and is resolved by re-reading and retrying, not by blocking.
//! Retry here is explicit — an operation is wrapped in [`run_with_retry`]
//! with a named [`RetryPolicy`]; nothing is intercepted behind the caller's
//! back.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OrderResult;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: `base * multiplier^(attempt - 1)`, capped.
    Exponential,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempt budget (including the first attempt).
    pub max_attempts: u32,
    /// Base delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Growth factor for the exponential strategy.
    pub multiplier: f64,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0); applied deterministically from the attempt
    /// number so retry timing stays reproducible in tests.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Fixed-step policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    /// Exponential policy with a delay cap.
    pub fn exponential(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.0,
        }
    }

    /// Coarse profile wrapped around a whole status transition.
    pub fn status_transition() -> Self {
        Self::fixed(3, Duration::from_millis(100))
    }

    /// Fine profile wrapped around each individual stock decrement.
    pub fn stock_decrement() -> Self {
        Self::exponential(
            5,
            Duration::from_millis(50),
            1.5,
            Duration::from_secs(1),
        )
    }

    /// Calculate the delay after a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let growth = self.multiplier.powi((attempt - 1) as i32);
                (base_ms * growth).min(max_ms)
            }
        };

        // Deterministic "jitter" derived from the attempt number.
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Check if more attempts are allowed after `attempt` attempts were made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Run `op`, retrying retryable failures under `policy`.
///
/// Only errors with [`crate::OrderError::is_retryable`] are retried; every
/// other error — and the error of the final attempt — is returned to the
/// caller. The operation is responsible for re-reading whatever state it
/// needs on each attempt.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> OrderResult<T>
where
    F: FnMut() -> OrderResult<T>,
{
    let mut attempt = 1u32;
    loop {
        match op() {
            Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after conflict"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrderError;
    use storefront_catalog::ProductId;
    use storefront_core::RecordId;

    fn conflict() -> OrderError {
        OrderError::StockConflict(ProductId::new(RecordId::new()))
    }

    fn immediate(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::ZERO)
    }

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let policy = RetryPolicy::exponential(
            5,
            Duration::from_millis(100),
            2.0,
            Duration::from_secs(10),
        );

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn exponential_backoff_respects_cap() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(50),
            1.5,
            Duration::from_millis(120),
        );

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(75));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(112));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(120));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(120));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = immediate(3);

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn succeeds_after_transient_conflicts() {
        let mut calls = 0;
        let result: OrderResult<u32> = run_with_retry(&immediate(5), || {
            calls += 1;
            if calls < 3 {
                Err(conflict())
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhaustion_returns_the_last_conflict() {
        let mut calls = 0;
        let result: OrderResult<()> = run_with_retry(&immediate(3), || {
            calls += 1;
            Err(conflict())
        });

        assert!(matches!(result, Err(OrderError::StockConflict(_))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_errors_return_immediately() {
        let product = ProductId::new(RecordId::new());
        let mut calls = 0;
        let result: OrderResult<()> = run_with_retry(&immediate(5), || {
            calls += 1;
            Err(OrderError::InsufficientStock(product))
        });

        assert!(matches!(result, Err(OrderError::InsufficientStock(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn first_success_short_circuits() {
        let mut calls = 0;
        let result: OrderResult<&str> = run_with_retry(&immediate(5), || {
            calls += 1;
            Ok("done")
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 1);
    }
}
