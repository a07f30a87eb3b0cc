//! Retry policy with optional exponential backoff for provider calls.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::ProviderError;
use crate::domain::models::PerformanceConfig;
use crate::domain::ports::Sleeper;

/// Retry policy for transient provider errors
///
/// The n-th retry waits `base_delay * 2^(n-1)` when exponential backoff is
/// enabled and `base_delay` otherwise. Fatal errors are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Double the delay on every subsequent retry
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            exponential: true,
        }
    }
}

/// Final outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// Last result
    pub result: Result<T, ProviderError>,
    /// Total calls made, first attempt included
    pub attempts: u32,
}

impl RetryPolicy {
    /// Policy with explicit limits.
    pub const fn new(max_retries: u32, base_delay: Duration, exponential: bool) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential,
        }
    }

    /// Build a policy from the performance section of the configuration.
    pub fn from_config(config: &PerformanceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs_f64(config.retry_delay.max(0.0)),
            exponential: config.exponential_backoff,
        }
    }

    /// Policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            exponential: false,
        }
    }

    /// Delay before retry number `retry` (counting from 1).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if !self.exponential || retry <= 1 {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay.saturating_mul(factor)
    }

    /// Total time spent waiting if every retry is used.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries)
            .map(|retry| self.delay_for(retry))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Run `operation` until it succeeds, fails fatally, or retries run out.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<S, F, Fut, T>(&self, sleeper: &S, mut operation: F) -> RetryOutcome<T>
    where
        S: Sleeper + ?Sized,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) if err.is_transient() && attempt <= self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transient provider error, retrying"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(attempts = attempt, error = %err, "retries exhausted");
                    } else {
                        debug!(error = %err, "fatal provider error, not retrying");
                    }
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}
