//! Retry policy with exponential backoff and optional full jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::errors::SchedulingError;

/// Delay progression between attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed { delay_ms: u64 },
    /// `base * 2^attempt`, capped.
    Exponential { base_ms: u64, max_delay_ms: u64 },
    /// `base + increment * attempt`.
    Linear { base_ms: u64, increment_ms: u64 },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Self::Exponential {
                base_ms,
                max_delay_ms,
            } => {
                let delay = base_ms.saturating_mul(1u64 << attempt.min(20));
                Duration::from_millis(delay.min(*max_delay_ms))
            }
            Self::Linear {
                base_ms,
                increment_ms,
            } => Duration::from_millis(base_ms + increment_ms * u64::from(attempt)),
        }
    }

    /// Full jitter: a uniform draw from `[0, delay]`.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt).as_millis() as u64;
        if delay == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=delay))
    }
}

/// Retry configuration for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                base_ms: 100,
                max_delay_ms: 10_000,
            },
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt`, jittered when configured.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.jitter {
            self.backoff.jittered_delay_for(attempt)
        } else {
            self.backoff.delay_for(attempt)
        }
    }

    /// Runs `operation`, retrying while `should_retry` approves the error
    /// and attempts remain. Non-retryable errors pass through untouched;
    /// exhaustion maps to `RetryExhausted`.
    pub async fn execute_with_predicate<F, Fut, T, P>(
        &self,
        stats: &RetryStats,
        mut operation: F,
        mut should_retry: P,
    ) -> Result<T, SchedulingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SchedulingError>>,
        P: FnMut(&SchedulingError) -> bool,
    {
        stats.operations.fetch_add(1, Ordering::Relaxed);
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        stats.recovered.fetch_add(1, Ordering::Relaxed);
                        info!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !should_retry(&err) {
                        debug!(error = %err, "non-retryable failure, passing through");
                        return Err(err);
                    }
                    if attempt >= self.max_retries {
                        stats.exhausted.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            max_retries = self.max_retries,
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(SchedulingError::RetryExhausted {
                            attempts: attempt + 1,
                            message: err.to_string(),
                        });
                    }
                    let delay = self.delay(attempt);
                    attempt += 1;
                    stats.retries.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Process-level retry counters for the health report.
#[derive(Debug, Default)]
pub struct RetryStats {
    pub operations: AtomicU64,
    pub retries: AtomicU64,
    pub recovered: AtomicU64,
    pub exhausted: AtomicU64,
}

/// Serializable snapshot of [`RetryStats`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryStatistics {
    pub operations: u64,
    pub retries: u64,
    pub recovered: u64,
    pub exhausted: u64,
}

impl RetryStats {
    pub fn snapshot(&self) -> RetryStatistics {
        RetryStatistics {
            operations: self.operations.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}
