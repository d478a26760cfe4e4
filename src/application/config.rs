//! Engine configuration from the environment.
//!
//! Every knob has a safe default; `SHOPWEAVER_*` variables override them.
//! `.env` files are honored when the binary loads dotenv at startup.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::application::dto::MAX_RETRY_ATTEMPTS;
use crate::resilience::{CircuitBreakerConfig, ResilienceConfig};

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite database path; `None` selects the in-memory repositories.
    pub database_path: Option<PathBuf>,
    pub resilience: ResilienceConfig,
    pub breaker: CircuitBreakerConfig,
    pub event_history_size: usize,
    pub slow_transaction: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            resilience: ResilienceConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            event_history_size: 1_000,
            slow_transaction: Duration::from_millis(1_000),
        }
    }
}

impl EngineConfig {
    /// Reads configuration from `SHOPWEAVER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.database_path = std::env::var("SHOPWEAVER_DB").ok().map(PathBuf::from);
        if let Some(attempts) = read_env::<u32>("SHOPWEAVER_MAX_RETRY_ATTEMPTS") {
            config.resilience.max_retry_attempts = attempts.min(MAX_RETRY_ATTEMPTS);
        }
        if let Some(base) = read_env::<u64>("SHOPWEAVER_RETRY_BASE_DELAY_MS") {
            config.resilience.retry_base_delay_ms = base;
        }
        if let Some(max) = read_env::<u64>("SHOPWEAVER_RETRY_MAX_DELAY_MS") {
            config.resilience.retry_max_delay_ms = max;
        }
        if let Some(grace) = read_env::<u64>("SHOPWEAVER_GRACE_PERIOD_MS") {
            config.resilience.grace_period = Duration::from_millis(grace);
        }
        if let Some(threshold) = read_env::<u32>("SHOPWEAVER_FAILURE_THRESHOLD") {
            config.breaker.failure_threshold = threshold.max(1);
        }
        if let Some(reset) = read_env::<u64>("SHOPWEAVER_RESET_AFTER_SECS") {
            config.breaker.reset_after = Duration::from_secs(reset);
        }
        if let Some(history) = read_env::<usize>("SHOPWEAVER_EVENT_HISTORY") {
            config.event_history_size = history;
        }
        if let Some(slow) = read_env::<u64>("SHOPWEAVER_SLOW_TX_MS") {
            config.slow_transaction = Duration::from_millis(slow);
        }
        config
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
