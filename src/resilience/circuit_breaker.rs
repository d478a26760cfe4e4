//! Circuit breaker with a process-wide keyed registry.
//!
//! States: CLOSED (normal) -> OPEN after `failure_threshold` consecutive
//! failures (calls fail fast) -> HALF_OPEN after `reset_after` (one trial
//! admitted) -> CLOSED on trial success, back to OPEN on trial failure.
//!
//! State reads are lock-free; admission re-checks under the timestamp
//! lock before transitioning out of OPEN.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Thresholds shared by every breaker in a registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Wall time an open breaker waits before admitting a trial.
    pub reset_after: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_after: Duration::from_secs(30),
        }
    }
}

/// One keyed breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    half_open_trial: AtomicBool,
    last_failure: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            half_open_trial: AtomicBool::new(false),
            last_failure: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    /// Asks for admission.
    ///
    /// `Err(retry_after)` means fail fast: the breaker is open (or a
    /// half-open trial is already in flight).
    pub fn try_acquire(&self) -> Result<(), Duration> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                // Re-check under the lock before leaving OPEN.
                let guard = self.last_failure.lock().expect("breaker lock poisoned");
                let elapsed = guard.map(|at| at.elapsed()).unwrap_or(self.config.reset_after);
                if elapsed >= self.config.reset_after {
                    info!(key = %self.key, "circuit breaker half-open, admitting trial");
                    self.half_open_trial.store(true, Ordering::Release);
                    self.state
                        .store(CircuitState::HalfOpen as u8, Ordering::Release);
                    Ok(())
                } else {
                    debug!(key = %self.key, "circuit breaker open, failing fast");
                    Err(self.config.reset_after - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if self
                    .half_open_trial
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    Ok(())
                } else {
                    Err(self.config.reset_after)
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        match self.state() {
            CircuitState::HalfOpen => {
                info!(key = %self.key, "circuit breaker closing after trial success");
                self.reset();
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let consecutive = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        match self.state() {
            CircuitState::Closed => {
                if consecutive >= self.config.failure_threshold {
                    warn!(
                        key = %self.key,
                        consecutive,
                        threshold = self.config.failure_threshold,
                        "circuit breaker tripping"
                    );
                    self.trip();
                }
            }
            CircuitState::HalfOpen => {
                warn!(key = %self.key, "circuit breaker trial failed, reopening");
                self.trip();
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        self.half_open_trial.store(false, Ordering::Release);
        *self.last_failure.lock().expect("breaker lock poisoned") = Some(Instant::now());
    }

    fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.half_open_trial.store(false, Ordering::Release);
        *self.last_failure.lock().expect("breaker lock poisoned") = None;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            key: self.key.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
        }
    }
}

/// Serializable per-key health view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
}

/// Keyed collection of breakers sharing one configuration.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// The breaker for a key, created closed on first use.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut guard = self.breakers.lock().expect("registry lock poisoned");
        guard
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.config)))
            .clone()
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let guard = self.breakers.lock().expect("registry lock poisoned");
        let mut snapshots: Vec<_> = guard.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Number of breakers currently not CLOSED.
    pub fn open_count(&self) -> usize {
        self.snapshots()
            .iter()
            .filter(|s| s.state != CircuitState::Closed)
            .count()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<CircuitBreakerRegistry>> = OnceLock::new();

/// The process-wide registry, created with defaults on first access.
/// Call [`init_global_registry`] at startup to set thresholds.
pub fn global_registry() -> Arc<CircuitBreakerRegistry> {
    GLOBAL_REGISTRY
        .get_or_init(|| Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())))
        .clone()
}

/// Installs the process-wide registry configuration. Later calls are
/// no-ops once the registry exists.
pub fn init_global_registry(config: CircuitBreakerConfig) -> Arc<CircuitBreakerRegistry> {
    GLOBAL_REGISTRY
        .get_or_init(|| Arc::new(CircuitBreakerRegistry::new(config)))
        .clone()
}
