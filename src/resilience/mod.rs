//! The resilience layer: everything that keeps the engine answering under
//! stress. Retry policies with backoff and jitter, keyed circuit breakers
//! with a process-wide registry, and the controller that wraps every
//! solver invocation with timeouts, memory guarding, fallback sequencing
//! and quality assessment.

pub mod circuit_breaker;
pub mod controller;
pub mod retry;

pub use circuit_breaker::{
    global_registry, init_global_registry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerRegistry, CircuitState,
};
pub use controller::{ResilienceConfig, ResilienceController, ResilientOutcome};
pub use retry::{BackoffStrategy, RetryPolicy, RetryStatistics, RetryStats};
