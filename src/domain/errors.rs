//! Error taxonomy for the scheduling engine.
//!
//! Every failure that crosses a component boundary is a `SchedulingError`
//! carrying a machine-readable code. Repositories and the unit of work
//! raise typed errors; the optimization service translates them into
//! response error codes; callers pattern-match on the variant rather than
//! parsing messages.

use serde_json::json;
use thiserror::Error;

/// Engine-wide error type.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// Malformed or out-of-range input. Never retried.
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// An attempted operation violates a domain rule (illegal state
    /// transition, duplicate business key, due date in the past, ...).
    /// Never retried.
    #[error("business rule '{rule}' violated: {message}")]
    BusinessRuleViolation { rule: String, message: String },

    /// A referenced aggregate or entity does not exist.
    #[error("{entity} '{id}' not found")]
    EntityNotFound { entity: &'static str, id: String },

    /// Storage-level failure. `transient` marks errors worth retrying
    /// (disconnect, lock contention, busy database).
    #[error("database error: {message}")]
    Database { message: String, transient: bool },

    /// The solver hit its wall-clock ceiling without proving anything.
    #[error("solver timed out after {elapsed_seconds:.2}s")]
    SolverTimeout { elapsed_seconds: f64 },

    /// The model or search exceeded its memory budget.
    #[error("memory budget exceeded: estimated {estimated_mb} MB over limit {limit_mb} MB")]
    MemoryExhaustion { estimated_mb: u64, limit_mb: u64 },

    /// The solver engine panicked or died mid-search. Transient.
    #[error("solver crashed: {message}")]
    SolverCrash { message: String },

    /// CP proved infeasibility and every fallback also failed.
    #[error("no feasible solution: {message}")]
    NoFeasibleSolution { message: String },

    /// Circuit breaker is open for the keyed operation; fail fast.
    #[error("service unavailable for '{key}', retry after {retry_after_seconds}s")]
    ServiceUnavailable {
        key: String,
        retry_after_seconds: u64,
    },

    /// All retry attempts were consumed.
    #[error("retries exhausted after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// A resource roster problem (no machines, no operators, bad roster).
    #[error("resource error: {message}")]
    ResourceError { message: String },

    /// Any other failure inside the solver subsystem.
    #[error("solver error: {message}")]
    SolverError { message: String },

    /// Orchestration-level failure outside the solver itself.
    #[error("optimization error: {message}")]
    OptimizationError { message: String },

    /// Catch-all for failures that should not happen.
    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl SchedulingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn business_rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BusinessRuleViolation {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::EntityNotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn database(message: impl Into<String>, transient: bool) -> Self {
        Self::Database {
            message: message.into(),
            transient,
        }
    }

    /// Machine-readable discriminant surfaced to callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::BusinessRuleViolation { .. } => "BUSINESS_RULE_VIOLATION",
            Self::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::SolverTimeout { .. } => "SOLVER_TIMEOUT",
            Self::MemoryExhaustion { .. } => "MEMORY_EXHAUSTION",
            Self::SolverCrash { .. } => "SOLVER_CRASH",
            Self::NoFeasibleSolution { .. } => "NO_FEASIBLE_SOLUTION",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::RetryExhausted { .. } => "RETRY_EXHAUSTED",
            Self::ResourceError { .. } => "RESOURCE_ERROR",
            Self::SolverError { .. } => "SOLVER_ERROR",
            Self::OptimizationError { .. } => "OPTIMIZATION_ERROR",
            Self::Unexpected { .. } => "UNEXPECTED_ERROR",
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database { transient, .. } => *transient,
            Self::SolverCrash { .. } | Self::MemoryExhaustion { .. } => true,
            _ => false,
        }
    }

    /// Structured details for the user-visible error envelope.
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Validation { field, .. } => json!({ "field": field }),
            Self::BusinessRuleViolation { rule, .. } => json!({ "rule": rule }),
            Self::EntityNotFound { entity, id } => json!({ "entity": entity, "id": id }),
            Self::MemoryExhaustion {
                estimated_mb,
                limit_mb,
            } => json!({ "estimated_mb": estimated_mb, "limit_mb": limit_mb }),
            Self::ServiceUnavailable {
                key,
                retry_after_seconds,
            } => json!({ "key": key, "retry_after_seconds": retry_after_seconds }),
            Self::RetryExhausted { attempts, .. } => json!({ "attempts": attempts }),
            Self::SolverTimeout { elapsed_seconds } => {
                json!({ "elapsed_seconds": elapsed_seconds })
            }
            _ => json!({}),
        }
    }
}

impl From<rusqlite::Error> for SchedulingError {
    fn from(err: rusqlite::Error) -> Self {
        let transient = matches!(
            &err,
            rusqlite::Error::SqliteFailure(info, _)
                if matches!(
                    info.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        );
        Self::Database {
            message: err.to_string(),
            transient,
        }
    }
}

/// Convenience alias used throughout the domain and solver layers.
pub type DomainResult<T> = Result<T, SchedulingError>;
