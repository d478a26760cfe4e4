//! Resilience controller: the survival wrapper around every solver run.
//!
//! Composes, in order: a memory guard (refuse oversized models up front),
//! circuit-breaker admission per operation key, a hard timeout with a
//! cooperative stop and a grace period before abandonment, retries with
//! exponential backoff for transient classifications (crash, memory), and
//! fallback dispatch sequencing. Whatever path wins, the result is
//! decorated with a quality score and the journey taken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::domain::errors::SchedulingError;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::retry::{BackoffStrategy, RetryPolicy, RetryStatistics, RetryStats};
use crate::solver::engine::{EngineSolution, IncumbentReport};
use crate::solver::fallback::{
    run_fallback, FallbackStrategy, QUALITY_FEASIBLE, QUALITY_OPTIMAL, QUALITY_PARTIAL,
};
use crate::solver::model::{CpModel, ObjectiveValue};
use crate::solver::solution::{extract_solution, SolutionStatus, SolverSolution};
use crate::solver::{SolverDriver, SolverParameters};

/// Knobs for the resilience layer.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Retries for transient solver failures (crash, memory pressure).
    pub max_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: bool,
    /// Extra wall time granted after the cooperative stop request before
    /// the solver task is abandoned.
    pub grace_period: Duration,
    pub enable_fallbacks: bool,
    pub enable_partial_solutions: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 10_000,
            retry_jitter: true,
            grace_period: Duration::from_secs(2),
            enable_fallbacks: true,
            enable_partial_solutions: true,
        }
    }
}

/// A solve result decorated with how it was obtained.
#[derive(Debug)]
pub struct ResilientOutcome {
    pub solution: SolverSolution,
    pub quality_score: f64,
    pub fallback_used: bool,
    pub fallback_strategy: Option<FallbackStrategy>,
    pub circuit_breaker_triggered: bool,
    pub retry_attempts: u32,
    pub warnings: Vec<String>,
}

/// Wraps solver invocations with timeout, retry, breaker and fallbacks.
pub struct ResilienceController {
    config: ResilienceConfig,
    registry: Arc<CircuitBreakerRegistry>,
    retry_stats: Arc<RetryStats>,
}

impl ResilienceController {
    pub fn new(config: ResilienceConfig, registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            config,
            registry,
            retry_stats: Arc::new(RetryStats::default()),
        }
    }

    pub fn registry(&self) -> &CircuitBreakerRegistry {
        &self.registry
    }

    pub fn retry_statistics(&self) -> RetryStatistics {
        self.retry_stats.snapshot()
    }

    /// Runs one solve under full protection.
    ///
    /// `key` selects the circuit breaker (e.g. `"solve"` or a per-tenant
    /// key). On terminal CP failure the fallback ladder runs; the error is
    /// returned only when every path is exhausted.
    pub async fn execute(
        &self,
        key: &str,
        model: Arc<CpModel>,
        params: SolverParameters,
        progress: Option<Sender<IncumbentReport>>,
    ) -> Result<ResilientOutcome, SchedulingError> {
        let mut warnings: Vec<String> = Vec::new();
        self.retry_stats.operations.fetch_add(1, Ordering::Relaxed);

        // Memory guard: refuse to start an oversized search.
        let estimated_bytes = model.estimated_memory_bytes();
        let estimated_mb = estimated_bytes.div_ceil(1024 * 1024);
        if estimated_bytes > params.memory_limit_mb.saturating_mul(1024 * 1024) {
            warnings.push(format!(
                "memory guard refused solve: estimated {estimated_mb} MB over limit {} MB",
                params.memory_limit_mb
            ));
            let error = SchedulingError::MemoryExhaustion {
                estimated_mb,
                limit_mb: params.memory_limit_mb,
            };
            return self.try_fallbacks(&model, error, warnings, false, 0).await;
        }

        // Circuit breaker admission.
        let breaker = self.registry.breaker(key);
        if let Err(retry_after) = breaker.try_acquire() {
            warnings.push(format!("circuit breaker open for '{key}', failing fast"));
            let error = SchedulingError::ServiceUnavailable {
                key: key.to_string(),
                retry_after_seconds: retry_after.as_secs().max(1),
            };
            return self.try_fallbacks(&model, error, warnings, true, 0).await;
        }

        let policy = RetryPolicy {
            max_retries: self.config.max_retry_attempts,
            backoff: BackoffStrategy::Exponential {
                base_ms: self.config.retry_base_delay_ms,
                max_delay_ms: self.config.retry_max_delay_ms,
            },
            jitter: self.config.retry_jitter,
        };
        let mut attempts: u32 = 0;
        let last_solution = loop {
            let solution = self
                .solve_once(model.clone(), &params, progress.clone(), &mut warnings)
                .await;
            match solution.status {
                SolutionStatus::Optimal => {
                    breaker.record_success();
                    if attempts > 0 {
                        self.retry_stats.recovered.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(self.cp_outcome(solution, QUALITY_OPTIMAL, attempts, warnings));
                }
                SolutionStatus::Feasible => {
                    breaker.record_success();
                    if attempts > 0 {
                        self.retry_stats.recovered.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(self.cp_outcome(solution, QUALITY_FEASIBLE, attempts, warnings));
                }
                SolutionStatus::Infeasible => {
                    // The engine worked correctly; infeasibility is a fact
                    // about the instance, not a service failure.
                    breaker.record_success();
                    break solution;
                }
                SolutionStatus::Timeout => {
                    breaker.record_failure();
                    if self.config.enable_partial_solutions && !solution.assignments.is_empty() {
                        warnings.push(
                            "solver timed out; best incumbent salvaged as partial solution"
                                .to_string(),
                        );
                        return Ok(self.cp_outcome(solution, QUALITY_PARTIAL, attempts, warnings));
                    }
                    break solution;
                }
                SolutionStatus::Memory | SolutionStatus::Crash => {
                    breaker.record_failure();
                    if attempts >= policy.max_retries {
                        self.retry_stats.exhausted.fetch_add(1, Ordering::Relaxed);
                        warnings.push(format!(
                            "transient solver failure ({}) persisted through {attempts} retries",
                            solution.status.as_str()
                        ));
                        break solution;
                    }
                    let delay = policy.delay(attempts);
                    attempts += 1;
                    self.retry_stats.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt = attempts,
                        status = solution.status.as_str(),
                        delay_ms = delay.as_millis() as u64,
                        "transient solver failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let error = match last_solution.status {
            SolutionStatus::Infeasible => SchedulingError::NoFeasibleSolution {
                message: "constraint model proved infeasible".into(),
            },
            SolutionStatus::Timeout => SchedulingError::SolverTimeout {
                elapsed_seconds: last_solution.solve_time.as_secs_f64(),
            },
            SolutionStatus::Memory => SchedulingError::MemoryExhaustion {
                estimated_mb,
                limit_mb: params.memory_limit_mb,
            },
            SolutionStatus::Crash => SchedulingError::RetryExhausted {
                attempts: attempts + 1,
                message: "solver crashed repeatedly".into(),
            },
            _ => SchedulingError::SolverError {
                message: "unexpected solver state".into(),
            },
        };
        self.try_fallbacks(&model, error, warnings, false, attempts)
            .await
    }

    fn cp_outcome(
        &self,
        solution: SolverSolution,
        quality: f64,
        attempts: u32,
        warnings: Vec<String>,
    ) -> ResilientOutcome {
        ResilientOutcome {
            solution,
            quality_score: quality,
            fallback_used: false,
            fallback_strategy: None,
            circuit_breaker_triggered: false,
            retry_attempts: attempts,
            warnings,
        }
    }

    /// One guarded solver run: cooperative timeout, grace, hard abandon.
    async fn solve_once(
        &self,
        model: Arc<CpModel>,
        params: &SolverParameters,
        caller_progress: Option<Sender<IncumbentReport>>,
        warnings: &mut Vec<String>,
    ) -> SolverSolution {
        let cancel = Arc::new(AtomicBool::new(false));
        let latest_incumbent: Arc<Mutex<Option<IncumbentReport>>> = Arc::new(Mutex::new(None));

        // Tee the incumbent stream: remember the latest for partial
        // salvage, forward to the caller.
        let (tx, rx) = std::sync::mpsc::channel::<IncumbentReport>();
        {
            let latest = latest_incumbent.clone();
            std::thread::spawn(move || {
                while let Ok(report) = rx.recv() {
                    if let Ok(mut slot) = latest.lock() {
                        *slot = Some(report.clone());
                    }
                    if let Some(forward) = &caller_progress {
                        let _ = forward.send(report);
                    }
                }
            });
        }

        let started = Instant::now();
        let driver_model = model.clone();
        let driver_params = params.clone();
        let driver_cancel = cancel.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            SolverDriver::solve(&driver_model, &driver_params, Some(tx), driver_cancel)
        });

        let budget = params.max_time + self.config.grace_period;
        match timeout(budget, &mut handle).await {
            Ok(joined) => joined.unwrap_or_else(|join_error| {
                warn!(error = %join_error, "solver task failed to join");
                SolverSolution::empty(SolutionStatus::Crash, started.elapsed(), 0)
            }),
            Err(_) => {
                info!("solver over budget, requesting cooperative stop");
                cancel.store(true, Ordering::SeqCst);
                match timeout(self.config.grace_period, &mut handle).await {
                    Ok(joined) => joined.unwrap_or_else(|join_error| {
                        warn!(error = %join_error, "solver task failed to join after stop");
                        SolverSolution::empty(SolutionStatus::Crash, started.elapsed(), 0)
                    }),
                    Err(_) => {
                        warn!("solver ignored stop request, abandoning task");
                        warnings.push(
                            "solver did not surrender within the grace period and was abandoned"
                                .to_string(),
                        );
                        let salvaged = latest_incumbent
                            .lock()
                            .ok()
                            .and_then(|slot| slot.clone());
                        match salvaged {
                            Some(report) if self.config.enable_partial_solutions => {
                                let engine_solution = EngineSolution {
                                    placements: report.placements,
                                    objective: ObjectiveValue {
                                        primary: report.primary,
                                        secondary: report.secondary,
                                    },
                                };
                                extract_solution(
                                    &model,
                                    &engine_solution,
                                    SolutionStatus::Timeout,
                                    started.elapsed(),
                                    0,
                                )
                            }
                            _ => SolverSolution::empty(
                                SolutionStatus::Timeout,
                                started.elapsed(),
                                0,
                            ),
                        }
                    }
                }
            }
        }
    }

    /// Runs the fallback ladder; keeps the first success.
    async fn try_fallbacks(
        &self,
        model: &Arc<CpModel>,
        cp_error: SchedulingError,
        mut warnings: Vec<String>,
        circuit_breaker_triggered: bool,
        retry_attempts: u32,
    ) -> Result<ResilientOutcome, SchedulingError> {
        if !self.config.enable_fallbacks {
            return Err(cp_error);
        }

        let fallback_model = model.clone();
        let result = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let mut attempted = Vec::new();
            for strategy in FallbackStrategy::escalation_order() {
                attempted.push(strategy.as_str().to_string());
                if let Some(engine_solution) = run_fallback(&fallback_model, strategy) {
                    let solution = extract_solution(
                        &fallback_model,
                        &engine_solution,
                        SolutionStatus::Feasible,
                        started.elapsed(),
                        0,
                    );
                    return (attempted, Some((strategy, solution)));
                }
            }
            (attempted, None)
        })
        .await
        .map_err(|join_error| SchedulingError::Unexpected {
            message: format!("fallback task failed: {join_error}"),
        })?;

        let (attempted, best) = result;
        match best {
            Some((strategy, solution)) => {
                warnings.push(format!(
                    "fallback strategies attempted: {}",
                    attempted.join(", ")
                ));
                info!(
                    strategy = strategy.as_str(),
                    quality = strategy.quality_score(),
                    "fallback produced a schedule"
                );
                Ok(ResilientOutcome {
                    solution,
                    quality_score: strategy.quality_score(),
                    fallback_used: true,
                    fallback_strategy: Some(strategy),
                    circuit_breaker_triggered,
                    retry_attempts,
                    warnings,
                })
            }
            None => {
                warn!(
                    attempted = attempted.join(", "),
                    "every fallback strategy failed"
                );
                Err(cp_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{JobId, MachineId, OperationId, OperatorId, TaskId, ZoneId};
    use crate::resilience::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::solver::model::{
        JobVar, MachineCandidate, MachineSlot, ObjectiveSpec, OperatorSlot, SkillSlot, TaskVar,
        ZoneSlot,
    };

    fn t0() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn solvable_model() -> CpModel {
        CpModel {
            name: "resilience-test".into(),
            t0: t0(),
            horizon: 24 * 60,
            tasks: vec![TaskVar {
                task_id: TaskId::new(),
                job: 0,
                sequence: 10,
                operation_id: OperationId::new(),
                setup_minutes: 10,
                processing_minutes: 60,
                release: 0,
                machine_candidates: vec![MachineCandidate {
                    machine: 0,
                    requires_operator: true,
                }],
                skill_slots: Vec::new(),
                eligible_operators: vec![0],
            }],
            jobs: vec![JobVar {
                job_id: JobId::new(),
                job_number: "JOB0".into(),
                priority_weight: 2,
                due: 48 * 60,
                tasks: vec![0],
            }],
            machines: vec![MachineSlot {
                machine_id: MachineId::new(),
                machine_code: "M0".into(),
                zone: 0,
                cost_cents_per_minute: 10,
            }],
            operators: vec![OperatorSlot {
                operator_id: OperatorId::new(),
                employee_id: "O0".into(),
                cost_cents_per_minute: 50,
                effectiveness_permille: 1000,
            }],
            zones: vec![ZoneSlot {
                zone_id: ZoneId::new(),
                zone_code: "Z".into(),
                wip_limit: u32::MAX,
            }],
            precedences: Vec::new(),
            calendar_windows: vec![(0, 24 * 60)],
            objective: ObjectiveSpec::default(),
        }
    }

    fn infeasible_model() -> CpModel {
        let mut model = solvable_model();
        model.tasks[0].skill_slots = vec![SkillSlot {
            skill_type: "welding".into(),
            covering_operators: Vec::new(),
            preferred_operators: Vec::new(),
        }];
        model.tasks[0].eligible_operators.clear();
        model
    }

    fn controller() -> ResilienceController {
        ResilienceController::new(
            ResilienceConfig {
                retry_base_delay_ms: 1,
                retry_max_delay_ms: 5,
                retry_jitter: false,
                grace_period: Duration::from_millis(200),
                ..Default::default()
            },
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
                failure_threshold: 2,
                reset_after: Duration::from_secs(60),
            })),
        )
    }

    #[tokio::test]
    async fn test_successful_solve_full_quality() {
        let controller = controller();
        let outcome = controller
            .execute(
                "solve",
                Arc::new(solvable_model()),
                SolverParameters::default(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.solution.status, SolutionStatus::Optimal);
        assert!((outcome.quality_score - QUALITY_OPTIMAL).abs() < f64::EPSILON);
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.retry_attempts, 0);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_infeasible_model_fails_through_fallbacks() {
        let controller = controller();
        let err = controller
            .execute(
                "solve",
                Arc::new(infeasible_model()),
                SolverParameters::default(),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_FEASIBLE_SOLUTION");
    }

    #[tokio::test]
    async fn test_memory_guard_falls_back() {
        let controller = controller();
        let outcome = controller
            .execute(
                "solve",
                Arc::new(solvable_model()),
                SolverParameters {
                    memory_limit_mb: 0,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(outcome.fallback_used);
        assert_eq!(
            outcome.fallback_strategy,
            Some(FallbackStrategy::GreedyPriority)
        );
        assert!((outcome.quality_score - 0.5).abs() < f64::EPSILON);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("memory guard")));
    }

    #[tokio::test]
    async fn test_open_breaker_fails_fast_without_fallbacks() {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_after: Duration::from_secs(60),
        }));
        registry.breaker("solve").record_failure();
        assert_eq!(registry.breaker("solve").state(), CircuitState::Open);

        let controller = ResilienceController::new(
            ResilienceConfig {
                enable_fallbacks: false,
                ..Default::default()
            },
            registry,
        );
        let err = controller
            .execute(
                "solve",
                Arc::new(solvable_model()),
                SolverParameters::default(),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_open_breaker_with_fallbacks_degrades() {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_after: Duration::from_secs(60),
        }));
        registry.breaker("solve").record_failure();

        let controller =
            ResilienceController::new(ResilienceConfig::default(), registry);
        let outcome = controller
            .execute(
                "solve",
                Arc::new(solvable_model()),
                SolverParameters::default(),
                None,
            )
            .await
            .unwrap();
        assert!(outcome.fallback_used);
        assert!(outcome.circuit_breaker_triggered);
    }

    #[tokio::test]
    async fn test_timeout_without_incumbent_uses_greedy_fallback() {
        // A deliberately hopeless time budget on a solvable model: the
        // engine stops before the first incumbent and the greedy
        // dispatcher takes over.
        let mut model = solvable_model();
        // Widen the instance so the first incumbent is not found at node 1.
        for i in 1..12 {
            let template = model.tasks[0].clone();
            model.tasks.push(TaskVar {
                task_id: TaskId::new(),
                sequence: (10 * (i + 1)) as u16,
                ..template
            });
            model.jobs[0].tasks.push(i);
        }
        let controller = controller();
        let outcome = controller
            .execute(
                "solve",
                Arc::new(model),
                SolverParameters {
                    max_time: Duration::from_millis(0),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        // Either the engine got lucky before the deadline (feasible) or
        // the fallback ladder produced the schedule.
        assert!(outcome.solution.status.is_success());
        if outcome.fallback_used {
            assert!((outcome.quality_score - 0.5).abs() < f64::EPSILON);
            assert!(outcome.warnings.iter().any(|w| w.contains("greedy")));
        }
    }

    #[tokio::test]
    async fn test_retry_statistics_exposed() {
        let controller = controller();
        let _ = controller
            .execute(
                "solve",
                Arc::new(solvable_model()),
                SolverParameters::default(),
                None,
            )
            .await;
        assert_eq!(controller.retry_statistics().operations, 1);
    }
}
