//! Top-level optimization orchestration.
//!
//! One service tier, resilience always active: validate the request,
//! build aggregates and the roster snapshot, translate to a constraint
//! model, solve under the resilience controller, then persist the draft
//! schedule plus job state in a single transaction and publish the
//! committed events. Every failure is translated into the response error
//! envelope; `optimize` itself never errors.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[cfg(test)]
use mockall::automock;

use crate::application::dto::{
    AssignmentSummary, ErrorEnvelope, HealthResponse, JobSummary, OverallStatus, ResilienceInfo,
    ServiceHealth, SolveMetrics, SolveRequest, SolveResponse, SolveStatus,
};
use crate::application::services::health::ServiceStats;
use crate::domain::entities::{Job, Machine, Operator, ProductionZone, Schedule, ScheduleMetrics};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Duration;
use crate::infrastructure::events::EventPublisher;
use crate::resilience::{ResilienceController, ResilientOutcome};
use crate::solver::{
    validate_assignments, IncumbentReport, ModelBuilder, SchedulingProblem, SolutionStatus,
};

/// Everything the solve needs from the resource side.
#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
    pub machines: Vec<Machine>,
    pub operators: Vec<Operator>,
    pub zones: Vec<ProductionZone>,
    /// Plant-wide holidays persisted alongside the roster, merged into
    /// the request's calendar.
    pub holidays: Vec<chrono::NaiveDate>,
}

/// Persistence boundary of the optimization service: load the roster
/// before a solve, commit the outcome after one. Implementations decide
/// the storage engine; the SQLite gateway wraps everything in one unit of
/// work so the commit is atomic.
#[cfg_attr(test, automock)]
pub trait PersistenceGateway: Send + Sync {
    fn load_roster(&self) -> DomainResult<RosterSnapshot>;

    /// Atomically persists the solved jobs and the draft schedule and
    /// returns the events to publish. On error nothing is persisted and
    /// no event may be published.
    fn persist_solve_outcome(
        &self,
        jobs: &mut Vec<Job>,
        schedule: &mut Schedule,
    ) -> DomainResult<Vec<DomainEvent>>;
}

/// The unified optimization service.
pub struct OptimizationService {
    gateway: Arc<dyn PersistenceGateway>,
    controller: Arc<ResilienceController>,
    publisher: EventPublisher,
    stats: Arc<ServiceStats>,
}

impl OptimizationService {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        controller: Arc<ResilienceController>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            gateway,
            controller,
            publisher,
            stats: Arc::new(ServiceStats::default()),
        }
    }

    /// Runs one solve request end to end. Never returns an error: every
    /// failure becomes a response with an error envelope.
    pub async fn optimize(&self, request: SolveRequest) -> SolveResponse {
        self.optimize_with_progress(request, None).await
    }

    /// Like [`optimize`](Self::optimize), streaming improving incumbents
    /// to the given channel (used by the CLI progress bar).
    pub async fn optimize_with_progress(
        &self,
        request: SolveRequest,
        progress: Option<Sender<IncumbentReport>>,
    ) -> SolveResponse {
        let started = Instant::now();
        let problem_name = request.problem_name.clone();
        match self.solve_inner(request, progress).await {
            Ok(mut response) => {
                response.processing_time_seconds = started.elapsed().as_secs_f64();
                self.stats.record(response.success, started.elapsed());
                response
            }
            Err(err) => {
                error!(
                    problem = %problem_name,
                    code = err.error_code(),
                    error = %err,
                    "solve request failed"
                );
                self.stats.record(false, started.elapsed());
                failure_response(problem_name, &err, started.elapsed().as_secs_f64())
            }
        }
    }

    async fn solve_inner(
        &self,
        request: SolveRequest,
        progress: Option<Sender<IncumbentReport>>,
    ) -> Result<SolveResponse, SchedulingError> {
        request.validate()?;
        let t0 = request.schedule_start_time;

        let mut jobs = request.build_jobs()?;
        let roster = self.gateway.load_roster()?;
        if roster.machines.is_empty() {
            return Err(SchedulingError::ResourceError {
                message: "no machines registered in the roster".into(),
            });
        }

        let mut calendar = request.calendar()?;
        for holiday in &roster.holidays {
            calendar = calendar.with_holiday(*holiday);
        }
        let problem = SchedulingProblem {
            name: request.problem_name.clone(),
            t0,
            horizon_minutes: request.horizon_minutes(),
            jobs: jobs.clone(),
            machines: roster.machines,
            operators: roster.operators,
            zones: roster.zones,
            cross_job_precedences: Vec::new(),
            calendar,
            objective: request.objective(),
        };
        let model = Arc::new(ModelBuilder::new(&problem).build()?);
        info!(
            problem = %request.problem_name,
            tasks = model.tasks.len(),
            machines = model.machines.len(),
            operators = model.operators.len(),
            "starting resilient solve"
        );

        let outcome = self
            .controller
            .execute("solve", model.clone(), request.solver_parameters(), progress)
            .await?;

        // Re-check every invariant before anything is persisted. The
        // relaxed fallback legitimately drops calendar and WIP limits, so
        // its violations are recorded on the schedule instead of failing
        // the solve.
        let violations = validate_assignments(&model, &outcome.solution.placements);

        let mut schedule = Schedule::create(
            request.problem_name.clone(),
            t0,
            t0 + chrono::Duration::minutes(request.horizon_minutes()),
            jobs.iter().map(|j| j.id()).collect(),
            t0,
        )?;
        for assignment in &outcome.solution.assignments {
            schedule.upsert_assignment(
                crate::domain::entities::ScheduleAssignment::new(
                    assignment.task_id,
                    assignment.machine_id,
                    assignment.operator_ids.clone(),
                    assignment.start_time,
                    Duration::from_minutes_i64(assignment.setup_minutes)?,
                    Duration::from_minutes_i64(assignment.processing_minutes)?,
                )?,
            )?;
        }
        schedule.record_violations(violations.clone())?;
        schedule.set_metrics(ScheduleMetrics {
            makespan: Duration::from_minutes_i64(outcome.solution.metrics.makespan_minutes)?,
            total_tardiness: Duration::from_minutes_i64(
                outcome.solution.metrics.total_tardiness_minutes,
            )?,
            total_cost: outcome.solution.metrics.total_cost,
        })?;

        for job in &mut jobs {
            job.release(t0)?;
        }
        for assignment in &outcome.solution.assignments {
            let job = jobs
                .iter_mut()
                .find(|j| j.id() == assignment.job_id)
                .ok_or_else(|| SchedulingError::not_found("Job", assignment.job_id))?;
            job.apply_assignment(
                assignment.task_id,
                assignment.machine_id,
                &assignment.operator_ids,
                assignment.start_time,
                assignment.end_time,
                assignment.is_critical_path,
                t0,
            )?;
        }

        let events = self
            .gateway
            .persist_solve_outcome(&mut jobs, &mut schedule)?;
        self.publisher.publish_committed(events);

        Ok(success_response(
            &request,
            &jobs,
            schedule.id().to_string(),
            outcome,
            violations,
        ))
    }

    /// Assembles the health report.
    pub fn health(&self) -> HealthResponse {
        let breakers = self.controller.registry().snapshots();
        let open = self.controller.registry().open_count();
        let snapshot = self.stats.snapshot();
        let overall = if snapshot.total_requests > 0 && snapshot.success_rate < 0.5 {
            OverallStatus::Unhealthy
        } else if open > 0 || snapshot.success_rate < 0.9 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        };
        HealthResponse {
            service_health: ServiceHealth {
                total_requests: snapshot.total_requests,
                success_rate: snapshot.success_rate,
                average_solve_time_seconds: snapshot.average_time_seconds,
                open_circuit_breakers: open,
            },
            circuit_breakers: breakers,
            retry_statistics: self.controller.retry_statistics(),
            overall_status: overall,
        }
    }
}

fn status_of(outcome: &ResilientOutcome) -> SolveStatus {
    if outcome.fallback_used {
        SolveStatus::FallbackSuccess
    } else {
        match outcome.solution.status {
            SolutionStatus::Optimal => SolveStatus::Optimal,
            SolutionStatus::Feasible => SolveStatus::Feasible,
            SolutionStatus::Timeout => SolveStatus::Timeout,
            SolutionStatus::Infeasible => SolveStatus::Infeasible,
            _ => SolveStatus::Timeout,
        }
    }
}

fn build_message(outcome: &ResilientOutcome) -> String {
    let mut message = if outcome.fallback_used {
        match outcome.fallback_strategy {
            Some(strategy) => format!(
                "Optimization completed using fallback strategy: {}",
                strategy.as_str()
            ),
            None => "Optimization completed using fallback strategy".to_string(),
        }
    } else {
        format!(
            "Optimization completed with status {}",
            outcome.solution.status.as_str()
        )
    };
    if outcome.circuit_breaker_triggered {
        message.push_str(" (circuit breaker was triggered)");
    }
    if outcome.retry_attempts > 0 {
        message.push_str(&format!(" (after {} retries)", outcome.retry_attempts));
    }
    message
}

fn success_response(
    request: &SolveRequest,
    jobs: &[Job],
    schedule_id: String,
    outcome: ResilientOutcome,
    violations: Vec<String>,
) -> SolveResponse {
    let job_summaries: Vec<JobSummary> = jobs
        .iter()
        .map(|job| {
            let result = outcome
                .solution
                .job_outcomes
                .iter()
                .find(|o| o.job_id == job.id());
            JobSummary {
                job_number: job.job_number().to_string(),
                priority: job.priority().to_string(),
                due_date: job.due_date(),
                completion_time: result.map(|o| o.completion_time),
                tardiness_minutes: result.map_or(0, |o| o.tardiness_minutes),
                on_time: result.map_or(true, |o| o.on_time),
                task_count: job.task_count(),
            }
        })
        .collect();

    let assignment_summaries: Vec<AssignmentSummary> = outcome
        .solution
        .assignments
        .iter()
        .map(|a| {
            let job_number = jobs
                .iter()
                .find(|j| j.id() == a.job_id)
                .map(|j| j.job_number().to_string())
                .unwrap_or_default();
            AssignmentSummary {
                job_number,
                sequence_in_job: a.sequence_in_job,
                machine_code: a.machine_code.clone(),
                operator_count: a.operator_ids.len(),
                start_time: a.start_time,
                end_time: a.end_time,
                is_critical_path: a.is_critical_path,
            }
        })
        .collect();

    let gap_percent = if outcome.quality_score < 1.0 {
        ((1.0 - outcome.quality_score) * 100.0).max(0.0)
    } else {
        0.0
    };
    let metrics = SolveMetrics {
        makespan_minutes: outcome.solution.metrics.makespan_minutes,
        total_tardiness_minutes: outcome.solution.metrics.total_tardiness_minutes,
        total_operator_cost: decimal_to_f64(outcome.solution.metrics.total_operator_cost),
        machine_utilization_percent: outcome.solution.metrics.machine_utilization_percent,
        operator_utilization_percent: outcome.solution.metrics.operator_utilization_percent,
        jobs_on_time: outcome.solution.metrics.jobs_on_time,
        jobs_late: outcome.solution.metrics.jobs_late,
        critical_path_jobs: outcome.solution.metrics.critical_path_jobs.clone(),
        solve_time_seconds: outcome.solution.solve_time.as_secs_f64(),
        solver_status: outcome.solution.status.as_str().to_string(),
        gap_percent,
    };

    let mut warnings = outcome.warnings.clone();
    warnings.extend(violations);

    SolveResponse {
        problem_name: request.problem_name.clone(),
        status: Some(status_of(&outcome)),
        success: true,
        message: build_message(&outcome),
        jobs: job_summaries,
        assignments: assignment_summaries,
        metrics: Some(metrics),
        processing_time_seconds: 0.0,
        resilience_info: ResilienceInfo {
            fallback_used: outcome.fallback_used,
            fallback_strategy: outcome.fallback_strategy.map(|s| s.as_str().to_string()),
            circuit_breaker_triggered: outcome.circuit_breaker_triggered,
            retry_attempts: outcome.retry_attempts,
            quality_score: outcome.quality_score,
            warnings,
        },
        schedule_id: Some(schedule_id),
        error: None,
    }
}

fn failure_response(problem_name: String, err: &SchedulingError, elapsed: f64) -> SolveResponse {
    let status = match err {
        SchedulingError::NoFeasibleSolution { .. } => Some(SolveStatus::Infeasible),
        SchedulingError::SolverTimeout { .. } => Some(SolveStatus::Timeout),
        _ => None,
    };
    SolveResponse {
        problem_name,
        status,
        success: false,
        message: err.to_string(),
        jobs: Vec::new(),
        assignments: Vec::new(),
        metrics: None,
        processing_time_seconds: elapsed,
        resilience_info: ResilienceInfo {
            // NO_FEASIBLE_SOLUTION is only reached after every fallback
            // was attempted and failed.
            fallback_used: matches!(err, SchedulingError::NoFeasibleSolution { .. }),
            fallback_strategy: None,
            circuit_breaker_triggered: matches!(err, SchedulingError::ServiceUnavailable { .. }),
            retry_attempts: match err {
                SchedulingError::RetryExhausted { attempts, .. } => *attempts,
                _ => 0,
            },
            quality_score: 0.0,
            warnings: Vec::new(),
        },
        schedule_id: None,
        error: Some(ErrorEnvelope {
            error_code: err.error_code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }),
    }
}

fn decimal_to_f64(value: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::{
        BusinessConstraints, JobRequest, OptimizationParameters,
    };
    use crate::domain::entities::{AutomationLevel, Machine, Operator};
    use crate::domain::value_objects::{Skill, SkillRequirement, ZoneId};
    use crate::infrastructure::events::EventBus;
    use crate::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, ResilienceConfig};
    use chrono::NaiveDateTime;

    fn t0() -> NaiveDateTime {
        // Monday 08:00.
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    /// Gateway over plain vectors: enough persistence for service tests.
    #[derive(Default)]
    struct RecordingGateway {
        roster: RosterSnapshot,
    }

    impl PersistenceGateway for RecordingGateway {
        fn load_roster(&self) -> DomainResult<RosterSnapshot> {
            Ok(self.roster.clone())
        }

        fn persist_solve_outcome(
            &self,
            jobs: &mut Vec<Job>,
            schedule: &mut Schedule,
        ) -> DomainResult<Vec<DomainEvent>> {
            let mut events = Vec::new();
            for job in jobs {
                events.extend(job.take_events());
            }
            events.extend(schedule.take_events());
            Ok(events)
        }
    }

    fn roster(machines: usize, operators: usize) -> RosterSnapshot {
        let zone = ZoneId::new();
        RosterSnapshot {
            machines: (0..machines)
                .map(|i| Machine::new(format!("M{i}"), "machine", AutomationLevel::Manual, zone))
                .collect(),
            operators: (0..operators)
                .map(|i| {
                    Operator::new(format!("EMP-{i}"), "operator", zone)
                        .with_skill(Skill::advanced("machining", 5).unwrap())
                })
                .collect(),
            zones: Vec::new(),
            holidays: Vec::new(),
        }
    }

    fn service(roster_snapshot: RosterSnapshot) -> (OptimizationService, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(100));
        let controller = Arc::new(ResilienceController::new(
            ResilienceConfig {
                retry_base_delay_ms: 1,
                retry_max_delay_ms: 2,
                ..Default::default()
            },
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        ));
        let gateway = Arc::new(RecordingGateway {
            roster: roster_snapshot,
        });
        let service = OptimizationService::new(
            gateway,
            controller,
            EventPublisher::new(bus.clone()),
        );
        (service, bus)
    }

    fn single_job_request() -> SolveRequest {
        SolveRequest {
            problem_name: "seed-1".into(),
            schedule_start_time: t0(),
            jobs: vec![JobRequest {
                job_number: "JOB001".into(),
                priority: Some("NORMAL".into()),
                due_date: t0() + chrono::Duration::hours(48),
                quantity: 1,
                customer_name: None,
                part_number: None,
                task_sequences: vec![10],
                task_duration_minutes: 60,
                task_setup_minutes: 10,
            }],
            business_constraints: None,
            optimization_parameters: None,
        }
    }

    #[tokio::test]
    async fn test_seed_single_job_optimal_70_minutes() {
        let (service, bus) = service(roster(1, 1));
        let response = service.optimize(single_job_request()).await;

        assert!(response.success, "message: {}", response.message);
        assert_eq!(response.status, Some(SolveStatus::Optimal));
        let metrics = response.metrics.as_ref().unwrap();
        assert_eq!(metrics.makespan_minutes, 70);
        assert_eq!(metrics.total_tardiness_minutes, 0);
        assert_eq!(metrics.jobs_on_time, 1);
        assert_eq!(response.assignments.len(), 1);
        assert_eq!(response.assignments[0].start_time, t0());
        assert!((response.resilience_info.quality_score - 1.0).abs() < f64::EPSILON);
        assert!(!response.resilience_info.fallback_used);
        // Events published after commit: job created/released/task events,
        // schedule created, task scheduled.
        assert!(!bus.history(None).is_empty());
    }

    #[tokio::test]
    async fn test_seed_precedence_chain_makespan_180() {
        let (service, _) = service(roster(1, 2));
        let mut request = single_job_request();
        request.jobs[0].task_sequences = vec![10, 20, 30];
        request.jobs[0].task_setup_minutes = 0;
        let response = service.optimize(request).await;

        assert_eq!(response.status, Some(SolveStatus::Optimal));
        let metrics = response.metrics.as_ref().unwrap();
        assert_eq!(metrics.makespan_minutes, 180);
        let mut starts: Vec<NaiveDateTime> =
            response.assignments.iter().map(|a| a.start_time).collect();
        starts.sort();
        assert_eq!(starts[1] - starts[0], chrono::Duration::minutes(60));
        assert_eq!(starts[2] - starts[1], chrono::Duration::minutes(60));
    }

    #[tokio::test]
    async fn test_seed_machine_contention_serializes() {
        let (service, _) = service(roster(1, 2));
        let mut request = single_job_request();
        request.jobs[0].task_setup_minutes = 0;
        request.jobs[0].due_date = t0() + chrono::Duration::hours(24);
        request.jobs.push(JobRequest {
            job_number: "JOB002".into(),
            due_date: t0() + chrono::Duration::hours(24),
            ..request.jobs[0].clone()
        });
        let response = service.optimize(request).await;

        let metrics = response.metrics.as_ref().unwrap();
        assert_eq!(metrics.makespan_minutes, 120);
        assert_eq!(metrics.jobs_on_time, 2);
        assert_eq!(metrics.jobs_late, 0);
    }

    #[tokio::test]
    async fn test_seed_urgent_beats_normal() {
        let (service, _) = service(roster(1, 2));
        let mut request = single_job_request();
        request.jobs[0].task_setup_minutes = 0;
        request.jobs[0].priority = Some("URGENT".into());
        request.jobs[0].due_date = t0() + chrono::Duration::minutes(30);
        request.jobs.push(JobRequest {
            job_number: "JOB002".into(),
            priority: Some("NORMAL".into()),
            due_date: t0() + chrono::Duration::hours(24),
            ..request.jobs[0].clone()
        });
        let response = service.optimize(request).await;

        let urgent = response
            .jobs
            .iter()
            .find(|j| j.job_number == "JOB001")
            .unwrap();
        let normal = response
            .jobs
            .iter()
            .find(|j| j.job_number == "JOB002")
            .unwrap();
        assert_eq!(urgent.tardiness_minutes, 30);
        assert!(normal.on_time);
        let first = response
            .assignments
            .iter()
            .min_by_key(|a| a.start_time)
            .unwrap();
        assert_eq!(first.job_number, "JOB001");
    }

    #[tokio::test]
    async fn test_seed_unqualified_skill_is_no_feasible_solution() {
        // Machine demands WELD level 3; the only operator has level 2.
        let zone = ZoneId::new();
        let operation = crate::domain::value_objects::OperationId::new();
        let machine = Machine::new("M1", "welder", AutomationLevel::Manual, zone)
            .with_skill_requirement(
                operation,
                SkillRequirement::at_level("welding", 3).unwrap(),
            );
        let operator = Operator::new("EMP-1", "novice", zone)
            .with_skill(Skill::intermediate("welding", 2).unwrap());
        let snapshot = RosterSnapshot {
            machines: vec![machine],
            operators: vec![operator],
            zones: Vec::new(),
            holidays: Vec::new(),
        };
        let (service, _) = service(snapshot);
        let response = service.optimize(single_job_request()).await;

        assert!(!response.success);
        let envelope = response.error.as_ref().unwrap();
        assert_eq!(envelope.error_code, "NO_FEASIBLE_SOLUTION");
        assert!(response.resilience_info.fallback_used);
        assert_eq!(response.status, Some(SolveStatus::Infeasible));
    }

    #[tokio::test]
    async fn test_seed_tight_budget_falls_back_with_half_quality() {
        let (service, _) = service(roster(2, 2));
        let mut request = single_job_request();
        request.jobs = (0..20)
            .map(|i| JobRequest {
                job_number: format!("JOB{i:03}"),
                due_date: t0() + chrono::Duration::hours(24),
                ..single_job_request().jobs[0].clone()
            })
            .collect();
        request.optimization_parameters = Some(OptimizationParameters {
            max_time_seconds: 0.1,
            ..Default::default()
        });
        let response = service.optimize(request).await;

        assert!(response.success, "message: {}", response.message);
        if response.resilience_info.fallback_used {
            assert_eq!(response.status, Some(SolveStatus::FallbackSuccess));
            assert!((response.resilience_info.quality_score - 0.5).abs() < 0.11);
        }
        // Every task placed regardless of which path won.
        assert_eq!(response.assignments.len(), 20);
    }

    #[tokio::test]
    async fn test_calendar_pushes_start_to_shift_open() {
        let (service, _) = service(roster(1, 1));
        let mut request = single_job_request();
        // Schedule epoch at 06:00, shift opens 08:00.
        request.schedule_start_time = t0() - chrono::Duration::hours(2);
        request.jobs[0].due_date = t0() + chrono::Duration::hours(48);
        request.business_constraints = Some(BusinessConstraints {
            work_start_hour: 8,
            work_end_hour: 16,
            lunch_start_hour: Some(12),
            lunch_duration_minutes: 30,
            holiday_days: Vec::new(),
        });
        let response = service.optimize(request).await;
        assert!(response.success, "message: {}", response.message);
        assert_eq!(response.assignments[0].start_time, t0());
    }

    #[tokio::test]
    async fn test_validation_error_envelope() {
        let (service, _) = service(roster(1, 1));
        let mut request = single_job_request();
        request.jobs.clear();
        let response = service.optimize(request).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().error_code, "VALIDATION_ERROR");
        assert!(response.status.is_none());
    }

    #[tokio::test]
    async fn test_empty_roster_is_resource_error() {
        // Mocked gateway returning a bare roster.
        let mut gateway = MockPersistenceGateway::new();
        gateway
            .expect_load_roster()
            .returning(|| Ok(RosterSnapshot::default()));
        gateway.expect_persist_solve_outcome().never();

        let controller = Arc::new(ResilienceController::new(
            ResilienceConfig::default(),
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        ));
        let service = OptimizationService::new(
            Arc::new(gateway),
            controller,
            EventPublisher::new(Arc::new(EventBus::new(10))),
        );
        let response = service.optimize(single_job_request()).await;
        assert_eq!(response.error.unwrap().error_code, "RESOURCE_ERROR");
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_events_unpublished() {
        struct FailingGateway(RosterSnapshot);
        impl PersistenceGateway for FailingGateway {
            fn load_roster(&self) -> DomainResult<RosterSnapshot> {
                Ok(self.0.clone())
            }
            fn persist_solve_outcome(
                &self,
                _jobs: &mut Vec<Job>,
                _schedule: &mut Schedule,
            ) -> DomainResult<Vec<DomainEvent>> {
                Err(SchedulingError::database("disk full", false))
            }
        }

        let bus = Arc::new(EventBus::new(100));
        let controller = Arc::new(ResilienceController::new(
            ResilienceConfig::default(),
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        ));
        let service = OptimizationService::new(
            Arc::new(FailingGateway(roster(1, 1))),
            controller,
            EventPublisher::new(bus.clone()),
        );
        let response = service.optimize(single_job_request()).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().error_code, "DATABASE_ERROR");
        assert!(bus.history(None).is_empty());
    }

    #[tokio::test]
    async fn test_health_degrades_after_failures() {
        let (service, _) = service(RosterSnapshot::default());
        let healthy = service.health();
        assert_eq!(healthy.overall_status, OverallStatus::Healthy);

        // Two failing requests (empty roster) push the rate to zero.
        let _ = service.optimize(single_job_request()).await;
        let _ = service.optimize(single_job_request()).await;
        let report = service.health();
        assert_eq!(report.overall_status, OverallStatus::Unhealthy);
        assert_eq!(report.service_health.total_requests, 2);
        assert_eq!(report.retry_statistics.operations, 0);
    }
}
