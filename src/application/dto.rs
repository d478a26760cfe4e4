//! Solve request/response contract of the optimization service.
//!
//! These are the serializable records the outside world exchanges with
//! the engine: the CLI reads a `SolveRequest` from JSON and writes the
//! `SolveResponse` back out. Validation enforces the advertised limits
//! before any aggregate is built.

use chrono::{NaiveDateTime, Days};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration as StdDuration;

use crate::domain::entities::Job;
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::value_objects::{BusinessCalendar, Duration, JobPriority, OperationId};
use crate::resilience::{BreakerSnapshot, RetryStatistics};
use crate::solver::{ObjectiveSpec, SolverParameters};

/// Advertised and enforced request limits.
pub const MAX_JOBS_PER_REQUEST: usize = 50;
pub const MAX_TASKS_PER_JOB: usize = 100;
pub const MAX_HORIZON_DAYS: u32 = 90;
pub const MAX_SOLVE_SECONDS: f64 = 3_600.0;
pub const MAX_MEMORY_MB: u64 = 4_096;
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// One job in a solve request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_number: String,
    #[serde(default)]
    pub priority: Option<String>,
    pub due_date: NaiveDateTime,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    /// Task sequence numbers, e.g. `[10, 20, 30]`.
    pub task_sequences: Vec<u16>,
    /// Planned processing minutes applied to every task of this job.
    #[serde(default = "default_task_minutes")]
    pub task_duration_minutes: i64,
    #[serde(default)]
    pub task_setup_minutes: i64,
}

fn default_quantity() -> u32 {
    1
}

fn default_task_minutes() -> i64 {
    30
}

/// Working-time constraints for the whole request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConstraints {
    pub work_start_hour: u8,
    pub work_end_hour: u8,
    #[serde(default)]
    pub lunch_start_hour: Option<u8>,
    #[serde(default)]
    pub lunch_duration_minutes: u32,
    /// Whole-day holidays as day offsets from the schedule start date.
    #[serde(default)]
    pub holiday_days: Vec<u32>,
}

/// Solver and objective knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationParameters {
    #[serde(default = "default_max_time")]
    pub max_time_seconds: f64,
    #[serde(default = "default_workers")]
    pub num_workers: usize,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default = "default_true")]
    pub enable_hierarchical_optimization: bool,
    /// Weight of priority-weighted tardiness against makespan.
    #[serde(default = "default_primary_weight")]
    pub primary_objective_weight: i64,
    #[serde(default = "default_cost_tolerance")]
    pub cost_optimization_tolerance: f64,
    #[serde(default = "default_memory_mb")]
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub random_seed: Option<u64>,
}

fn default_max_time() -> f64 {
    60.0
}

fn default_workers() -> usize {
    4
}

fn default_horizon_days() -> u32 {
    14
}

fn default_true() -> bool {
    true
}

fn default_primary_weight() -> i64 {
    10
}

fn default_cost_tolerance() -> f64 {
    0.02
}

fn default_memory_mb() -> u64 {
    1_024
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            max_time_seconds: default_max_time(),
            num_workers: default_workers(),
            horizon_days: default_horizon_days(),
            enable_hierarchical_optimization: true,
            primary_objective_weight: default_primary_weight(),
            cost_optimization_tolerance: default_cost_tolerance(),
            memory_limit_mb: default_memory_mb(),
            random_seed: None,
        }
    }
}

/// A complete solve request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub problem_name: String,
    pub schedule_start_time: NaiveDateTime,
    pub jobs: Vec<JobRequest>,
    #[serde(default)]
    pub business_constraints: Option<BusinessConstraints>,
    #[serde(default)]
    pub optimization_parameters: Option<OptimizationParameters>,
}

impl SolveRequest {
    /// Enforces the advertised limits. Returns the first violation.
    pub fn validate(&self) -> DomainResult<()> {
        if self.problem_name.trim().is_empty() {
            return Err(SchedulingError::validation(
                "problem_name",
                "problem name cannot be empty",
            ));
        }
        if self.jobs.is_empty() {
            return Err(SchedulingError::validation("jobs", "at least one job is required"));
        }
        if self.jobs.len() > MAX_JOBS_PER_REQUEST {
            return Err(SchedulingError::validation(
                "jobs",
                format!(
                    "{} jobs exceed the limit of {MAX_JOBS_PER_REQUEST} per request",
                    self.jobs.len()
                ),
            ));
        }
        for (index, job) in self.jobs.iter().enumerate() {
            if job.task_sequences.is_empty() {
                return Err(SchedulingError::validation(
                    format!("jobs[{index}].task_sequences"),
                    "every job needs at least one task sequence",
                ));
            }
            if job.task_sequences.len() > MAX_TASKS_PER_JOB {
                return Err(SchedulingError::validation(
                    format!("jobs[{index}].task_sequences"),
                    format!("more than {MAX_TASKS_PER_JOB} tasks in one job"),
                ));
            }
        }
        let params = self.parameters();
        if params.max_time_seconds <= 0.0 || params.max_time_seconds > MAX_SOLVE_SECONDS {
            return Err(SchedulingError::validation(
                "optimization_parameters.max_time_seconds",
                format!("solve time must be within (0, {MAX_SOLVE_SECONDS}] seconds"),
            ));
        }
        if params.horizon_days == 0 || params.horizon_days > MAX_HORIZON_DAYS {
            return Err(SchedulingError::validation(
                "optimization_parameters.horizon_days",
                format!("horizon must be within [1, {MAX_HORIZON_DAYS}] days"),
            ));
        }
        if params.memory_limit_mb == 0 || params.memory_limit_mb > MAX_MEMORY_MB {
            return Err(SchedulingError::validation(
                "optimization_parameters.memory_limit_mb",
                format!("memory limit must be within [1, {MAX_MEMORY_MB}] MB"),
            ));
        }
        if let Some(constraints) = &self.business_constraints {
            if constraints.work_start_hour >= constraints.work_end_hour
                || constraints.work_end_hour > 24
            {
                return Err(SchedulingError::validation(
                    "business_constraints",
                    "working hours must satisfy start < end <= 24",
                ));
            }
        }
        Ok(())
    }

    /// Parameters with defaults applied.
    pub fn parameters(&self) -> OptimizationParameters {
        self.optimization_parameters.clone().unwrap_or_default()
    }

    pub fn horizon_minutes(&self) -> i64 {
        i64::from(self.parameters().horizon_days) * 24 * 60
    }

    /// Builds the working calendar from the business constraints.
    pub fn calendar(&self) -> DomainResult<BusinessCalendar> {
        let Some(constraints) = &self.business_constraints else {
            return Ok(BusinessCalendar::around_the_clock());
        };
        let mut calendar =
            BusinessCalendar::every_day(constraints.work_start_hour, constraints.work_end_hour)?;
        if let Some(lunch_start) = constraints.lunch_start_hour {
            calendar = calendar.with_lunch(lunch_start, constraints.lunch_duration_minutes);
        }
        for &offset in &constraints.holiday_days {
            if let Some(date) = self
                .schedule_start_time
                .date()
                .checked_add_days(Days::new(u64::from(offset)))
            {
                calendar = calendar.with_holiday(date);
            }
        }
        Ok(calendar)
    }

    /// Builds the domain job aggregates described by the request. Every
    /// task of one job shares a synthetic operation from the request's
    /// catalog-less world.
    pub fn build_jobs(&self) -> DomainResult<Vec<Job>> {
        let t0 = self.schedule_start_time;
        let mut jobs = Vec::with_capacity(self.jobs.len());
        for spec in &self.jobs {
            let priority = match &spec.priority {
                Some(text) => text.parse::<JobPriority>()?,
                None => JobPriority::Normal,
            };
            let mut job = Job::create(
                spec.job_number.clone(),
                spec.quantity,
                priority,
                spec.due_date,
                None,
                t0,
            )?;
            job.set_customer_name(spec.customer_name.clone());
            job.set_part_number(spec.part_number.clone());
            let operation = OperationId::new();
            for &sequence in &spec.task_sequences {
                let task = crate::domain::entities::Task::new(
                    job.id(),
                    operation,
                    sequence,
                    Duration::from_minutes_i64(spec.task_duration_minutes)?,
                    Duration::from_minutes_i64(spec.task_setup_minutes)?,
                )?;
                job.add_task(task)?;
            }
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Objective configuration for the model builder.
    pub fn objective(&self) -> ObjectiveSpec {
        let params = self.parameters();
        ObjectiveSpec {
            makespan_weight: 1,
            tardiness_weight: params.primary_objective_weight,
            hierarchical: params.enable_hierarchical_optimization,
            cost_tolerance: params.cost_optimization_tolerance,
        }
    }

    /// Engine caps for the solver driver.
    pub fn solver_parameters(&self) -> SolverParameters {
        let params = self.parameters();
        SolverParameters {
            max_time: StdDuration::from_secs_f64(params.max_time_seconds),
            num_workers: params.num_workers,
            memory_limit_mb: params.memory_limit_mb,
            random_seed: params.random_seed,
        }
    }
}

/// Final classification of a solve response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Timeout,
    FallbackSuccess,
}

impl SolveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Timeout => "TIMEOUT",
            SolveStatus::FallbackSuccess => "FALLBACK_SUCCESS",
        }
    }
}

/// Per-job outcome in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_number: String,
    pub priority: String,
    pub due_date: NaiveDateTime,
    pub completion_time: Option<NaiveDateTime>,
    pub tardiness_minutes: i64,
    pub on_time: bool,
    pub task_count: usize,
}

/// One task placement in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub job_number: String,
    pub sequence_in_job: u16,
    pub machine_code: String,
    pub operator_count: usize,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_critical_path: bool,
}

/// Aggregate schedule metrics in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveMetrics {
    pub makespan_minutes: i64,
    pub total_tardiness_minutes: i64,
    pub total_operator_cost: f64,
    pub machine_utilization_percent: f64,
    pub operator_utilization_percent: f64,
    pub jobs_on_time: usize,
    pub jobs_late: usize,
    pub critical_path_jobs: Vec<String>,
    pub solve_time_seconds: f64,
    pub solver_status: String,
    pub gap_percent: f64,
}

/// The resilience journey attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceInfo {
    pub fallback_used: bool,
    #[serde(default)]
    pub fallback_strategy: Option<String>,
    pub circuit_breaker_triggered: bool,
    pub retry_attempts: u32,
    pub quality_score: f64,
    pub warnings: Vec<String>,
}

/// Machine-readable failure envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error_code: String,
    pub message: String,
    pub details: Value,
}

/// A complete solve response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResponse {
    pub problem_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SolveStatus>,
    pub success: bool,
    pub message: String,
    pub jobs: Vec<JobSummary>,
    pub assignments: Vec<AssignmentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SolveMetrics>,
    pub processing_time_seconds: f64,
    pub resilience_info: ResilienceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

/// Service-level health aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub total_requests: u64,
    pub success_rate: f64,
    pub average_solve_time_seconds: f64,
    pub open_circuit_breakers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// The health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub service_health: ServiceHealth,
    pub circuit_breakers: Vec<BreakerSnapshot>,
    pub retry_statistics: RetryStatistics,
    pub overall_status: OverallStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn base_request() -> SolveRequest {
        SolveRequest {
            problem_name: "weekly".into(),
            schedule_start_time: t0(),
            jobs: vec![JobRequest {
                job_number: "JOB001".into(),
                priority: Some("NORMAL".into()),
                due_date: t0() + chrono::Duration::hours(48),
                quantity: 1,
                customer_name: None,
                part_number: None,
                task_sequences: vec![10, 20],
                task_duration_minutes: 60,
                task_setup_minutes: 10,
            }],
            business_constraints: None,
            optimization_parameters: None,
        }
    }

    #[test]
    fn test_defaults_applied() {
        let request = base_request();
        let params = request.parameters();
        assert_eq!(params.max_time_seconds, 60.0);
        assert_eq!(params.num_workers, 4);
        assert_eq!(params.horizon_days, 14);
        assert!(params.enable_hierarchical_optimization);
        assert_eq!(request.horizon_minutes(), 14 * 24 * 60);
    }

    #[test]
    fn test_limit_validation() {
        let mut request = base_request();
        request.validate().unwrap();

        request.jobs = (0..51)
            .map(|i| JobRequest {
                job_number: format!("JOB{i:03}"),
                ..base_request().jobs[0].clone()
            })
            .collect();
        assert_eq!(
            request.validate().unwrap_err().error_code(),
            "VALIDATION_ERROR"
        );

        let mut request = base_request();
        request.optimization_parameters = Some(OptimizationParameters {
            max_time_seconds: 7_200.0,
            ..Default::default()
        });
        assert!(request.validate().is_err());

        let mut request = base_request();
        request.optimization_parameters = Some(OptimizationParameters {
            horizon_days: 180,
            ..Default::default()
        });
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_build_jobs_preserves_order_and_priority() {
        let mut request = base_request();
        request.jobs[0].priority = Some("urgent".into());
        let jobs = request.build_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].priority(), JobPriority::Urgent);
        assert_eq!(jobs[0].task_count(), 2);
        let sequences: Vec<u16> = jobs[0]
            .tasks_in_sequence()
            .map(|t| t.sequence_in_job())
            .collect();
        assert_eq!(sequences, vec![10, 20]);
    }

    #[test]
    fn test_due_date_in_past_rejected_by_domain() {
        let mut request = base_request();
        request.jobs[0].due_date = t0() - chrono::Duration::hours(1);
        let err = request.build_jobs().unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");
    }

    #[test]
    fn test_calendar_from_constraints() {
        let mut request = base_request();
        request.business_constraints = Some(BusinessConstraints {
            work_start_hour: 8,
            work_end_hour: 16,
            lunch_start_hour: Some(12),
            lunch_duration_minutes: 30,
            holiday_days: vec![1],
        });
        let calendar = request.calendar().unwrap();
        // Monday 09:00 works; Tuesday (+1 day) is the holiday.
        assert!(calendar.is_working_instant(t0() + chrono::Duration::hours(1)));
        assert!(!calendar.is_working_instant(t0() + chrono::Duration::days(1)));
        // Lunch carved out.
        assert!(!calendar.is_working_instant(t0() + chrono::Duration::hours(4) + chrono::Duration::minutes(10)));
    }

    #[test]
    fn test_request_json_roundtrip() {
        let json = r#"{
            "problem_name": "demo",
            "schedule_start_time": "2026-08-03T08:00:00",
            "jobs": [
                {"job_number": "JOB001", "due_date": "2026-08-05T08:00:00", "task_sequences": [10]}
            ]
        }"#;
        let request: SolveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.jobs[0].quantity, 1);
        assert_eq!(request.jobs[0].task_duration_minutes, 30);
        request.validate().unwrap();
        let back = serde_json::to_string(&request).unwrap();
        assert!(back.contains("JOB001"));
    }
}
