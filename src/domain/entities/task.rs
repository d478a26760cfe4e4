//! Task entity module
//!
//! A task is one operation step of a job. Tasks move through a strict
//! lifecycle driven by their job's progress, carry planned and realized
//! timing, and own the operator assignments made for them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::value_objects::{
    AssignmentId, Duration, JobId, MachineId, OperationId, OperatorId, TaskId,
};

/// Maximum times a failed task may be reworked.
pub const MAX_REWORK_COUNT: u8 = 3;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Ready,
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Legal transitions; anything else is a business-rule violation.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, to) {
            (Pending, Ready)
            | (Ready, Scheduled)
            | (Scheduled, InProgress)
            | (InProgress, Completed)
            | (InProgress, Failed)
            // Rework sends a failed task back to the queue.
            | (Failed, Ready) => true,
            (from, Cancelled) => !from.is_terminal() && from != Cancelled,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Ready => "READY",
            TaskStatus::Scheduled => "SCHEDULED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// How an operator participates in a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentType {
    FullDuration,
    SetupOnly,
    ProcessingOnly,
}

/// An operator's assignment to a task.
///
/// Active until an actual end is recorded; at most one active assignment
/// may exist per (task, operator) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorAssignment {
    pub id: AssignmentId,
    pub task_id: TaskId,
    pub operator_id: OperatorId,
    pub assignment_type: AssignmentType,
    pub planned_start: Option<NaiveDateTime>,
    pub planned_end: Option<NaiveDateTime>,
    pub actual_start: Option<NaiveDateTime>,
    pub actual_end: Option<NaiveDateTime>,
}

impl OperatorAssignment {
    pub fn new(task_id: TaskId, operator_id: OperatorId, assignment_type: AssignmentType) -> Self {
        Self {
            id: AssignmentId::new(),
            task_id,
            operator_id,
            assignment_type,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.actual_end.is_none()
    }
}

/// One operation step within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    job_id: JobId,
    operation_id: OperationId,
    sequence_in_job: u16,
    planned_duration: Duration,
    setup_duration: Duration,
    status: TaskStatus,
    assigned_machine_id: Option<MachineId>,
    operator_assignments: Vec<OperatorAssignment>,
    is_critical_path: bool,
    rework_count: u8,
    planned_start: Option<NaiveDateTime>,
    planned_end: Option<NaiveDateTime>,
    scheduled_start: Option<NaiveDateTime>,
    scheduled_end: Option<NaiveDateTime>,
    actual_start: Option<NaiveDateTime>,
    actual_end: Option<NaiveDateTime>,
}

impl Task {
    /// Creates a pending task.
    ///
    /// # Errors
    ///
    /// Validation fails when the planned duration is not positive or the
    /// sequence is outside `[1, 100]`.
    pub fn new(
        job_id: JobId,
        operation_id: OperationId,
        sequence_in_job: u16,
        planned_duration: Duration,
        setup_duration: Duration,
    ) -> DomainResult<Self> {
        if !(1..=100).contains(&sequence_in_job) {
            return Err(SchedulingError::validation(
                "sequence_in_job",
                format!("sequence must be within [1, 100], got {sequence_in_job}"),
            ));
        }
        if planned_duration.is_zero() || planned_duration.is_negative() {
            return Err(SchedulingError::validation(
                "planned_duration_minutes",
                "planned duration must be positive",
            ));
        }
        if setup_duration.is_negative() {
            return Err(SchedulingError::validation(
                "setup_duration_minutes",
                "setup duration cannot be negative",
            ));
        }
        Ok(Self {
            id: TaskId::new(),
            job_id,
            operation_id,
            sequence_in_job,
            planned_duration,
            setup_duration,
            status: TaskStatus::Pending,
            assigned_machine_id: None,
            operator_assignments: Vec::new(),
            is_critical_path: false,
            rework_count: 0,
            planned_start: None,
            planned_end: None,
            scheduled_start: None,
            scheduled_end: None,
            actual_start: None,
            actual_end: None,
        })
    }

    /// Reconstitutes a task from storage, bypassing creation validation.
    #[allow(clippy::too_many_arguments)]
    pub fn hydrate(
        id: TaskId,
        job_id: JobId,
        operation_id: OperationId,
        sequence_in_job: u16,
        planned_duration: Duration,
        setup_duration: Duration,
        status: TaskStatus,
        assigned_machine_id: Option<MachineId>,
        is_critical_path: bool,
        rework_count: u8,
    ) -> Self {
        Self {
            id,
            job_id,
            operation_id,
            sequence_in_job,
            planned_duration,
            setup_duration,
            status,
            assigned_machine_id,
            operator_assignments: Vec::new(),
            is_critical_path,
            rework_count,
            planned_start: None,
            planned_end: None,
            scheduled_start: None,
            scheduled_end: None,
            actual_start: None,
            actual_end: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn sequence_in_job(&self) -> u16 {
        self.sequence_in_job
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn planned_duration(&self) -> Duration {
        self.planned_duration
    }

    pub fn setup_duration(&self) -> Duration {
        self.setup_duration
    }

    /// Setup plus processing.
    pub fn total_duration(&self) -> Duration {
        self.setup_duration + self.planned_duration
    }

    pub fn assigned_machine_id(&self) -> Option<MachineId> {
        self.assigned_machine_id
    }

    pub fn operator_assignments(&self) -> &[OperatorAssignment] {
        &self.operator_assignments
    }

    pub fn is_critical_path(&self) -> bool {
        self.is_critical_path
    }

    pub fn set_critical_path(&mut self, value: bool) {
        self.is_critical_path = value;
    }

    pub fn rework_count(&self) -> u8 {
        self.rework_count
    }

    pub fn scheduled_start(&self) -> Option<NaiveDateTime> {
        self.scheduled_start
    }

    pub fn scheduled_end(&self) -> Option<NaiveDateTime> {
        self.scheduled_end
    }

    pub fn actual_start(&self) -> Option<NaiveDateTime> {
        self.actual_start
    }

    pub fn actual_end(&self) -> Option<NaiveDateTime> {
        self.actual_end
    }

    pub fn planned_start(&self) -> Option<NaiveDateTime> {
        self.planned_start
    }

    pub fn planned_end(&self) -> Option<NaiveDateTime> {
        self.planned_end
    }

    pub fn set_planned_window(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        self.planned_start = Some(start);
        self.planned_end = Some(end);
    }

    /// Minutes of delay against the planned end, zero when on time or
    /// when either side is unknown.
    pub fn delay_minutes(&self) -> i64 {
        match (self.planned_end, self.actual_end) {
            (Some(planned), Some(actual)) if actual > planned => {
                (actual - planned).num_minutes()
            }
            _ => 0,
        }
    }

    /// Moves the task to a new status, enforcing the lifecycle.
    pub fn transition_to(&mut self, to: TaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(SchedulingError::business_rule(
                "task_status_transition",
                format!("cannot transition task {} from {} to {}", self.id, self.status, to),
            ));
        }
        self.status = to;
        Ok(())
    }

    /// Records the optimizer's placement and moves READY -> SCHEDULED.
    ///
    /// Enforces `scheduled_end > scheduled_start`.
    pub fn schedule(
        &mut self,
        machine_id: MachineId,
        operators: Vec<OperatorAssignment>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> DomainResult<()> {
        if end <= start {
            return Err(SchedulingError::validation(
                "scheduled_end",
                "scheduled end must be after scheduled start",
            ));
        }
        self.transition_to(TaskStatus::Scheduled)?;
        self.assigned_machine_id = Some(machine_id);
        self.scheduled_start = Some(start);
        self.scheduled_end = Some(end);
        for assignment in operators {
            self.add_operator_assignment(assignment)?;
        }
        Ok(())
    }

    /// Attaches an operator assignment, rejecting a second active
    /// assignment for the same operator.
    pub fn add_operator_assignment(
        &mut self,
        assignment: OperatorAssignment,
    ) -> DomainResult<()> {
        let duplicate = self
            .operator_assignments
            .iter()
            .any(|a| a.operator_id == assignment.operator_id && a.is_active());
        if duplicate {
            return Err(SchedulingError::business_rule(
                "duplicate_operator_assignment",
                format!(
                    "operator {} already has an active assignment on task {}",
                    assignment.operator_id, self.id
                ),
            ));
        }
        self.operator_assignments.push(assignment);
        Ok(())
    }

    pub fn start(&mut self, at: NaiveDateTime) -> DomainResult<()> {
        self.transition_to(TaskStatus::InProgress)?;
        self.actual_start = Some(at);
        Ok(())
    }

    pub fn complete(&mut self, at: NaiveDateTime) -> DomainResult<()> {
        self.transition_to(TaskStatus::Completed)?;
        self.actual_end = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, at: NaiveDateTime) -> DomainResult<()> {
        self.transition_to(TaskStatus::Failed)?;
        self.actual_end = Some(at);
        Ok(())
    }

    /// Sends a failed task back for another attempt.
    ///
    /// # Errors
    ///
    /// Business rule violation when the task is not FAILED or the rework
    /// cap is already reached.
    pub fn record_rework(&mut self) -> DomainResult<()> {
        if self.status != TaskStatus::Failed {
            return Err(SchedulingError::business_rule(
                "rework",
                format!("task {} is {} and cannot be reworked", self.id, self.status),
            ));
        }
        if self.rework_count >= MAX_REWORK_COUNT {
            return Err(SchedulingError::business_rule(
                "rework",
                format!(
                    "task {} already reworked {} times (cap {})",
                    self.id, self.rework_count, MAX_REWORK_COUNT
                ),
            ));
        }
        self.transition_to(TaskStatus::Ready)?;
        self.rework_count += 1;
        self.actual_start = None;
        self.actual_end = None;
        Ok(())
    }
}
