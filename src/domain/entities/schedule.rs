//! Schedule aggregate module
//!
//! A schedule is the optimizer's output promoted to a first-class
//! aggregate: per-task assignments over a date window, quality metrics,
//! and a lifecycle from DRAFT through PUBLISHED and ACTIVE to COMPLETED.
//! Once published, a schedule is immutable except for status transitions.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::events::{DomainEvent, EventPayload};
use crate::domain::value_objects::{Duration, JobId, MachineId, OperatorId, ScheduleId, TaskId};

/// Lifecycle state of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Draft,
    Published,
    Active,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }

    pub fn can_transition_to(self, to: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        match (self, to) {
            (Draft, Published) | (Published, Active) | (Active, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleStatus::Draft => "DRAFT",
            ScheduleStatus::Published => "PUBLISHED",
            ScheduleStatus::Active => "ACTIVE",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One task's placement: machine, crew and time window.
///
/// Invariant: `end_time == start_time + setup_duration + processing_duration`
/// on the minute grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAssignment {
    pub task_id: TaskId,
    pub machine_id: MachineId,
    pub operator_ids: Vec<OperatorId>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub setup_duration: Duration,
    pub processing_duration: Duration,
}

impl ScheduleAssignment {
    pub fn new(
        task_id: TaskId,
        machine_id: MachineId,
        operator_ids: Vec<OperatorId>,
        start_time: NaiveDateTime,
        setup_duration: Duration,
        processing_duration: Duration,
    ) -> DomainResult<Self> {
        let total = setup_duration.ceil_minutes() + processing_duration.ceil_minutes();
        if total <= 0 {
            return Err(SchedulingError::validation(
                "duration",
                "assignment must occupy at least one minute",
            ));
        }
        let end_time = start_time + chrono::Duration::minutes(total);
        Ok(Self {
            task_id,
            machine_id,
            operator_ids,
            start_time,
            end_time,
            setup_duration,
            processing_duration,
        })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// Whether this assignment occupies the given instant.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start_time && at < self.end_time
    }

    pub fn overlaps(&self, other: &ScheduleAssignment) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// Aggregate quality numbers computed when a solution is adopted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    pub makespan: Duration,
    pub total_tardiness: Duration,
    pub total_cost: Decimal,
}

/// A named, versionable placement of jobs over a date window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    id: ScheduleId,
    name: String,
    description: Option<String>,
    start_date: NaiveDateTime,
    end_date: NaiveDateTime,
    job_ids: Vec<JobId>,
    status: ScheduleStatus,
    assignments: HashMap<TaskId, ScheduleAssignment>,
    constraint_violations: Vec<String>,
    metrics: Option<ScheduleMetrics>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    #[serde(skip)]
    pending_events: Vec<DomainEvent>,
}

impl Schedule {
    pub fn create(
        name: impl Into<String>,
        start_date: NaiveDateTime,
        end_date: NaiveDateTime,
        job_ids: Vec<JobId>,
        now: NaiveDateTime,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchedulingError::validation("name", "schedule name cannot be empty"));
        }
        if end_date <= start_date {
            return Err(SchedulingError::validation(
                "end_date",
                "schedule end date must be after the start date",
            ));
        }
        let id = ScheduleId::new();
        let mut schedule = Self {
            id,
            name: name.clone(),
            description: None,
            start_date,
            end_date,
            job_ids,
            status: ScheduleStatus::Draft,
            assignments: HashMap::new(),
            constraint_violations: Vec::new(),
            metrics: None,
            created_at: now,
            updated_at: now,
            pending_events: Vec::new(),
        };
        schedule.pending_events.push(DomainEvent::new(
            now,
            EventPayload::ScheduleCreated {
                schedule_id: id,
                name,
            },
        ));
        Ok(schedule)
    }

    /// Reconstitutes a schedule from storage, bypassing validation and
    /// emitting no events.
    #[allow(clippy::too_many_arguments)]
    pub fn hydrate(
        id: ScheduleId,
        name: String,
        description: Option<String>,
        start_date: NaiveDateTime,
        end_date: NaiveDateTime,
        job_ids: Vec<JobId>,
        status: ScheduleStatus,
        assignments: HashMap<TaskId, ScheduleAssignment>,
        constraint_violations: Vec<String>,
        metrics: Option<ScheduleMetrics>,
        created_at: NaiveDateTime,
        updated_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            name,
            description,
            start_date,
            end_date,
            job_ids,
            status,
            assignments,
            constraint_violations,
            metrics,
            created_at,
            updated_at,
            pending_events: Vec::new(),
        }
    }

    pub fn id(&self) -> ScheduleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn start_date(&self) -> NaiveDateTime {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDateTime {
        self.end_date
    }

    pub fn job_ids(&self) -> &[JobId] {
        &self.job_ids
    }

    pub fn status(&self) -> ScheduleStatus {
        self.status
    }

    pub fn assignments(&self) -> &HashMap<TaskId, ScheduleAssignment> {
        &self.assignments
    }

    pub fn assignment_for(&self, task_id: TaskId) -> Option<&ScheduleAssignment> {
        self.assignments.get(&task_id)
    }

    pub fn metrics(&self) -> Option<&ScheduleMetrics> {
        self.metrics.as_ref()
    }

    pub fn constraint_violations(&self) -> &[String] {
        &self.constraint_violations
    }

    /// Valid = no recorded violations and at least one assignment.
    pub fn is_valid(&self) -> bool {
        self.constraint_violations.is_empty() && !self.assignments.is_empty()
    }

    /// Whether the content may still change. Only drafts are mutable.
    pub fn is_mutable(&self) -> bool {
        self.status == ScheduleStatus::Draft
    }

    fn ensure_mutable(&self) -> DomainResult<()> {
        if !self.is_mutable() {
            return Err(SchedulingError::business_rule(
                "schedule_immutable",
                format!("schedule '{}' is {} and cannot be modified", self.name, self.status),
            ));
        }
        Ok(())
    }

    /// Adds or replaces the assignment for a task.
    pub fn upsert_assignment(&mut self, assignment: ScheduleAssignment) -> DomainResult<()> {
        self.ensure_mutable()?;
        self.assignments.insert(assignment.task_id, assignment);
        Ok(())
    }

    pub fn set_metrics(&mut self, metrics: ScheduleMetrics) -> DomainResult<()> {
        self.ensure_mutable()?;
        self.metrics = Some(metrics);
        Ok(())
    }

    pub fn record_violations(&mut self, violations: Vec<String>) -> DomainResult<()> {
        self.ensure_mutable()?;
        self.constraint_violations = violations;
        Ok(())
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.pending_events
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn transition_to(&mut self, to: ScheduleStatus, now: NaiveDateTime) -> DomainResult<()> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(SchedulingError::business_rule(
                "schedule_status_transition",
                format!("cannot transition schedule '{}' from {from} to {to}", self.name),
            ));
        }
        self.status = to;
        self.updated_at = now;
        self.pending_events.push(DomainEvent::new(
            now,
            EventPayload::ScheduleStatusChanged {
                schedule_id: self.id,
                from,
                to,
            },
        ));
        Ok(())
    }

    /// Publishes the draft. Requires validity and at least one assignment.
    pub fn publish(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        if self.assignments.is_empty() {
            return Err(SchedulingError::business_rule(
                "publish_empty_schedule",
                format!("schedule '{}' has no assignments", self.name),
            ));
        }
        if !self.is_valid() {
            return Err(SchedulingError::business_rule(
                "publish_invalid_schedule",
                format!(
                    "schedule '{}' has {} constraint violations",
                    self.name,
                    self.constraint_violations.len()
                ),
            ));
        }
        self.transition_to(ScheduleStatus::Published, now)?;
        self.pending_events.push(DomainEvent::new(
            now,
            EventPayload::SchedulePublished {
                schedule_id: self.id,
                assignment_count: self.assignments.len(),
            },
        ));
        Ok(())
    }

    /// Activates a published schedule at or after its start date.
    pub fn activate(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        if now < self.start_date {
            return Err(SchedulingError::business_rule(
                "activate_before_start",
                format!(
                    "schedule '{}' starts at {} and cannot be active at {now}",
                    self.name, self.start_date
                ),
            ));
        }
        self.transition_to(ScheduleStatus::Active, now)
    }

    pub fn complete(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        self.transition_to(ScheduleStatus::Completed, now)
    }

    pub fn cancel(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        self.transition_to(ScheduleStatus::Cancelled, now)
    }
}
