//! Job aggregate module
//!
//! A job is a customer order travelling through the shop as an ordered
//! sequence of tasks. The job owns its tasks (keyed by `sequence_in_job`),
//! drives their readiness as predecessors complete, and buffers domain
//! events until the surrounding transaction commits.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::entities::task::{Task, TaskStatus};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::events::{DomainEvent, EventPayload};
use crate::domain::value_objects::{JobId, JobPriority, MachineId, OperatorId, TaskId};

/// Maximum number of tasks one job may carry.
pub const MAX_TASKS_PER_JOB: usize = 100;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Planned,
    Released,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match (self, to) {
            (Planned, Released)
            | (Released, InProgress)
            | (Released, OnHold)
            | (InProgress, OnHold)
            | (InProgress, Completed)
            | (OnHold, Released)
            | (OnHold, InProgress) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Planned => "PLANNED",
            JobStatus::Released => "RELEASED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::OnHold => "ON_HOLD",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// A customer order and its ordered task sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    job_number: String,
    customer_name: Option<String>,
    part_number: Option<String>,
    quantity: u32,
    priority: JobPriority,
    status: JobStatus,
    due_date: NaiveDateTime,
    planned_start: Option<NaiveDateTime>,
    planned_end: Option<NaiveDateTime>,
    actual_start: Option<NaiveDateTime>,
    actual_end: Option<NaiveDateTime>,
    created_by: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    /// Tasks keyed by `sequence_in_job`; the key order defines precedence.
    tasks: BTreeMap<u16, Task>,
    /// Status to return to when leaving ON_HOLD.
    held_from: Option<JobStatus>,
    #[serde(skip)]
    pending_events: Vec<DomainEvent>,
}

impl Job {
    /// Creates a planned job.
    ///
    /// # Errors
    ///
    /// Validation fails when the job number is blank, the quantity is zero
    /// or the due date is not strictly in the future.
    pub fn create(
        job_number: impl Into<String>,
        quantity: u32,
        priority: JobPriority,
        due_date: NaiveDateTime,
        created_by: Option<String>,
        now: NaiveDateTime,
    ) -> DomainResult<Self> {
        let job_number = job_number.into().trim().to_string();
        if job_number.is_empty() {
            return Err(SchedulingError::validation(
                "job_number",
                "job number cannot be empty",
            ));
        }
        if quantity == 0 {
            return Err(SchedulingError::validation(
                "quantity",
                "quantity must be at least 1",
            ));
        }
        if due_date <= now {
            return Err(SchedulingError::business_rule(
                "due_date_in_future",
                format!("due date {due_date} must be strictly in the future"),
            ));
        }
        let id = JobId::new();
        let mut job = Self {
            id,
            job_number: job_number.clone(),
            customer_name: None,
            part_number: None,
            quantity,
            priority,
            status: JobStatus::Planned,
            due_date,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            created_by,
            created_at: now,
            updated_at: now,
            tasks: BTreeMap::new(),
            held_from: None,
            pending_events: Vec::new(),
        };
        job.pending_events.push(DomainEvent::new(
            now,
            EventPayload::JobCreated {
                job_id: id,
                job_number,
            },
        ));
        Ok(job)
    }

    /// Reconstitutes a job from storage, bypassing creation validation
    /// and emitting no events.
    #[allow(clippy::too_many_arguments)]
    pub fn hydrate(
        id: JobId,
        job_number: String,
        customer_name: Option<String>,
        part_number: Option<String>,
        quantity: u32,
        priority: JobPriority,
        status: JobStatus,
        due_date: NaiveDateTime,
        created_by: Option<String>,
        created_at: NaiveDateTime,
        updated_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            job_number,
            customer_name,
            part_number,
            quantity,
            priority,
            status,
            due_date,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            created_by,
            created_at,
            updated_at,
            tasks: BTreeMap::new(),
            held_from: None,
            pending_events: Vec::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job_number(&self) -> &str {
        &self.job_number
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer_name.as_deref()
    }

    pub fn set_customer_name(&mut self, name: Option<String>) {
        self.customer_name = name;
    }

    pub fn part_number(&self) -> Option<&str> {
        self.part_number.as_deref()
    }

    pub fn set_part_number(&mut self, part: Option<String>) {
        self.part_number = part;
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn due_date(&self) -> NaiveDateTime {
        self.due_date
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    pub fn actual_start(&self) -> Option<NaiveDateTime> {
        self.actual_start
    }

    pub fn actual_end(&self) -> Option<NaiveDateTime> {
        self.actual_end
    }

    /// Tasks in precedence order.
    pub fn tasks_in_sequence(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn task_by_sequence(&self, sequence: u16) -> Option<&Task> {
        self.tasks.get(&sequence)
    }

    pub fn task_by_id(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.values().find(|t| t.id() == task_id)
    }

    pub fn task_by_id_mut(&mut self, task_id: TaskId) -> Option<&mut Task> {
        self.tasks.values_mut().find(|t| t.id() == task_id)
    }

    /// Adds a task, keeping sequences unique within the job.
    pub fn add_task(&mut self, task: Task) -> DomainResult<()> {
        if task.job_id() != self.id {
            return Err(SchedulingError::validation(
                "job_id",
                "task belongs to a different job",
            ));
        }
        if self.tasks.len() >= MAX_TASKS_PER_JOB {
            return Err(SchedulingError::business_rule(
                "task_limit",
                format!(
                    "job {} already has {MAX_TASKS_PER_JOB} tasks",
                    self.job_number
                ),
            ));
        }
        let sequence = task.sequence_in_job();
        if self.tasks.contains_key(&sequence) {
            return Err(SchedulingError::business_rule(
                "duplicate_task_sequence",
                format!(
                    "sequence {sequence} already exists in job {}",
                    self.job_number
                ),
            ));
        }
        self.tasks.insert(sequence, task);
        Ok(())
    }

    /// Pending, not-yet-published events.
    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.pending_events
    }

    /// Drains the pending event buffer (called after commit).
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn record_status_change(&mut self, from: JobStatus, to: JobStatus, now: NaiveDateTime) {
        self.updated_at = now;
        self.pending_events.push(DomainEvent::new(
            now,
            EventPayload::JobStatusChanged {
                job_id: self.id,
                from,
                to,
            },
        ));
    }

    fn record_task_status_change(
        &mut self,
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        now: NaiveDateTime,
    ) {
        self.pending_events.push(DomainEvent::new(
            now,
            EventPayload::TaskStatusChanged {
                task_id,
                job_id: self.id,
                from,
                to,
            },
        ));
    }

    /// Generic guarded transition.
    pub fn transition_to(&mut self, to: JobStatus, now: NaiveDateTime) -> DomainResult<()> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(SchedulingError::business_rule(
                "job_status_transition",
                format!(
                    "cannot transition job {} from {from} to {to}",
                    self.job_number
                ),
            ));
        }
        self.status = to;
        self.record_status_change(from, to, now);
        Ok(())
    }

    /// Releases the job to the floor and readies its first task.
    pub fn release(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        if self.tasks.is_empty() {
            return Err(SchedulingError::business_rule(
                "release_without_tasks",
                format!("job {} has no tasks to release", self.job_number),
            ));
        }
        self.transition_to(JobStatus::Released, now)?;
        if let Some((&sequence, _)) = self.tasks.iter().next() {
            self.ready_task_at(sequence, now)?;
        }
        Ok(())
    }

    fn ready_task_at(&mut self, sequence: u16, now: NaiveDateTime) -> DomainResult<()> {
        let task = self
            .tasks
            .get_mut(&sequence)
            .ok_or_else(|| SchedulingError::not_found("Task", sequence))?;
        if task.status() == TaskStatus::Pending {
            let task_id = task.id();
            let from = task.status();
            task.transition_to(TaskStatus::Ready)?;
            self.record_task_status_change(task_id, from, TaskStatus::Ready, now);
        }
        Ok(())
    }

    /// Marks a task in progress; the first start moves the job itself to
    /// IN_PROGRESS.
    pub fn start_task(&mut self, task_id: TaskId, now: NaiveDateTime) -> DomainResult<()> {
        let task = self
            .task_by_id_mut(task_id)
            .ok_or_else(|| SchedulingError::not_found("Task", task_id))?;
        let from = task.status();
        task.start(now)?;
        self.record_task_status_change(task_id, from, TaskStatus::InProgress, now);
        if self.status == JobStatus::Released {
            self.transition_to(JobStatus::InProgress, now)?;
            self.actual_start.get_or_insert(now);
        }
        Ok(())
    }

    /// Completes a task and readies the next one by `sequence_in_job`
    /// order. Completing the last task completes the job.
    pub fn complete_task(&mut self, task_id: TaskId, now: NaiveDateTime) -> DomainResult<()> {
        let task = self
            .task_by_id_mut(task_id)
            .ok_or_else(|| SchedulingError::not_found("Task", task_id))?;
        let sequence = task.sequence_in_job();
        let from = task.status();
        task.complete(now)?;
        self.record_task_status_change(task_id, from, TaskStatus::Completed, now);

        let next = self.tasks.range((sequence + 1)..).map(|(&s, _)| s).next();
        match next {
            Some(next_sequence) => self.ready_task_at(next_sequence, now)?,
            None => {
                // No successor: the job is done once every task is terminal.
                if self
                    .tasks
                    .values()
                    .all(|t| matches!(t.status(), TaskStatus::Completed | TaskStatus::Cancelled))
                {
                    self.transition_to(JobStatus::Completed, now)?;
                    self.actual_end = Some(now);
                }
            }
        }
        Ok(())
    }

    /// Records the optimizer's placement for a task.
    ///
    /// A READY task moves to SCHEDULED with full operator assignments;
    /// downstream tasks (still PENDING) keep the planned window only. A
    /// `TaskScheduled` event is buffered either way.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_assignment(
        &mut self,
        task_id: TaskId,
        machine_id: MachineId,
        operator_ids: &[OperatorId],
        start: NaiveDateTime,
        end: NaiveDateTime,
        critical_path: bool,
        now: NaiveDateTime,
    ) -> DomainResult<()> {
        use crate::domain::entities::task::{AssignmentType, OperatorAssignment};

        let job_id = self.id;
        let task = self
            .task_by_id_mut(task_id)
            .ok_or_else(|| SchedulingError::not_found("Task", task_id))?;
        let from = task.status();
        task.set_critical_path(critical_path);
        task.set_planned_window(start, end);
        if from == TaskStatus::Ready {
            let assignments: Vec<OperatorAssignment> = operator_ids
                .iter()
                .map(|&operator_id| {
                    let mut assignment =
                        OperatorAssignment::new(task_id, operator_id, AssignmentType::FullDuration);
                    assignment.planned_start = Some(start);
                    assignment.planned_end = Some(end);
                    assignment
                })
                .collect();
            task.schedule(machine_id, assignments, start, end)?;
            self.record_task_status_change(task_id, from, TaskStatus::Scheduled, now);
        }
        self.pending_events.push(DomainEvent::new(
            now,
            EventPayload::TaskScheduled {
                task_id,
                job_id,
                machine_id,
                start,
                end,
            },
        ));
        Ok(())
    }

    /// Puts the job on hold, remembering where it came from.
    pub fn put_on_hold(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        let from = self.status;
        self.transition_to(JobStatus::OnHold, now)?;
        self.held_from = Some(from);
        Ok(())
    }

    /// Resumes to the state the job was in before the hold.
    pub fn resume(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        let back_to = self.held_from.take().ok_or_else(|| {
            SchedulingError::business_rule(
                "resume_without_hold",
                format!("job {} is not on hold", self.job_number),
            )
        })?;
        self.transition_to(back_to, now)
    }

    pub fn cancel(&mut self, now: NaiveDateTime) -> DomainResult<()> {
        self.transition_to(JobStatus::Cancelled, now)
    }
}
