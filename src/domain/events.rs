//! Domain events.
//!
//! Events are timestamped, typed, immutable records describing a change to
//! exactly one aggregate. Aggregates buffer events in a pending list; the
//! event publisher drains that list only after the surrounding transaction
//! commits, so observers never see uncommitted state.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{JobStatus, ScheduleStatus, TaskStatus};
use crate::domain::value_objects::{JobId, MachineId, ScheduleId, TaskId};

/// Discriminant used to key subscriptions on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    JobCreated,
    JobStatusChanged,
    TaskStatusChanged,
    TaskScheduled,
    ScheduleCreated,
    ScheduleStatusChanged,
    SchedulePublished,
}

/// Change description, one variant per event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    JobCreated {
        job_id: JobId,
        job_number: String,
    },
    JobStatusChanged {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    TaskStatusChanged {
        task_id: TaskId,
        job_id: JobId,
        from: TaskStatus,
        to: TaskStatus,
    },
    TaskScheduled {
        task_id: TaskId,
        job_id: JobId,
        machine_id: MachineId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    ScheduleCreated {
        schedule_id: ScheduleId,
        name: String,
    },
    ScheduleStatusChanged {
        schedule_id: ScheduleId,
        from: ScheduleStatus,
        to: ScheduleStatus,
    },
    SchedulePublished {
        schedule_id: ScheduleId,
        assignment_count: usize,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::JobCreated { .. } => EventKind::JobCreated,
            EventPayload::JobStatusChanged { .. } => EventKind::JobStatusChanged,
            EventPayload::TaskStatusChanged { .. } => EventKind::TaskStatusChanged,
            EventPayload::TaskScheduled { .. } => EventKind::TaskScheduled,
            EventPayload::ScheduleCreated { .. } => EventKind::ScheduleCreated,
            EventPayload::ScheduleStatusChanged { .. } => EventKind::ScheduleStatusChanged,
            EventPayload::SchedulePublished { .. } => EventKind::SchedulePublished,
        }
    }

    /// The identity of the aggregate the event describes.
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            EventPayload::JobCreated { job_id, .. }
            | EventPayload::JobStatusChanged { job_id, .. } => job_id.as_uuid(),
            EventPayload::TaskStatusChanged { job_id, .. }
            | EventPayload::TaskScheduled { job_id, .. } => job_id.as_uuid(),
            EventPayload::ScheduleCreated { schedule_id, .. }
            | EventPayload::ScheduleStatusChanged { schedule_id, .. }
            | EventPayload::SchedulePublished { schedule_id, .. } => schedule_id.as_uuid(),
        }
    }
}

/// A published (or pending) domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub occurred_at: NaiveDateTime,
    pub payload: EventPayload,
}

impl DomainEvent {
    pub fn new(occurred_at: NaiveDateTime, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.payload.aggregate_id()
    }
}
