//! Repository ports.
//!
//! The core depends only on these contracts; persistence is pluggable.
//! `infrastructure::persistence` provides the SQLite implementations and
//! `infrastructure::repositories` the in-memory ones used by tests and
//! demos. Implementations are synchronous; the service layer decides
//! where blocking I/O may run.

use chrono::NaiveDateTime;

#[cfg(test)]
use mockall::automock;

use crate::domain::entities::{
    Job, JobStatus, Machine, Operator, ProductionZone, Schedule, ScheduleStatus,
};
use crate::domain::errors::DomainResult;
use crate::domain::value_objects::{JobId, MachineId, OperatorId, ScheduleId, ZoneId};

/// Access to the `Job` aggregate (tasks included).
#[cfg_attr(test, automock)]
pub trait JobRepository {
    fn get_by_id(&self, id: JobId) -> DomainResult<Option<Job>>;
    fn get_by_job_number(&self, job_number: &str) -> DomainResult<Option<Job>>;
    fn find_by_status(&self, status: JobStatus) -> DomainResult<Vec<Job>>;
    /// Jobs due strictly before the given instant, any non-terminal status.
    fn find_due_before(&self, due: NaiveDateTime) -> DomainResult<Vec<Job>>;
    fn save(&mut self, job: &Job) -> DomainResult<()>;
    fn delete(&mut self, id: JobId) -> DomainResult<()>;
    fn count(&self) -> DomainResult<usize>;
}

/// Access to the machine roster.
#[cfg_attr(test, automock)]
pub trait MachineRepository {
    fn get_by_id(&self, id: MachineId) -> DomainResult<Option<Machine>>;
    fn get_by_code(&self, machine_code: &str) -> DomainResult<Option<Machine>>;
    fn find_available(&self) -> DomainResult<Vec<Machine>>;
    fn save(&mut self, machine: &Machine) -> DomainResult<()>;
    fn delete(&mut self, id: MachineId) -> DomainResult<()>;
}

/// Access to the operator roster (skills included).
#[cfg_attr(test, automock)]
pub trait OperatorRepository {
    fn get_by_id(&self, id: OperatorId) -> DomainResult<Option<Operator>>;
    fn get_by_employee_id(&self, employee_id: &str) -> DomainResult<Option<Operator>>;
    fn find_available(&self) -> DomainResult<Vec<Operator>>;
    fn save(&mut self, operator: &Operator) -> DomainResult<()>;
    fn delete(&mut self, id: OperatorId) -> DomainResult<()>;
}

/// Access to production zones.
#[cfg_attr(test, automock)]
pub trait ZoneRepository {
    fn get_by_id(&self, id: ZoneId) -> DomainResult<Option<ProductionZone>>;
    fn get_all(&self) -> DomainResult<Vec<ProductionZone>>;
    fn save(&mut self, zone: &ProductionZone) -> DomainResult<()>;
}

/// Access to the `Schedule` aggregate.
#[cfg_attr(test, automock)]
pub trait ScheduleRepository {
    fn get_by_id(&self, id: ScheduleId) -> DomainResult<Option<Schedule>>;
    fn find_by_status(&self, status: ScheduleStatus) -> DomainResult<Vec<Schedule>>;
    fn save(&mut self, schedule: &Schedule) -> DomainResult<()>;
    fn delete(&mut self, id: ScheduleId) -> DomainResult<()>;
}
