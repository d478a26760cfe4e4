//! In-memory repository implementations
//!
//! HashMap-backed implementations of every repository port. No data
//! survives the process; ideal for tests, demos and the CLI's
//! database-less mode.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::domain::entities::{
    Job, JobStatus, Machine, MachineStatus, Operator, OperatorStatus, ProductionZone, Schedule,
    ScheduleStatus,
};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::repositories::{
    JobRepository, MachineRepository, OperatorRepository, ScheduleRepository, ZoneRepository,
};
use crate::domain::value_objects::{JobId, MachineId, OperatorId, ScheduleId, ZoneId};

/// In-memory implementation of the JobRepository port.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: HashMap<JobId, Job>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn get_by_id(&self, id: JobId) -> DomainResult<Option<Job>> {
        Ok(self.jobs.get(&id).cloned())
    }

    fn get_by_job_number(&self, job_number: &str) -> DomainResult<Option<Job>> {
        Ok(self
            .jobs
            .values()
            .find(|j| j.job_number() == job_number)
            .cloned())
    }

    fn find_by_status(&self, status: JobStatus) -> DomainResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| j.status() == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.due_date());
        Ok(jobs)
    }

    fn find_due_before(&self, due: NaiveDateTime) -> DomainResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| j.due_date() < due && !j.status().is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.due_date());
        Ok(jobs)
    }

    fn save(&mut self, job: &Job) -> DomainResult<()> {
        let duplicate = self
            .jobs
            .values()
            .any(|j| j.job_number() == job.job_number() && j.id() != job.id());
        if duplicate {
            return Err(SchedulingError::business_rule(
                "duplicate_job_number",
                format!("job number '{}' already exists", job.job_number()),
            ));
        }
        self.jobs.insert(job.id(), job.clone());
        Ok(())
    }

    fn delete(&mut self, id: JobId) -> DomainResult<()> {
        self.jobs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SchedulingError::not_found("Job", id))
    }

    fn count(&self) -> DomainResult<usize> {
        Ok(self.jobs.len())
    }
}

/// In-memory implementation of the MachineRepository port.
#[derive(Default)]
pub struct InMemoryMachineRepository {
    machines: HashMap<MachineId, Machine>,
}

impl InMemoryMachineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MachineRepository for InMemoryMachineRepository {
    fn get_by_id(&self, id: MachineId) -> DomainResult<Option<Machine>> {
        Ok(self.machines.get(&id).cloned())
    }

    fn get_by_code(&self, machine_code: &str) -> DomainResult<Option<Machine>> {
        Ok(self
            .machines
            .values()
            .find(|m| m.machine_code == machine_code)
            .cloned())
    }

    fn find_available(&self) -> DomainResult<Vec<Machine>> {
        let mut machines: Vec<Machine> = self
            .machines
            .values()
            .filter(|m| m.status == MachineStatus::Available)
            .cloned()
            .collect();
        machines.sort_by(|a, b| a.machine_code.cmp(&b.machine_code));
        Ok(machines)
    }

    fn save(&mut self, machine: &Machine) -> DomainResult<()> {
        self.machines.insert(machine.id, machine.clone());
        Ok(())
    }

    fn delete(&mut self, id: MachineId) -> DomainResult<()> {
        self.machines
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SchedulingError::not_found("Machine", id))
    }
}

/// In-memory implementation of the OperatorRepository port.
#[derive(Default)]
pub struct InMemoryOperatorRepository {
    operators: HashMap<OperatorId, Operator>,
}

impl InMemoryOperatorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperatorRepository for InMemoryOperatorRepository {
    fn get_by_id(&self, id: OperatorId) -> DomainResult<Option<Operator>> {
        Ok(self.operators.get(&id).cloned())
    }

    fn get_by_employee_id(&self, employee_id: &str) -> DomainResult<Option<Operator>> {
        Ok(self
            .operators
            .values()
            .find(|o| o.employee_id == employee_id)
            .cloned())
    }

    fn find_available(&self) -> DomainResult<Vec<Operator>> {
        let mut operators: Vec<Operator> = self
            .operators
            .values()
            .filter(|o| o.status == OperatorStatus::Available)
            .cloned()
            .collect();
        operators.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
        Ok(operators)
    }

    fn save(&mut self, operator: &Operator) -> DomainResult<()> {
        self.operators.insert(operator.id, operator.clone());
        Ok(())
    }

    fn delete(&mut self, id: OperatorId) -> DomainResult<()> {
        self.operators
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SchedulingError::not_found("Operator", id))
    }
}

/// In-memory implementation of the ZoneRepository port.
#[derive(Default)]
pub struct InMemoryZoneRepository {
    zones: HashMap<ZoneId, ProductionZone>,
}

impl InMemoryZoneRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ZoneRepository for InMemoryZoneRepository {
    fn get_by_id(&self, id: ZoneId) -> DomainResult<Option<ProductionZone>> {
        Ok(self.zones.get(&id).cloned())
    }

    fn get_all(&self) -> DomainResult<Vec<ProductionZone>> {
        let mut zones: Vec<ProductionZone> = self.zones.values().cloned().collect();
        zones.sort_by(|a, b| a.zone_code.cmp(&b.zone_code));
        Ok(zones)
    }

    fn save(&mut self, zone: &ProductionZone) -> DomainResult<()> {
        self.zones.insert(zone.id, zone.clone());
        Ok(())
    }
}

/// In-memory implementation of the ScheduleRepository port.
#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: HashMap<ScheduleId, Schedule>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleRepository for InMemoryScheduleRepository {
    fn get_by_id(&self, id: ScheduleId) -> DomainResult<Option<Schedule>> {
        Ok(self.schedules.get(&id).cloned())
    }

    fn find_by_status(&self, status: ScheduleStatus) -> DomainResult<Vec<Schedule>> {
        Ok(self
            .schedules
            .values()
            .filter(|s| s.status() == status)
            .cloned()
            .collect())
    }

    fn save(&mut self, schedule: &Schedule) -> DomainResult<()> {
        self.schedules.insert(schedule.id(), schedule.clone());
        Ok(())
    }

    fn delete(&mut self, id: ScheduleId) -> DomainResult<()> {
        self.schedules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SchedulingError::not_found("Schedule", id))
    }
}

/// Gateway over the in-memory repositories, for demos and tests.
#[derive(Default)]
pub struct InMemoryGateway {
    machines: std::sync::Mutex<InMemoryMachineRepository>,
    operators: std::sync::Mutex<InMemoryOperatorRepository>,
    zones: std::sync::Mutex<InMemoryZoneRepository>,
    jobs: std::sync::Mutex<InMemoryJobRepository>,
    schedules: std::sync::Mutex<InMemoryScheduleRepository>,
    holidays: std::sync::Mutex<Vec<chrono::NaiveDate>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_machine(&self, machine: &Machine) -> DomainResult<()> {
        self.machines.lock().expect("lock poisoned").save(machine)
    }

    pub fn add_operator(&self, operator: &Operator) -> DomainResult<()> {
        self.operators.lock().expect("lock poisoned").save(operator)
    }

    pub fn add_zone(&self, zone: &ProductionZone) -> DomainResult<()> {
        self.zones.lock().expect("lock poisoned").save(zone)
    }

    pub fn add_holiday(&self, date: chrono::NaiveDate) {
        self.holidays.lock().expect("lock poisoned").push(date);
    }

    pub fn job_count(&self) -> usize {
        self.jobs
            .lock()
            .expect("lock poisoned")
            .count()
            .unwrap_or(0)
    }
}

impl crate::application::services::optimization_service::PersistenceGateway for InMemoryGateway {
    fn load_roster(
        &self,
    ) -> DomainResult<crate::application::services::optimization_service::RosterSnapshot> {
        Ok(
            crate::application::services::optimization_service::RosterSnapshot {
                machines: self
                    .machines
                    .lock()
                    .expect("lock poisoned")
                    .find_available()?,
                operators: self
                    .operators
                    .lock()
                    .expect("lock poisoned")
                    .find_available()?,
                zones: self.zones.lock().expect("lock poisoned").get_all()?,
                holidays: self.holidays.lock().expect("lock poisoned").clone(),
            },
        )
    }

    fn persist_solve_outcome(
        &self,
        jobs: &mut Vec<Job>,
        schedule: &mut Schedule,
    ) -> DomainResult<Vec<crate::domain::events::DomainEvent>> {
        {
            let mut repo = self.jobs.lock().expect("lock poisoned");
            for job in jobs.iter() {
                repo.save(job)?;
            }
        }
        self.schedules
            .lock()
            .expect("lock poisoned")
            .save(schedule)?;
        let mut events = Vec::new();
        for job in jobs.iter_mut() {
            events.extend(job.take_events());
        }
        events.extend(schedule.take_events());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Task;
    use crate::domain::value_objects::{Duration, JobPriority, OperationId};

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn sample_job(number: &str) -> Job {
        let mut job = Job::create(
            number,
            1,
            JobPriority::Normal,
            now() + chrono::Duration::hours(48),
            None,
            now(),
        )
        .unwrap();
        job.add_task(
            Task::new(
                job.id(),
                OperationId::new(),
                10,
                Duration::from_minutes_i64(60).unwrap(),
                Duration::ZERO,
            )
            .unwrap(),
        )
        .unwrap();
        job
    }

    #[test]
    fn test_job_repository_roundtrip() {
        let mut repo = InMemoryJobRepository::new();
        let job = sample_job("JOB001");
        repo.save(&job).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
        assert!(repo.get_by_id(job.id()).unwrap().is_some());
        assert!(repo.get_by_job_number("JOB001").unwrap().is_some());
        assert_eq!(repo.find_by_status(JobStatus::Planned).unwrap().len(), 1);
    }

    #[test]
    fn test_job_duplicate_number() {
        let mut repo = InMemoryJobRepository::new();
        repo.save(&sample_job("JOB001")).unwrap();
        let err = repo.save(&sample_job("JOB001")).unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");
    }

    #[test]
    fn test_find_due_before_sorted() {
        let mut repo = InMemoryJobRepository::new();
        let soon = Job::create(
            "SOON",
            1,
            JobPriority::Normal,
            now() + chrono::Duration::hours(2),
            None,
            now(),
        )
        .unwrap();
        let later = Job::create(
            "LATER",
            1,
            JobPriority::Normal,
            now() + chrono::Duration::hours(20),
            None,
            now(),
        )
        .unwrap();
        repo.save(&later).unwrap();
        repo.save(&soon).unwrap();
        let due = repo
            .find_due_before(now() + chrono::Duration::hours(48))
            .unwrap();
        assert_eq!(due[0].job_number(), "SOON");
        assert_eq!(due[1].job_number(), "LATER");
    }

    #[test]
    fn test_machine_availability_filter() {
        let mut repo = InMemoryMachineRepository::new();
        let zone = ZoneId::new();
        repo.save(&Machine::new(
            "M1",
            "a",
            crate::domain::entities::AutomationLevel::Manual,
            zone,
        ))
        .unwrap();
        let mut down = Machine::new(
            "M2",
            "b",
            crate::domain::entities::AutomationLevel::Manual,
            zone,
        );
        down.status = MachineStatus::Maintenance;
        repo.save(&down).unwrap();
        assert_eq!(repo.find_available().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing() {
        let mut repo = InMemoryScheduleRepository::new();
        assert_eq!(
            repo.delete(ScheduleId::new()).unwrap_err().error_code(),
            "ENTITY_NOT_FOUND"
        );
    }
}
