//! SQLite persistence gateway.
//!
//! Implements the service's persistence boundary over one shared
//! connection: roster reads outside any transaction, the solve outcome
//! committed through a unit of work with transient-error retries. Events
//! are drained from the aggregates only after the commit succeeded.

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::application::services::optimization_service::{PersistenceGateway, RosterSnapshot};
use crate::domain::entities::{Job, Schedule};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::events::DomainEvent;
use crate::domain::repositories::{
    JobRepository, MachineRepository, OperatorRepository, ScheduleRepository, ZoneRepository,
};
use crate::infrastructure::persistence::job_repository::SqliteJobRepository;
use crate::infrastructure::persistence::resource_repository::{
    SqliteMachineRepository, SqliteOperatorRepository, SqliteZoneRepository,
};
use crate::infrastructure::persistence::schedule_repository::SqliteScheduleRepository;
use crate::infrastructure::persistence::unit_of_work::{transactional, TxRetryConfig};

/// Gateway over a single SQLite connection.
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
    tx_config: TxRetryConfig,
}

impl SqliteGateway {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            tx_config: TxRetryConfig::default(),
        }
    }

    pub fn with_tx_config(mut self, tx_config: TxRetryConfig) -> Self {
        self.tx_config = tx_config;
        self
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

impl PersistenceGateway for SqliteGateway {
    fn load_roster(&self) -> DomainResult<RosterSnapshot> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SchedulingError::database("connection lock poisoned", false))?;
        let machines = SqliteMachineRepository::new(&conn).find_available()?;
        let operators = SqliteOperatorRepository::new(&conn).find_available()?;
        let zones = SqliteZoneRepository::new(&conn).get_all()?;
        let holidays = load_holidays(&conn)?;
        Ok(RosterSnapshot {
            machines,
            operators,
            zones,
            holidays,
        })
    }

    fn persist_solve_outcome(
        &self,
        jobs: &mut Vec<Job>,
        schedule: &mut Schedule,
    ) -> DomainResult<Vec<DomainEvent>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SchedulingError::database("connection lock poisoned", false))?;
        let (_, events) = transactional(&conn, &self.tx_config, |uow| {
            let mut job_repo = SqliteJobRepository::new(uow.connection());
            for job in jobs.iter() {
                job_repo.save(job)?;
            }
            let mut schedule_repo = SqliteScheduleRepository::new(uow.connection());
            schedule_repo.save(schedule)?;
            // Buffer copies of the pending events; the aggregates keep
            // theirs so a retried attempt buffers them again. The unit of
            // work hands them back only after COMMIT succeeds.
            let mut pending = Vec::new();
            for job in jobs.iter() {
                pending.extend(job.pending_events().to_vec());
            }
            pending.extend(schedule.pending_events().to_vec());
            uow.collect_events(pending);
            Ok(())
        })?;
        // Committed: clear the aggregates' buffers.
        for job in jobs.iter_mut() {
            job.take_events();
        }
        schedule.take_events();
        Ok(events)
    }
}

fn load_holidays(conn: &Connection) -> DomainResult<Vec<chrono::NaiveDate>> {
    let mut stmt = conn.prepare("SELECT holiday_date FROM holiday_calendar ORDER BY holiday_date")?;
    let holidays = stmt
        .query_map([], |row| {
            let text: String = row.get(0)?;
            chrono::NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    format!("invalid holiday date '{text}': {e}").into(),
                )
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(holidays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AutomationLevel, Machine, Operator, ScheduleAssignment, Task};
    use crate::domain::value_objects::{
        Duration, JobPriority, MachineId, OperationId, OperatorId, TaskId, ZoneId,
    };
    use crate::infrastructure::persistence::schema;

    fn now() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn gateway_with_roster() -> SqliteGateway {
        let conn = schema::open_in_memory().unwrap();
        schema::create_schema(&conn).unwrap();
        let zone = ZoneId::new();
        SqliteMachineRepository::new(&conn)
            .save(&Machine::new("M1", "mill", AutomationLevel::Manual, zone))
            .unwrap();
        SqliteOperatorRepository::new(&conn)
            .save(&Operator::new("EMP-1", "Ada", zone))
            .unwrap();
        SqliteGateway::new(conn)
    }

    fn sample_outcome() -> (Vec<Job>, Schedule) {
        let mut job = Job::create(
            "JOB001",
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
        let mut schedule = Schedule::create(
            "weekly",
            now(),
            now() + chrono::Duration::days(7),
            vec![job.id()],
            now(),
        )
        .unwrap();
        schedule
            .upsert_assignment(
                ScheduleAssignment::new(
                    TaskId::new(),
                    MachineId::new(),
                    vec![OperatorId::new()],
                    now(),
                    Duration::ZERO,
                    Duration::from_minutes_i64(60).unwrap(),
                )
                .unwrap(),
            )
            .unwrap();
        (vec![job], schedule)
    }

    #[test]
    fn test_load_roster() {
        let gateway = gateway_with_roster();
        let roster = gateway.load_roster().unwrap();
        assert_eq!(roster.machines.len(), 1);
        assert_eq!(roster.operators.len(), 1);
        assert!(roster.zones.is_empty());
    }

    #[test]
    fn test_persist_outcome_commits_and_drains_events() {
        let gateway = gateway_with_roster();
        let (mut jobs, mut schedule) = sample_outcome();
        let events = gateway
            .persist_solve_outcome(&mut jobs, &mut schedule)
            .unwrap();
        // JobCreated + ScheduleCreated at minimum.
        assert!(events.len() >= 2);
        assert!(jobs[0].pending_events().is_empty());
        assert!(schedule.pending_events().is_empty());

        let conn = gateway.connection();
        let conn = conn.lock().unwrap();
        assert!(SqliteJobRepository::new(&conn)
            .get_by_job_number("JOB001")
            .unwrap()
            .is_some());
        assert!(SqliteScheduleRepository::new(&conn)
            .get_by_id(schedule.id())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_persist_failure_is_atomic() {
        let gateway = gateway_with_roster();
        let (mut jobs, mut schedule) = sample_outcome();
        // A second job with the same business key forces a mid-transaction
        // domain failure.
        let duplicate = Job::create(
            "JOB001",
            1,
            JobPriority::Normal,
            now() + chrono::Duration::hours(48),
            None,
            now(),
        )
        .unwrap();
        jobs.push(duplicate);

        let err = gateway
            .persist_solve_outcome(&mut jobs, &mut schedule)
            .unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");

        // Nothing persisted: the first job's insert was rolled back too.
        let conn = gateway.connection();
        let conn = conn.lock().unwrap();
        assert_eq!(SqliteJobRepository::new(&conn).count().unwrap(), 0);
    }
}
