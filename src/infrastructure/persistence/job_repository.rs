//! SQLite implementation of the job repository.
//!
//! Saving is aggregate-wise: the job row is upserted and its task rows
//! (plus operator assignments) are rewritten, so the stored picture always
//! matches the in-memory aggregate. Reads hydrate the full aggregate in
//! sequence order.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::entities::{
    AssignmentType, Job, JobStatus, OperatorAssignment, Task, TaskStatus,
};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::repositories::JobRepository;
use crate::domain::value_objects::{
    AssignmentId, Duration, JobId, JobPriority, MachineId, OperationId, OperatorId, TaskId,
};
use crate::infrastructure::persistence::schema::{format_datetime, parse_datetime};

pub struct SqliteJobRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteJobRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn job_from_row(row: &Row<'_>) -> rusqlite::Result<(Job, String)> {
        let id: String = row.get("id")?;
        let job_number: String = row.get("job_number")?;
        let priority: String = row.get("priority")?;
        let status: String = row.get("status")?;
        let due_date: String = row.get("due_date")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let job = Job::hydrate(
            parse_id::<JobId>(&id)?,
            job_number,
            row.get("customer_name")?,
            row.get("part_number")?,
            row.get("quantity")?,
            parse_priority(&priority)?,
            parse_job_status(&status)?,
            parse_dt(&due_date)?,
            row.get("created_by")?,
            parse_dt(&created_at)?,
            parse_dt(&updated_at)?,
        );
        Ok((job, id))
    }

    fn load_tasks(&self, job: &mut Job, job_id: &str) -> DomainResult<()> {
        let owner = job.id();
        let mut stmt = self.conn.prepare(
            "SELECT id, operation_id, sequence_in_job, planned_duration_minutes,
                    setup_duration_minutes, status, assigned_machine_id,
                    is_critical_path, rework_count
             FROM tasks WHERE job_id = ?1 ORDER BY sequence_in_job",
        )?;
        let tasks: Vec<Task> = stmt
            .query_map([job_id], |row| {
                let id: String = row.get("id")?;
                let operation_id: String = row.get("operation_id")?;
                let status: String = row.get("status")?;
                let planned: String = row.get("planned_duration_minutes")?;
                let setup: String = row.get("setup_duration_minutes")?;
                let machine: Option<String> = row.get("assigned_machine_id")?;
                Ok(Task::hydrate(
                    parse_id::<TaskId>(&id)?,
                    owner,
                    parse_id::<OperationId>(&operation_id)?,
                    row.get("sequence_in_job")?,
                    parse_duration(&planned)?,
                    parse_duration(&setup)?,
                    parse_task_status(&status)?,
                    machine.as_deref().map(parse_id::<MachineId>).transpose()?,
                    row.get::<_, i64>("is_critical_path")? != 0,
                    row.get("rework_count")?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        for mut task in tasks {
            self.load_assignments(&mut task)?;
            job.add_task(task)?;
        }
        Ok(())
    }

    fn load_assignments(&self, task: &mut Task) -> DomainResult<()> {
        let owner = task.id();
        let mut stmt = self.conn.prepare(
            "SELECT id, operator_id, assignment_type, planned_start_time,
                    planned_end_time, actual_start_time, actual_end_time
             FROM operator_assignments WHERE task_id = ?1",
        )?;
        let assignments: Vec<OperatorAssignment> = stmt
            .query_map([owner.to_string()], |row| {
                let id: String = row.get("id")?;
                let operator_id: String = row.get("operator_id")?;
                let kind: String = row.get("assignment_type")?;
                Ok(OperatorAssignment {
                    id: parse_id::<AssignmentId>(&id)?,
                    task_id: owner,
                    operator_id: parse_id::<OperatorId>(&operator_id)?,
                    assignment_type: parse_assignment_type(&kind)?,
                    planned_start: parse_opt_dt(row.get("planned_start_time")?)?,
                    planned_end: parse_opt_dt(row.get("planned_end_time")?)?,
                    actual_start: parse_opt_dt(row.get("actual_start_time")?)?,
                    actual_end: parse_opt_dt(row.get("actual_end_time")?)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        for assignment in assignments {
            task.add_operator_assignment(assignment)?;
        }
        Ok(())
    }

    fn load_aggregate(&self, mut job: Job, id_text: String) -> DomainResult<Job> {
        self.load_tasks(&mut job, &id_text)?;
        Ok(job)
    }

    fn write_tasks(&self, job: &Job) -> DomainResult<()> {
        self.conn.execute(
            "DELETE FROM tasks WHERE job_id = ?1",
            [job.id().to_string()],
        )?;
        for task in job.tasks_in_sequence() {
            self.conn.execute(
                "INSERT INTO tasks (id, job_id, operation_id, sequence_in_job,
                     planned_duration_minutes, setup_duration_minutes, status,
                     assigned_machine_id, is_critical_path, rework_count,
                     planned_start_time, planned_end_time,
                     scheduled_start_time, scheduled_end_time,
                     actual_start_time, actual_end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    task.id().to_string(),
                    job.id().to_string(),
                    task.operation_id().to_string(),
                    task.sequence_in_job(),
                    task.planned_duration().minutes().to_string(),
                    task.setup_duration().minutes().to_string(),
                    task.status().to_string(),
                    task.assigned_machine_id().map(|m| m.to_string()),
                    task.is_critical_path() as i64,
                    task.rework_count(),
                    task.planned_start().map(format_datetime),
                    task.planned_end().map(format_datetime),
                    task.scheduled_start().map(format_datetime),
                    task.scheduled_end().map(format_datetime),
                    task.actual_start().map(format_datetime),
                    task.actual_end().map(format_datetime),
                ],
            )?;
            for assignment in task.operator_assignments() {
                self.conn.execute(
                    "INSERT INTO operator_assignments (id, task_id, operator_id,
                         assignment_type, planned_start_time, planned_end_time,
                         actual_start_time, actual_end_time)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        assignment.id.to_string(),
                        task.id().to_string(),
                        assignment.operator_id.to_string(),
                        assignment_type_str(assignment.assignment_type),
                        assignment.planned_start.map(format_datetime),
                        assignment.planned_end.map(format_datetime),
                        assignment.actual_start.map(format_datetime),
                        assignment.actual_end.map(format_datetime),
                    ],
                )?;
            }
        }
        Ok(())
    }
}

impl JobRepository for SqliteJobRepository<'_> {
    fn get_by_id(&self, id: JobId) -> DomainResult<Option<Job>> {
        let row = self
            .conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                [id.to_string()],
                Self::job_from_row,
            )
            .optional()?;
        row.map(|(job, id_text)| self.load_aggregate(job, id_text))
            .transpose()
    }

    fn get_by_job_number(&self, job_number: &str) -> DomainResult<Option<Job>> {
        let row = self
            .conn
            .query_row(
                "SELECT * FROM jobs WHERE job_number = ?1",
                [job_number],
                Self::job_from_row,
            )
            .optional()?;
        row.map(|(job, id_text)| self.load_aggregate(job, id_text))
            .transpose()
    }

    fn find_by_status(&self, status: JobStatus) -> DomainResult<Vec<Job>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM jobs WHERE status = ?1 ORDER BY due_date")?;
        let rows: Vec<(Job, String)> = stmt
            .query_map([status.to_string()], Self::job_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter()
            .map(|(job, id_text)| self.load_aggregate(job, id_text))
            .collect()
    }

    fn find_due_before(&self, due: NaiveDateTime) -> DomainResult<Vec<Job>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM jobs
             WHERE due_date < ?1 AND status NOT IN ('COMPLETED', 'CANCELLED')
             ORDER BY due_date",
        )?;
        let rows: Vec<(Job, String)> = stmt
            .query_map([format_datetime(due)], Self::job_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter()
            .map(|(job, id_text)| self.load_aggregate(job, id_text))
            .collect()
    }

    fn save(&mut self, job: &Job) -> DomainResult<()> {
        // A different job already holding this business key is a domain
        // conflict, not a storage error.
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM jobs WHERE job_number = ?1",
                [job.job_number()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = existing {
            if other != job.id().to_string() {
                return Err(SchedulingError::business_rule(
                    "duplicate_job_number",
                    format!("job number '{}' already exists", job.job_number()),
                ));
            }
        }
        self.conn.execute(
            "INSERT INTO jobs (id, job_number, customer_name, part_number, quantity,
                 priority, status, due_date, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 customer_name = excluded.customer_name,
                 part_number = excluded.part_number,
                 quantity = excluded.quantity,
                 priority = excluded.priority,
                 status = excluded.status,
                 due_date = excluded.due_date,
                 updated_at = excluded.updated_at",
            params![
                job.id().to_string(),
                job.job_number(),
                job.customer_name(),
                job.part_number(),
                job.quantity(),
                job.priority().to_string(),
                job.status().to_string(),
                format_datetime(job.due_date()),
                job.created_by(),
                format_datetime(job.created_at()),
                format_datetime(job.updated_at()),
            ],
        )?;
        self.write_tasks(job)
    }

    fn delete(&mut self, id: JobId) -> DomainResult<()> {
        let affected = self
            .conn
            .execute("DELETE FROM jobs WHERE id = ?1", [id.to_string()])?;
        if affected == 0 {
            return Err(SchedulingError::not_found("Job", id));
        }
        Ok(())
    }

    fn count(&self) -> DomainResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn column_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_id<T: FromStr<Err = uuid::Error>>(text: &str) -> rusqlite::Result<T> {
    text.parse()
        .map_err(|e: uuid::Error| column_error(format!("invalid id '{text}': {e}")))
}

fn parse_dt(text: &str) -> rusqlite::Result<NaiveDateTime> {
    parse_datetime(text).map_err(|e| column_error(e.to_string()))
}

fn parse_opt_dt(text: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    text.as_deref().map(parse_dt).transpose()
}

fn parse_duration(text: &str) -> rusqlite::Result<Duration> {
    let minutes = Decimal::from_str(text)
        .map_err(|e| column_error(format!("invalid duration '{text}': {e}")))?;
    Duration::from_minutes(minutes).map_err(|e| column_error(e.to_string()))
}

fn parse_priority(text: &str) -> rusqlite::Result<JobPriority> {
    text.parse()
        .map_err(|_| column_error(format!("unknown priority '{text}'")))
}

fn parse_job_status(text: &str) -> rusqlite::Result<JobStatus> {
    match text {
        "PLANNED" => Ok(JobStatus::Planned),
        "RELEASED" => Ok(JobStatus::Released),
        "IN_PROGRESS" => Ok(JobStatus::InProgress),
        "ON_HOLD" => Ok(JobStatus::OnHold),
        "COMPLETED" => Ok(JobStatus::Completed),
        "CANCELLED" => Ok(JobStatus::Cancelled),
        other => Err(column_error(format!("unknown job status '{other}'"))),
    }
}

fn parse_task_status(text: &str) -> rusqlite::Result<TaskStatus> {
    match text {
        "PENDING" => Ok(TaskStatus::Pending),
        "READY" => Ok(TaskStatus::Ready),
        "SCHEDULED" => Ok(TaskStatus::Scheduled),
        "IN_PROGRESS" => Ok(TaskStatus::InProgress),
        "COMPLETED" => Ok(TaskStatus::Completed),
        "FAILED" => Ok(TaskStatus::Failed),
        "CANCELLED" => Ok(TaskStatus::Cancelled),
        other => Err(column_error(format!("unknown task status '{other}'"))),
    }
}

fn parse_assignment_type(text: &str) -> rusqlite::Result<AssignmentType> {
    match text {
        "FULL_DURATION" => Ok(AssignmentType::FullDuration),
        "SETUP_ONLY" => Ok(AssignmentType::SetupOnly),
        "PROCESSING_ONLY" => Ok(AssignmentType::ProcessingOnly),
        other => Err(column_error(format!("unknown assignment type '{other}'"))),
    }
}

fn assignment_type_str(kind: AssignmentType) -> &'static str {
    match kind {
        AssignmentType::FullDuration => "FULL_DURATION",
        AssignmentType::SetupOnly => "SETUP_ONLY",
        AssignmentType::ProcessingOnly => "PROCESSING_ONLY",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::schema;

    fn setup() -> Connection {
        let conn = schema::open_in_memory().unwrap();
        schema::create_schema(&conn).unwrap();
        conn
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn sample_job() -> Job {
        let mut job = Job::create(
            "JOB001",
            5,
            JobPriority::High,
            now() + chrono::Duration::hours(48),
            Some("planner".into()),
            now(),
        )
        .unwrap();
        job.set_customer_name(Some("ACME".into()));
        for sequence in [10u16, 20] {
            job.add_task(
                Task::new(
                    job.id(),
                    OperationId::new(),
                    sequence,
                    Duration::from_minutes_i64(60).unwrap(),
                    Duration::from_minutes_i64(10).unwrap(),
                )
                .unwrap(),
            )
            .unwrap();
        }
        job
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let conn = setup();
        let mut repo = SqliteJobRepository::new(&conn);
        let job = sample_job();
        repo.save(&job).unwrap();

        let loaded = repo.get_by_id(job.id()).unwrap().unwrap();
        assert_eq!(loaded.job_number(), "JOB001");
        assert_eq!(loaded.customer_name(), Some("ACME"));
        assert_eq!(loaded.priority(), JobPriority::High);
        assert_eq!(loaded.task_count(), 2);
        let sequences: Vec<u16> = loaded
            .tasks_in_sequence()
            .map(|t| t.sequence_in_job())
            .collect();
        assert_eq!(sequences, vec![10, 20]);
        assert_eq!(
            loaded.task_by_sequence(10).unwrap().planned_duration(),
            Duration::from_minutes_i64(60).unwrap()
        );
    }

    #[test]
    fn test_get_by_job_number_and_missing() {
        let conn = setup();
        let mut repo = SqliteJobRepository::new(&conn);
        let job = sample_job();
        repo.save(&job).unwrap();
        assert!(repo.get_by_job_number("JOB001").unwrap().is_some());
        assert!(repo.get_by_job_number("NOPE").unwrap().is_none());
        assert!(repo.get_by_id(JobId::new()).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_job_number_rejected() {
        let conn = setup();
        let mut repo = SqliteJobRepository::new(&conn);
        repo.save(&sample_job()).unwrap();
        let other = sample_job(); // same number, different id
        let err = repo.save(&other).unwrap_err();
        assert_eq!(err.error_code(), "BUSINESS_RULE_VIOLATION");
    }

    #[test]
    fn test_resave_updates_aggregate() {
        let conn = setup();
        let mut repo = SqliteJobRepository::new(&conn);
        let mut job = sample_job();
        repo.save(&job).unwrap();
        job.release(now()).unwrap();
        repo.save(&job).unwrap();

        let loaded = repo.get_by_id(job.id()).unwrap().unwrap();
        assert_eq!(loaded.status(), JobStatus::Released);
        assert_eq!(
            loaded.task_by_sequence(10).unwrap().status(),
            TaskStatus::Ready
        );
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_find_due_before_skips_terminal() {
        let conn = setup();
        let mut repo = SqliteJobRepository::new(&conn);
        let mut done = sample_job();
        done.cancel(now()).unwrap();
        repo.save(&done).unwrap();

        let mut open = Job::create(
            "JOB002",
            1,
            JobPriority::Normal,
            now() + chrono::Duration::hours(24),
            None,
            now(),
        )
        .unwrap();
        open.add_task(
            Task::new(
                open.id(),
                OperationId::new(),
                10,
                Duration::from_minutes_i64(30).unwrap(),
                Duration::ZERO,
            )
            .unwrap(),
        )
        .unwrap();
        repo.save(&open).unwrap();

        let due = repo
            .find_due_before(now() + chrono::Duration::hours(100))
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].job_number(), "JOB002");
    }

    #[test]
    fn test_delete() {
        let conn = setup();
        let mut repo = SqliteJobRepository::new(&conn);
        let job = sample_job();
        repo.save(&job).unwrap();
        repo.delete(job.id()).unwrap();
        assert!(repo.get_by_id(job.id()).unwrap().is_none());
        assert_eq!(
            repo.delete(job.id()).unwrap_err().error_code(),
            "ENTITY_NOT_FOUND"
        );
        // Cascade removed the tasks too.
        let task_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(task_count, 0);
    }
}
