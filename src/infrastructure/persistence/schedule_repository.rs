//! SQLite implementation of the schedule repository.

use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::entities::{Schedule, ScheduleAssignment, ScheduleMetrics, ScheduleStatus};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::repositories::ScheduleRepository;
use crate::domain::value_objects::{Duration, JobId, MachineId, OperatorId, ScheduleId, TaskId};
use crate::infrastructure::persistence::schema::{format_datetime, parse_datetime};

pub struct SqliteScheduleRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteScheduleRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
        let id: String = row.get("id")?;
        let status: String = row.get("status")?;
        let start: String = row.get("start_date")?;
        let end: String = row.get("end_date")?;
        let created: String = row.get("created_at")?;
        let updated: String = row.get("updated_at")?;
        let job_ids_json: String = row.get("job_ids")?;
        let violations_json: String = row.get("constraint_violations")?;

        let job_ids: Vec<JobId> = parse_json_ids(&job_ids_json)?;
        let violations: Vec<String> = serde_json::from_str(&violations_json)
            .map_err(|e| column_error(format!("invalid violations: {e}")))?;

        let makespan: Option<String> = row.get("makespan_minutes")?;
        let tardiness: Option<String> = row.get("total_tardiness_minutes")?;
        let cost: Option<String> = row.get("total_cost")?;
        let metrics = match (makespan, tardiness, cost) {
            (Some(m), Some(t), Some(c)) => Some(ScheduleMetrics {
                makespan: parse_duration(&m)?,
                total_tardiness: parse_duration(&t)?,
                total_cost: parse_decimal(&c)?,
            }),
            _ => None,
        };

        Ok(Schedule::hydrate(
            parse_id::<ScheduleId>(&id)?,
            row.get("name")?,
            row.get("description")?,
            parse_dt(&start)?,
            parse_dt(&end)?,
            job_ids,
            parse_status(&status)?,
            HashMap::new(),
            violations,
            metrics,
            parse_dt(&created)?,
            parse_dt(&updated)?,
        ))
    }

    fn load_assignments(&self, schedule: Schedule) -> DomainResult<Schedule> {
        let schedule_id = schedule.id().to_string();
        let mut stmt = self.conn.prepare(
            "SELECT task_id, machine_id, operator_ids, start_time, end_time,
                    setup_duration_minutes, processing_duration_minutes
             FROM schedule_assignments WHERE schedule_id = ?1",
        )?;
        let assignments: Vec<ScheduleAssignment> = stmt
            .query_map([&schedule_id], |row| {
                let task_id: String = row.get("task_id")?;
                let machine_id: String = row.get("machine_id")?;
                let operators_json: String = row.get("operator_ids")?;
                let start: String = row.get("start_time")?;
                let end: String = row.get("end_time")?;
                let setup: String = row.get("setup_duration_minutes")?;
                let processing: String = row.get("processing_duration_minutes")?;
                Ok(ScheduleAssignment {
                    task_id: parse_id::<TaskId>(&task_id)?,
                    machine_id: parse_id::<MachineId>(&machine_id)?,
                    operator_ids: parse_json_ids(&operators_json)?,
                    start_time: parse_dt(&start)?,
                    end_time: parse_dt(&end)?,
                    setup_duration: parse_duration(&setup)?,
                    processing_duration: parse_duration(&processing)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let map: HashMap<TaskId, ScheduleAssignment> = assignments
            .into_iter()
            .map(|a| (a.task_id, a))
            .collect();
        // Hydrate again with the assignment map attached, keeping the
        // aggregate constructor as the single assembly point.
        Ok(Schedule::hydrate(
            schedule.id(),
            schedule.name().to_string(),
            schedule.description().map(str::to_string),
            schedule.start_date(),
            schedule.end_date(),
            schedule.job_ids().to_vec(),
            schedule.status(),
            map,
            schedule.constraint_violations().to_vec(),
            schedule.metrics().cloned(),
            schedule.created_at(),
            schedule.updated_at(),
        ))
    }
}

impl ScheduleRepository for SqliteScheduleRepository<'_> {
    fn get_by_id(&self, id: ScheduleId) -> DomainResult<Option<Schedule>> {
        let schedule = self
            .conn
            .query_row(
                "SELECT * FROM schedules WHERE id = ?1",
                [id.to_string()],
                Self::schedule_from_row,
            )
            .optional()?;
        schedule.map(|s| self.load_assignments(s)).transpose()
    }

    fn find_by_status(&self, status: ScheduleStatus) -> DomainResult<Vec<Schedule>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM schedules WHERE status = ?1 ORDER BY created_at")?;
        let schedules: Vec<Schedule> = stmt
            .query_map([status.to_string()], Self::schedule_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        schedules
            .into_iter()
            .map(|s| self.load_assignments(s))
            .collect()
    }

    fn save(&mut self, schedule: &Schedule) -> DomainResult<()> {
        let job_ids = serde_json::to_string(
            &schedule
                .job_ids()
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".into());
        let violations = serde_json::to_string(schedule.constraint_violations())
            .unwrap_or_else(|_| "[]".into());
        self.conn.execute(
            "INSERT INTO schedules (id, name, description, start_date, end_date, status,
                 job_ids, constraint_violations, makespan_minutes,
                 total_tardiness_minutes, total_cost, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 start_date = excluded.start_date,
                 end_date = excluded.end_date,
                 status = excluded.status,
                 job_ids = excluded.job_ids,
                 constraint_violations = excluded.constraint_violations,
                 makespan_minutes = excluded.makespan_minutes,
                 total_tardiness_minutes = excluded.total_tardiness_minutes,
                 total_cost = excluded.total_cost,
                 updated_at = excluded.updated_at",
            params![
                schedule.id().to_string(),
                schedule.name(),
                schedule.description(),
                format_datetime(schedule.start_date()),
                format_datetime(schedule.end_date()),
                schedule.status().to_string(),
                job_ids,
                violations,
                schedule.metrics().map(|m| m.makespan.minutes().to_string()),
                schedule
                    .metrics()
                    .map(|m| m.total_tardiness.minutes().to_string()),
                schedule.metrics().map(|m| m.total_cost.to_string()),
                format_datetime(schedule.created_at()),
                format_datetime(schedule.updated_at()),
            ],
        )?;

        let schedule_id = schedule.id().to_string();
        self.conn.execute(
            "DELETE FROM schedule_assignments WHERE schedule_id = ?1",
            [&schedule_id],
        )?;
        for assignment in schedule.assignments().values() {
            let operators = serde_json::to_string(
                &assignment
                    .operator_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>(),
            )
            .unwrap_or_else(|_| "[]".into());
            self.conn.execute(
                "INSERT INTO schedule_assignments
                     (schedule_id, task_id, machine_id, operator_ids, start_time,
                      end_time, setup_duration_minutes, processing_duration_minutes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    schedule_id,
                    assignment.task_id.to_string(),
                    assignment.machine_id.to_string(),
                    operators,
                    format_datetime(assignment.start_time),
                    format_datetime(assignment.end_time),
                    assignment.setup_duration.minutes().to_string(),
                    assignment.processing_duration.minutes().to_string(),
                ],
            )?;
        }
        Ok(())
    }

    fn delete(&mut self, id: ScheduleId) -> DomainResult<()> {
        let affected = self
            .conn
            .execute("DELETE FROM schedules WHERE id = ?1", [id.to_string()])?;
        if affected == 0 {
            return Err(SchedulingError::not_found("Schedule", id));
        }
        Ok(())
    }
}

fn column_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, message.into())
}

fn parse_id<T: FromStr<Err = uuid::Error>>(text: &str) -> rusqlite::Result<T> {
    text.parse()
        .map_err(|e: uuid::Error| column_error(format!("invalid id '{text}': {e}")))
}

fn parse_json_ids<T: FromStr<Err = uuid::Error>>(json: &str) -> rusqlite::Result<Vec<T>> {
    let raw: Vec<String> =
        serde_json::from_str(json).map_err(|e| column_error(format!("invalid id list: {e}")))?;
    raw.iter().map(|s| parse_id(s)).collect()
}

fn parse_dt(text: &str) -> rusqlite::Result<chrono::NaiveDateTime> {
    parse_datetime(text).map_err(|e| column_error(e.to_string()))
}

fn parse_decimal(text: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(text).map_err(|e| column_error(format!("invalid decimal '{text}': {e}")))
}

fn parse_duration(text: &str) -> rusqlite::Result<Duration> {
    Duration::from_minutes(parse_decimal(text)?).map_err(|e| column_error(e.to_string()))
}

fn parse_status(text: &str) -> rusqlite::Result<ScheduleStatus> {
    match text {
        "DRAFT" => Ok(ScheduleStatus::Draft),
        "PUBLISHED" => Ok(ScheduleStatus::Published),
        "ACTIVE" => Ok(ScheduleStatus::Active),
        "COMPLETED" => Ok(ScheduleStatus::Completed),
        "CANCELLED" => Ok(ScheduleStatus::Cancelled),
        other => Err(column_error(format!("unknown schedule status '{other}'"))),
    }
}
