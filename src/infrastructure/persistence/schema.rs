//! SQLite schema for the scheduling engine.
//!
//! Engine-agnostic data model expressed as plain tables; the strategic
//! indexes mirror the hot query paths: jobs by `(status, due_date)`,
//! tasks by machine and planned window, and the unique
//! `(job_id, sequence_in_job)` ordering key.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::Connection;

/// Wall-clock format used for every datetime column.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub fn parse_datetime(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .with_context(|| format!("invalid datetime '{text}'"))
}

/// Opens a connection with the pragmas this engine expects.
pub fn open_database(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path).context("failed to open SQLite database")?;
    configure(&conn)?;
    Ok(conn)
}

/// In-memory database for tests and demos.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;        -- Write-Ahead Logging for better concurrency
        PRAGMA synchronous = NORMAL;      -- Balance between safety and speed
        PRAGMA foreign_keys = ON;         -- Enforce aggregate ownership
        PRAGMA cache_size = 10000;
        PRAGMA temp_store = MEMORY;
        "#,
    )
    .context("failed to configure SQLite pragmas")?;
    Ok(())
}

/// Creates every table and index. Idempotent.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            job_number TEXT NOT NULL UNIQUE,
            customer_name TEXT,
            part_number TEXT,
            quantity INTEGER NOT NULL,
            priority TEXT NOT NULL,
            status TEXT NOT NULL,
            due_date TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_status_due ON jobs(status, due_date);

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            operation_id TEXT NOT NULL,
            sequence_in_job INTEGER NOT NULL,
            planned_duration_minutes TEXT NOT NULL,
            setup_duration_minutes TEXT NOT NULL,
            status TEXT NOT NULL,
            assigned_machine_id TEXT,
            is_critical_path INTEGER NOT NULL DEFAULT 0,
            rework_count INTEGER NOT NULL DEFAULT 0,
            planned_start_time TEXT,
            planned_end_time TEXT,
            scheduled_start_time TEXT,
            scheduled_end_time TEXT,
            actual_start_time TEXT,
            actual_end_time TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_job_sequence
            ON tasks(job_id, sequence_in_job);
        CREATE INDEX IF NOT EXISTS idx_tasks_machine_window
            ON tasks(assigned_machine_id, planned_start_time, planned_end_time);

        CREATE TABLE IF NOT EXISTS operator_assignments (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            operator_id TEXT NOT NULL,
            assignment_type TEXT NOT NULL,
            planned_start_time TEXT,
            planned_end_time TEXT,
            actual_start_time TEXT,
            actual_end_time TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_operator_assignments_task
            ON operator_assignments(task_id);

        CREATE TABLE IF NOT EXISTS machines (
            id TEXT PRIMARY KEY,
            machine_code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            automation_level TEXT NOT NULL,
            status TEXT NOT NULL,
            zone_id TEXT NOT NULL,
            cost_per_minute TEXT NOT NULL DEFAULT '0'
        );

        CREATE TABLE IF NOT EXISTS machine_capabilities (
            machine_id TEXT NOT NULL REFERENCES machines(id) ON DELETE CASCADE,
            operation_id TEXT NOT NULL,
            PRIMARY KEY (machine_id, operation_id)
        );

        CREATE TABLE IF NOT EXISTS machine_skill_requirements (
            machine_id TEXT NOT NULL REFERENCES machines(id) ON DELETE CASCADE,
            operation_id TEXT NOT NULL,
            skill_type TEXT NOT NULL,
            minimum_level INTEGER NOT NULL,
            preferred_level INTEGER,
            years_experience_required INTEGER NOT NULL DEFAULT 0,
            required_certifications TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (machine_id, operation_id, skill_type)
        );

        CREATE TABLE IF NOT EXISTS operators (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            zone_id TEXT NOT NULL,
            hourly_rate TEXT NOT NULL DEFAULT '0'
        );

        CREATE TABLE IF NOT EXISTS operator_skills (
            operator_id TEXT NOT NULL REFERENCES operators(id) ON DELETE CASCADE,
            skill_type TEXT NOT NULL,
            level INTEGER NOT NULL,
            years_experience INTEGER NOT NULL DEFAULT 0,
            certifications TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (operator_id, skill_type)
        );

        CREATE TABLE IF NOT EXISTS skills (
            skill_type TEXT PRIMARY KEY,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS production_zones (
            id TEXT PRIMARY KEY,
            zone_code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            wip_limit INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS holiday_calendar (
            holiday_date TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS schedules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            status TEXT NOT NULL,
            job_ids TEXT NOT NULL DEFAULT '[]',
            constraint_violations TEXT NOT NULL DEFAULT '[]',
            makespan_minutes TEXT,
            total_tardiness_minutes TEXT,
            total_cost TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_schedules_status ON schedules(status);

        CREATE TABLE IF NOT EXISTS schedule_assignments (
            schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
            task_id TEXT NOT NULL,
            machine_id TEXT NOT NULL,
            operator_ids TEXT NOT NULL DEFAULT '[]',
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            setup_duration_minutes TEXT NOT NULL,
            processing_duration_minutes TEXT NOT NULL,
            PRIMARY KEY (schedule_id, task_id)
        );
        "#,
    )
    .context("failed to create schema")?;
    Ok(())
}
