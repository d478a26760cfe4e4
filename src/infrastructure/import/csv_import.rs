//! CSV job importer.
//!
//! Loads jobs and their tasks from a flat CSV, one row per task, rows
//! grouped by `job_number`. Invalid rows are reported per line and never
//! abort the rest of the import; each job is persisted through the
//! repository only when all of its rows validated.
//!
//! Expected header:
//! `job_number,priority,due_date,quantity,customer_name,part_number,sequence_in_job,duration_minutes,setup_minutes`

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::domain::entities::{Job, Task};
use crate::domain::errors::DomainResult;
use crate::domain::repositories::JobRepository;
use crate::domain::value_objects::{Duration, JobPriority, OperationId};
use crate::infrastructure::persistence::schema::DATETIME_FORMAT;

/// One CSV row: a task inside a job.
#[derive(Debug, Deserialize)]
struct JobTaskRecord {
    job_number: String,
    priority: String,
    due_date: String,
    quantity: u32,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    part_number: Option<String>,
    sequence_in_job: u16,
    duration_minutes: i64,
    #[serde(default)]
    setup_minutes: i64,
}

/// Import result counters.
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub jobs_created: usize,
    pub tasks_created: usize,
    pub rows_rejected: usize,
    pub errors: Vec<String>,
}

/// Imports jobs from a CSV file into the repository.
pub fn import_jobs_csv(
    path: &Path,
    repository: &mut dyn JobRepository,
    now: NaiveDateTime,
) -> Result<ImportSummary> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open CSV file {}", path.display()))?;

    let mut summary = ImportSummary::default();
    let mut grouped: BTreeMap<String, Vec<(usize, JobTaskRecord)>> = BTreeMap::new();
    for (index, record) in reader.deserialize::<JobTaskRecord>().enumerate() {
        let line = index + 2; // header is line 1
        match record {
            Ok(record) => grouped
                .entry(record.job_number.clone())
                .or_default()
                .push((line, record)),
            Err(err) => {
                summary.rows_rejected += 1;
                summary.errors.push(format!("line {line}: {err}"));
            }
        }
    }

    for (job_number, rows) in grouped {
        match build_job(&rows, now) {
            Ok(job) => match repository.save(&job) {
                Ok(()) => {
                    summary.jobs_created += 1;
                    summary.tasks_created += job.task_count();
                }
                Err(err) => {
                    summary.rows_rejected += rows.len();
                    summary
                        .errors
                        .push(format!("job {job_number}: {err}"));
                }
            },
            Err(err) => {
                summary.rows_rejected += rows.len();
                summary.errors.push(format!("job {job_number}: {err}"));
            }
        }
    }

    if summary.errors.is_empty() {
        info!(
            jobs = summary.jobs_created,
            tasks = summary.tasks_created,
            "CSV import complete"
        );
    } else {
        warn!(
            jobs = summary.jobs_created,
            rejected = summary.rows_rejected,
            "CSV import finished with errors"
        );
    }
    Ok(summary)
}

fn build_job(rows: &[(usize, JobTaskRecord)], now: NaiveDateTime) -> DomainResult<Job> {
    let (_, first) = &rows[0];
    let priority: JobPriority = first.priority.parse()?;
    let due_date = NaiveDateTime::parse_from_str(&first.due_date, DATETIME_FORMAT)
        .map_err(|e| {
            crate::domain::errors::SchedulingError::validation(
                "due_date",
                format!("invalid due date '{}': {e}", first.due_date),
            )
        })?;
    let mut job = Job::create(
        first.job_number.clone(),
        first.quantity,
        priority,
        due_date,
        None,
        now,
    )?;
    job.set_customer_name(first.customer_name.clone());
    job.set_part_number(first.part_number.clone());

    for (_, row) in rows {
        let task = Task::new(
            job.id(),
            OperationId::new(),
            row.sequence_in_job,
            Duration::from_minutes_i64(row.duration_minutes)?,
            Duration::from_minutes_i64(row.setup_minutes)?,
        )?;
        job.add_task(task)?;
    }
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::in_memory::InMemoryJobRepository;
    use std::io::Write;

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn write_csv(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("shopweaver-import-{}.csv", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const HEADER: &str = "job_number,priority,due_date,quantity,customer_name,part_number,sequence_in_job,duration_minutes,setup_minutes";

    #[test]
    fn test_import_groups_rows_into_jobs() {
        let path = write_csv(&format!(
            "{HEADER}\n\
             JOB001,NORMAL,2026-08-05T08:00:00,1,ACME,P-100,10,60,10\n\
             JOB001,NORMAL,2026-08-05T08:00:00,1,ACME,P-100,20,30,0\n\
             JOB002,URGENT,2026-08-04T08:00:00,2,,,10,45,5\n"
        ));
        let mut repo = InMemoryJobRepository::new();
        let summary = import_jobs_csv(&path, &mut repo, now()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary.jobs_created, 2);
        assert_eq!(summary.tasks_created, 3);
        assert!(summary.errors.is_empty());

        let job = repo.get_by_job_number("JOB001").unwrap().unwrap();
        assert_eq!(job.task_count(), 2);
        assert_eq!(job.customer_name(), Some("ACME"));
        let urgent = repo.get_by_job_number("JOB002").unwrap().unwrap();
        assert_eq!(urgent.priority(), JobPriority::Urgent);
    }

    #[test]
    fn test_bad_rows_reported_not_fatal() {
        let path = write_csv(&format!(
            "{HEADER}\n\
             JOB001,NORMAL,2026-08-05T08:00:00,1,,,10,60,0\n\
             JOB002,NOT_A_PRIORITY,2026-08-05T08:00:00,1,,,10,60,0\n\
             JOB003,NORMAL,not-a-date,1,,,10,60,0\n"
        ));
        let mut repo = InMemoryJobRepository::new();
        let summary = import_jobs_csv(&path, &mut repo, now()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary.jobs_created, 1);
        assert_eq!(summary.errors.len(), 2);
        assert!(repo.get_by_job_number("JOB002").unwrap().is_none());
    }

    #[test]
    fn test_repository_failure_reported_per_job() {
        use crate::domain::repositories::MockJobRepository;

        let path = write_csv(&format!(
            "{HEADER}\n\
             JOB001,NORMAL,2026-08-05T08:00:00,1,,,10,60,0\n"
        ));
        let mut repo = MockJobRepository::new();
        repo.expect_save().returning(|_| {
            Err(crate::domain::errors::SchedulingError::database(
                "disk full",
                false,
            ))
        });
        let summary = import_jobs_csv(&path, &mut repo, now()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary.jobs_created, 0);
        assert_eq!(summary.rows_rejected, 1);
        assert!(summary.errors[0].contains("disk full"));
    }

    #[test]
    fn test_duplicate_sequence_rejects_job() {
        let path = write_csv(&format!(
            "{HEADER}\n\
             JOB001,NORMAL,2026-08-05T08:00:00,1,,,10,60,0\n\
             JOB001,NORMAL,2026-08-05T08:00:00,1,,,10,30,0\n"
        ));
        let mut repo = InMemoryJobRepository::new();
        let summary = import_jobs_csv(&path, &mut repo, now()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary.jobs_created, 0);
        assert_eq!(summary.rows_rejected, 2);
        assert!(summary.errors[0].contains("sequence"));
    }
}
