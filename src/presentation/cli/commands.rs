//! CLI command implementations.
//!
//! Each command wires a service from the engine configuration: against a
//! SQLite roster when `--db` is given, otherwise against an in-memory
//! demo roster so a request file can be solved with nothing else set up.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::info;

use crate::application::config::EngineConfig;
use crate::application::dto::{SolveRequest, SolveResponse};
use crate::application::services::OptimizationService;
use crate::domain::entities::{AutomationLevel, Machine, Operator, ProductionZone};
use crate::infrastructure::events::{EventBus, EventPublisher};
use crate::infrastructure::import::import_jobs_csv;
use crate::infrastructure::persistence::{schema, SqliteGateway, SqliteJobRepository};
use crate::infrastructure::repositories::InMemoryGateway;
use crate::resilience::{init_global_registry, ResilienceController};
use crate::solver::IncumbentReport;

fn build_service(db: Option<&Path>, config: &EngineConfig) -> Result<OptimizationService> {
    let gateway: Arc<dyn crate::application::services::PersistenceGateway> = match db {
        Some(path) => {
            let conn = schema::open_database(path)?;
            schema::create_schema(&conn)?;
            Arc::new(SqliteGateway::new(conn))
        }
        None => {
            info!("no database given, using the in-memory demo roster");
            Arc::new(demo_gateway()?)
        }
    };
    let registry = init_global_registry(config.breaker);
    let controller = Arc::new(ResilienceController::new(
        config.resilience.clone(),
        registry,
    ));
    let bus = Arc::new(EventBus::new(config.event_history_size));
    Ok(OptimizationService::new(
        gateway,
        controller,
        EventPublisher::new(bus),
    ))
}

/// Three attended universal machines and four operators in one zone.
fn demo_gateway() -> Result<InMemoryGateway> {
    let gateway = InMemoryGateway::new();
    let zone = ProductionZone::new("FLOOR", "Shop floor", 16);
    for index in 1..=3 {
        gateway
            .add_machine(&Machine::new(
                format!("M{index}"),
                format!("Machine {index}"),
                AutomationLevel::Manual,
                zone.id,
            ))
            .map_err(anyhow::Error::new)?;
    }
    for index in 1..=4 {
        gateway
            .add_operator(&Operator::new(
                format!("EMP-{index:03}"),
                format!("Operator {index}"),
                zone.id,
            ))
            .map_err(anyhow::Error::new)?;
    }
    gateway.add_zone(&zone).map_err(anyhow::Error::new)?;
    Ok(gateway)
}

pub struct SolveCommand;

impl SolveCommand {
    pub fn execute(
        request_path: &Path,
        output: Option<&PathBuf>,
        db: Option<&PathBuf>,
        show_progress: bool,
        config: &EngineConfig,
    ) -> Result<()> {
        let raw = std::fs::read_to_string(request_path)
            .with_context(|| format!("failed to read {}", request_path.display()))?;
        let request: SolveRequest =
            serde_json::from_str(&raw).context("invalid solve request JSON")?;
        let service = build_service(db.map(PathBuf::as_path), config)?;

        let (progress_tx, progress_handle) = if show_progress {
            let (tx, rx) = std::sync::mpsc::channel::<IncumbentReport>();
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(StdDuration::from_millis(120));
            bar.set_message("searching...");
            let handle = std::thread::spawn(move || {
                while let Ok(report) = rx.recv() {
                    bar.set_message(format!(
                        "incumbent: objective {} / cost {:.2} ({} tasks, {:.1}s)",
                        report.primary,
                        report.secondary as f64 / 100.0,
                        report.placed,
                        report.elapsed.as_secs_f64(),
                    ));
                }
                bar.finish_and_clear();
            });
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        let runtime = tokio::runtime::Runtime::new()?;
        let response = runtime.block_on(service.optimize_with_progress(request, progress_tx));
        if let Some(handle) = progress_handle {
            let _ = handle.join();
        }

        print_solve_summary(&response);
        let json = serde_json::to_string_pretty(&response)?;
        match output {
            Some(path) => {
                std::fs::write(path, &json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("\nFull response written to {}", path.display());
            }
            None => println!("\n{json}"),
        }
        if response.success {
            Ok(())
        } else {
            anyhow::bail!("solve failed: {}", response.message)
        }
    }
}

fn print_solve_summary(response: &SolveResponse) {
    println!("Problem: {}", response.problem_name);
    println!(
        "Status:  {} ({})",
        response.status.map(|s| s.as_str()).unwrap_or("ERROR"),
        response.message
    );
    if let Some(metrics) = &response.metrics {
        println!(
            "Makespan: {} min | tardiness: {} min | on time: {}/{}",
            metrics.makespan_minutes,
            metrics.total_tardiness_minutes,
            metrics.jobs_on_time,
            metrics.jobs_on_time + metrics.jobs_late,
        );
        println!(
            "Quality: {:.2} | solver: {} | solve time: {:.2}s",
            response.resilience_info.quality_score,
            metrics.solver_status,
            metrics.solve_time_seconds,
        );
    }
    for warning in &response.resilience_info.warnings {
        println!("warning: {warning}");
    }
    if !response.assignments.is_empty() {
        println!("\n{:<10} {:>4}  {:<8} {:<20} {:<20}", "job", "seq", "machine", "start", "end");
        for assignment in &response.assignments {
            println!(
                "{:<10} {:>4}  {:<8} {:<20} {:<20}{}",
                assignment.job_number,
                assignment.sequence_in_job,
                assignment.machine_code,
                assignment.start_time,
                assignment.end_time,
                if assignment.is_critical_path { "  *" } else { "" },
            );
        }
    }
}

pub struct ImportCommand;

impl ImportCommand {
    pub fn execute(input: &Path, db: &Path, _config: &EngineConfig) -> Result<()> {
        let conn = schema::open_database(db)?;
        schema::create_schema(&conn)?;
        let mut repository = SqliteJobRepository::new(&conn);
        let now = chrono::Local::now().naive_local();
        let summary = import_jobs_csv(input, &mut repository, now)?;
        println!(
            "Imported {} jobs ({} tasks), {} rows rejected",
            summary.jobs_created, summary.tasks_created, summary.rows_rejected
        );
        for error in &summary.errors {
            println!("  {error}");
        }
        if summary.jobs_created == 0 && !summary.errors.is_empty() {
            anyhow::bail!("import produced no jobs");
        }
        Ok(())
    }
}

pub struct HealthCommand;

impl HealthCommand {
    pub fn execute(db: Option<&PathBuf>, config: &EngineConfig) -> Result<()> {
        let service = build_service(db.map(PathBuf::as_path), config)?;
        let report = service.health();
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

pub struct InitDbCommand;

impl InitDbCommand {
    pub fn execute(db: &Path) -> Result<()> {
        let conn = schema::open_database(db)?;
        schema::create_schema(&conn)?;
        println!("Schema ready in {}", db.display());
        Ok(())
    }
}
