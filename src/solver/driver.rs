//! Solver driver: runs the engine under wall-time, worker and memory caps.
//!
//! The driver is the only place engine panics are allowed to surface; they
//! are caught and classified as `Crash` so the resilience layer can treat
//! them as transient. Whenever the engine holds an incumbent — even on a
//! memory abort — the driver extracts it, leaving the use-or-discard
//! decision to the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{error, info};

use crate::solver::engine::{search, IncumbentReport, SearchParams};
use crate::solver::model::CpModel;
use crate::solver::solution::{extract_solution, SolutionStatus, SolverSolution};

/// Engine execution caps.
#[derive(Debug, Clone)]
pub struct SolverParameters {
    pub max_time: StdDuration,
    pub num_workers: usize,
    pub memory_limit_mb: u64,
    /// Seed for the portfolio tie-break shuffles; `None` = deterministic
    /// worker-index seeding only.
    pub random_seed: Option<u64>,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            max_time: StdDuration::from_secs(60),
            num_workers: 4,
            memory_limit_mb: 1024,
            random_seed: None,
        }
    }
}

/// Stateless facade over the search engine.
pub struct SolverDriver;

impl SolverDriver {
    /// Runs one solve. Never panics; engine panics become `Crash`.
    ///
    /// `cancel` is the cooperative stop flag: setting it makes the engine
    /// surrender at the next node-limit poll.
    pub fn solve(
        model: &CpModel,
        params: &SolverParameters,
        progress: Option<Sender<IncumbentReport>>,
        cancel: Arc<AtomicBool>,
    ) -> SolverSolution {
        let started = Instant::now();
        let search_params = SearchParams {
            max_time: params.max_time,
            num_workers: params.num_workers,
            memory_limit_mb: params.memory_limit_mb,
            seed: params.random_seed.unwrap_or(0),
            cancel,
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            search(model, &search_params, progress)
        })) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic);
                error!(message = %message, "solver engine crashed");
                return SolverSolution::empty(
                    SolutionStatus::Crash,
                    started.elapsed(),
                    0,
                );
            }
        };

        let status = SolutionStatus::from(outcome.termination);
        info!(
            status = status.as_str(),
            nodes = outcome.nodes,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            has_solution = outcome.best.is_some(),
            "solver run finished"
        );
        match outcome.best {
            Some(best) => extract_solution(model, &best, status, outcome.elapsed, outcome.nodes),
            None => SolverSolution::empty(status, outcome.elapsed, outcome.nodes),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
