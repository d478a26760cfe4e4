//! The optimization core: model building, exact search, extraction and
//! fallback dispatching.
//!
//! Flow: a [`SchedulingProblem`] snapshot is translated by [`ModelBuilder`]
//! into a [`CpModel`]; [`SolverDriver`] runs the branch-and-bound
//! [`engine`] under caps and extracts a [`SolverSolution`]; when the exact
//! path fails, [`fallback`] dispatchers produce a valid schedule of lower
//! quality. The resilience layer orchestrates which of these actually runs.

pub mod builder;
pub mod driver;
pub mod engine;
pub mod fallback;
pub mod model;
pub mod solution;

pub use builder::{ModelBuilder, SchedulingProblem};
pub use driver::{SolverDriver, SolverParameters};
pub use engine::{EngineSolution, IncumbentReport, TaskPlacement, Termination};
pub use fallback::{
    run_fallback, FallbackStrategy, QUALITY_FEASIBLE, QUALITY_OPTIMAL, QUALITY_PARTIAL,
};
pub use model::{CpModel, ObjectiveSpec, ObjectiveValue};
pub use solution::{
    critical_tasks, extract_solution, validate_assignments, JobOutcome, SolutionMetrics,
    SolutionStatus, SolvedAssignment, SolverSolution,
};
