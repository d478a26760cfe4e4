//! Solution extraction, quality metrics and invariant validation.
//!
//! Whatever path produced a set of placements (exact search or a fallback
//! dispatcher), it is converted here into a [`SolverSolution`]: wall-clock
//! assignments, per-job outcomes, aggregate metrics and the critical-path
//! marking. [`validate_assignments`] re-checks every scheduling invariant
//! against the model and is the backstop the service runs before a
//! schedule may be published.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

use crate::domain::value_objects::{contained_in_windows, JobId, MachineId, OperatorId, TaskId};
use crate::solver::engine::{EngineSolution, TaskPlacement, Termination};
use crate::solver::model::{CpModel, ObjectiveValue};

/// Final classification of one solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolutionStatus {
    Optimal,
    Feasible,
    Infeasible,
    Timeout,
    Memory,
    Crash,
}

impl From<Termination> for SolutionStatus {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Optimal => SolutionStatus::Optimal,
            Termination::Feasible => SolutionStatus::Feasible,
            Termination::Infeasible => SolutionStatus::Infeasible,
            Termination::Timeout => SolutionStatus::Timeout,
            Termination::Memory => SolutionStatus::Memory,
        }
    }
}

impl SolutionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, SolutionStatus::Optimal | SolutionStatus::Feasible)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolutionStatus::Optimal => "OPTIMAL",
            SolutionStatus::Feasible => "FEASIBLE",
            SolutionStatus::Infeasible => "INFEASIBLE",
            SolutionStatus::Timeout => "TIMEOUT",
            SolutionStatus::Memory => "MEMORY",
            SolutionStatus::Crash => "CRASH",
        }
    }
}

/// One task's extracted placement in wall-clock terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvedAssignment {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub sequence_in_job: u16,
    pub machine_id: MachineId,
    pub machine_code: String,
    pub operator_ids: Vec<OperatorId>,
    pub start_minute: i64,
    pub end_minute: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub setup_minutes: i64,
    pub processing_minutes: i64,
    pub is_critical_path: bool,
}

/// Per-job completion summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub job_number: String,
    pub completion_minute: i64,
    pub completion_time: NaiveDateTime,
    pub tardiness_minutes: i64,
    pub on_time: bool,
}

/// Aggregate schedule quality numbers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SolutionMetrics {
    pub makespan_minutes: i64,
    pub total_tardiness_minutes: i64,
    pub total_operator_cost: Decimal,
    pub total_cost: Decimal,
    pub machine_utilization_percent: f64,
    pub operator_utilization_percent: f64,
    pub jobs_on_time: usize,
    pub jobs_late: usize,
    pub critical_path_jobs: Vec<String>,
}

/// Everything a solver run hands back to the orchestration layer.
#[derive(Debug, Clone)]
pub struct SolverSolution {
    pub status: SolutionStatus,
    pub assignments: Vec<SolvedAssignment>,
    /// Index-based placements backing `assignments`, kept so invariants
    /// can be re-checked against the model before persisting.
    pub placements: Vec<TaskPlacement>,
    pub job_outcomes: Vec<JobOutcome>,
    pub metrics: SolutionMetrics,
    pub objective: Option<ObjectiveValue>,
    pub solve_time: StdDuration,
    pub nodes_explored: u64,
}

impl SolverSolution {
    /// An empty result for a non-success termination.
    pub fn empty(status: SolutionStatus, solve_time: StdDuration, nodes: u64) -> Self {
        Self {
            status,
            assignments: Vec::new(),
            placements: Vec::new(),
            job_outcomes: Vec::new(),
            metrics: SolutionMetrics::default(),
            objective: None,
            solve_time,
            nodes_explored: nodes,
        }
    }
}

/// Converts an engine solution into wall-clock assignments plus metrics.
pub fn extract_solution(
    model: &CpModel,
    engine_solution: &EngineSolution,
    status: SolutionStatus,
    solve_time: StdDuration,
    nodes: u64,
) -> SolverSolution {
    let critical = critical_tasks(model);

    let mut assignments: Vec<SolvedAssignment> = engine_solution
        .placements
        .iter()
        .map(|p| {
            let task = &model.tasks[p.task];
            let machine = &model.machines[p.machine];
            SolvedAssignment {
                task_id: task.task_id,
                job_id: model.jobs[task.job].job_id,
                sequence_in_job: task.sequence,
                machine_id: machine.machine_id,
                machine_code: machine.machine_code.clone(),
                operator_ids: p
                    .operators
                    .iter()
                    .map(|&o| model.operators[o].operator_id)
                    .collect(),
                start_minute: p.start,
                end_minute: p.end,
                start_time: model.instant_at(p.start),
                end_time: model.instant_at(p.end),
                setup_minutes: task.setup_minutes,
                processing_minutes: task.processing_minutes,
                is_critical_path: critical[p.task],
            }
        })
        .collect();
    assignments.sort_by_key(|a| (a.start_minute, a.sequence_in_job));

    let job_outcomes = job_outcomes(model, &engine_solution.placements);
    let metrics = compute_metrics(model, &engine_solution.placements, &job_outcomes, &critical);

    SolverSolution {
        status,
        assignments,
        placements: engine_solution.placements.clone(),
        job_outcomes,
        metrics,
        objective: Some(engine_solution.objective),
        solve_time,
        nodes_explored: nodes,
    }
}

fn job_outcomes(model: &CpModel, placements: &[TaskPlacement]) -> Vec<JobOutcome> {
    let mut task_end = vec![None; model.tasks.len()];
    for p in placements {
        task_end[p.task] = Some(p.end);
    }
    model
        .jobs
        .iter()
        .map(|job| {
            let completion = job
                .tasks
                .iter()
                .filter_map(|&t| task_end[t])
                .max()
                .unwrap_or(0);
            let tardiness = (completion - job.due).max(0);
            JobOutcome {
                job_id: job.job_id,
                job_number: job.job_number.clone(),
                completion_minute: completion,
                completion_time: model.instant_at(completion),
                tardiness_minutes: tardiness,
                on_time: tardiness == 0,
            }
        })
        .collect()
}

fn compute_metrics(
    model: &CpModel,
    placements: &[TaskPlacement],
    job_outcomes: &[JobOutcome],
    critical: &[bool],
) -> SolutionMetrics {
    let makespan = placements.iter().map(|p| p.end).max().unwrap_or(0);
    let span_start = placements.iter().map(|p| p.start).min().unwrap_or(0);
    let span = (makespan - span_start).max(1) as f64;

    let mut machine_busy = vec![0i64; model.machines.len()];
    let mut operator_busy = vec![0i64; model.operators.len()];
    let mut operator_cost = Decimal::ZERO;
    let mut machine_cost = Decimal::ZERO;
    for p in placements {
        let minutes = p.end - p.start;
        machine_busy[p.machine] += minutes;
        machine_cost += Decimal::from(minutes * model.machines[p.machine].cost_cents_per_minute)
            / Decimal::from(100);
        for &o in &p.operators {
            operator_busy[o] += minutes;
            operator_cost += Decimal::from(minutes * model.operators[o].cost_cents_per_minute)
                / Decimal::from(100);
        }
    }

    let machine_utilization_percent = if model.machines.is_empty() {
        0.0
    } else {
        machine_busy.iter().map(|&b| b as f64 / span).sum::<f64>()
            / model.machines.len() as f64
            * 100.0
    };
    let operator_utilization_percent = if model.operators.is_empty() {
        0.0
    } else {
        operator_busy.iter().map(|&b| b as f64 / span).sum::<f64>()
            / model.operators.len() as f64
            * 100.0
    };

    let critical_path_jobs: Vec<String> = model
        .jobs
        .iter()
        .filter(|job| job.tasks.iter().any(|&t| critical[t]))
        .map(|job| job.job_number.clone())
        .collect();

    SolutionMetrics {
        makespan_minutes: makespan,
        total_tardiness_minutes: job_outcomes.iter().map(|j| j.tardiness_minutes).sum(),
        total_operator_cost: operator_cost,
        total_cost: operator_cost + machine_cost,
        machine_utilization_percent,
        operator_utilization_percent,
        jobs_on_time: job_outcomes.iter().filter(|j| j.on_time).count(),
        jobs_late: job_outcomes.iter().filter(|j| !j.on_time).count(),
        critical_path_jobs,
    }
}

/// Marks tasks on a resource-free critical path: tasks whose head + tail
/// chain length equals the longest chain in the precedence graph.
pub fn critical_tasks(model: &CpModel) -> Vec<bool> {
    let n = model.tasks.len();
    let mut successors = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for &(p, s) in &model.precedences {
        successors[p].push(s);
        indegree[s] += 1;
    }

    // Forward pass in topological order: longest chain ending at t.
    let mut order = Vec::with_capacity(n);
    let mut queue: Vec<usize> = (0..n).filter(|&t| indegree[t] == 0).collect();
    let mut remaining = indegree.clone();
    while let Some(t) = queue.pop() {
        order.push(t);
        for &s in &successors[t] {
            remaining[s] -= 1;
            if remaining[s] == 0 {
                queue.push(s);
            }
        }
    }

    let mut head = vec![0i64; n];
    for &t in &order {
        let finish = head[t] + model.tasks[t].duration();
        for &s in &successors[t] {
            head[s] = head[s].max(finish);
        }
    }
    let mut tail = vec![0i64; n];
    for &t in order.iter().rev() {
        let own = model.tasks[t].duration();
        let down = successors[t].iter().map(|&s| tail[s]).max().unwrap_or(0);
        tail[t] = own + down;
    }

    let longest = (0..n).map(|t| head[t] + tail[t]).max().unwrap_or(0);
    (0..n).map(|t| head[t] + tail[t] == longest).collect()
}

/// Re-checks every scheduling invariant for a set of placements. Returns
/// human-readable violations; an empty vector means the solution is sound.
pub fn validate_assignments(model: &CpModel, placements: &[TaskPlacement]) -> Vec<String> {
    let mut violations = Vec::new();
    let mut task_placement: Vec<Option<&TaskPlacement>> = vec![None; model.tasks.len()];
    for p in placements {
        task_placement[p.task] = Some(p);
    }

    // Precedence.
    for &(pred, succ) in &model.precedences {
        if let (Some(p), Some(s)) = (task_placement[pred], task_placement[succ]) {
            if p.end > s.start {
                violations.push(format!(
                    "precedence violated: task {} ends at {} after task {} starts at {}",
                    model.tasks[pred].sequence, p.end, model.tasks[succ].sequence, s.start
                ));
            }
        }
    }

    // Machine and operator exclusivity.
    for (i, a) in placements.iter().enumerate() {
        for b in placements.iter().skip(i + 1) {
            let overlap = a.start < b.end && b.start < a.end;
            if !overlap {
                continue;
            }
            if a.machine == b.machine {
                violations.push(format!(
                    "machine {} double-booked in [{}, {}) and [{}, {})",
                    model.machines[a.machine].machine_code, a.start, a.end, b.start, b.end
                ));
            }
            for o in &a.operators {
                if b.operators.contains(o) {
                    violations.push(format!(
                        "operator {} double-booked in [{}, {}) and [{}, {})",
                        model.operators[*o].employee_id, a.start, a.end, b.start, b.end
                    ));
                }
            }
        }
    }

    // Skill coverage and attendance.
    for p in placements {
        let task = &model.tasks[p.task];
        for slot in &task.skill_slots {
            if !p.operators.iter().any(|o| slot.covering_operators.contains(o)) {
                violations.push(format!(
                    "task {} skill slot '{}' not covered by assigned crew",
                    task.sequence, slot.skill_type
                ));
            }
        }
        let mc = task
            .machine_candidates
            .iter()
            .find(|mc| mc.machine == p.machine);
        match mc {
            None => violations.push(format!(
                "task {} assigned to machine {} which is not a candidate",
                task.sequence, model.machines[p.machine].machine_code
            )),
            Some(mc) => {
                if mc.requires_operator && p.operators.is_empty() {
                    violations.push(format!(
                        "task {} runs unattended on machine {} which requires an operator",
                        task.sequence, model.machines[p.machine].machine_code
                    ));
                }
            }
        }
    }

    // Calendar containment.
    for p in placements {
        if !contained_in_windows(&model.calendar_windows, p.start, p.end) {
            violations.push(format!(
                "task {} interval [{}, {}) leaves the working calendar",
                model.tasks[p.task].sequence, p.start, p.end
            ));
        }
    }

    // WIP limits per zone.
    for (zone_idx, zone) in model.zones.iter().enumerate() {
        if zone.wip_limit == u32::MAX {
            continue;
        }
        let mut events: Vec<(i64, i32)> = Vec::new();
        for p in placements {
            if model.machines[p.machine].zone == zone_idx {
                events.push((p.start, 1));
                events.push((p.end, -1));
            }
        }
        events.sort_unstable();
        let mut concurrent = 0i32;
        for &(at, delta) in &events {
            concurrent += delta;
            if concurrent as u32 > zone.wip_limit {
                violations.push(format!(
                    "zone {} exceeds WIP limit {} at minute {at}",
                    zone.zone_code, zone.wip_limit
                ));
                break;
            }
        }
    }

    violations
}
