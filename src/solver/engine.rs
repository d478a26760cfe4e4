//! Internal CP search engine.
//!
//! A deterministic branch-and-bound over semi-active schedules: depth-first
//! search branching on (next ready task, machine candidate, qualified crew),
//! placing every task at its earliest feasible start under precedence,
//! resource no-overlap, calendar and WIP constraints. For the regular
//! objectives used here (makespan, weighted tardiness) an optimal solution
//! always exists among semi-active schedules, so exhausting the search
//! space proves optimality.
//!
//! `num_workers > 1` runs a portfolio of identical searches whose ready-task
//! ordering is perturbed by a seeded RNG; workers share the incumbent and a
//! stop flag.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, trace};

use crate::domain::value_objects::earliest_fit;
use crate::solver::model::{CpModel, MachineCandidate, ObjectiveValue, TaskVar};

/// Upper bound on distinct crews enumerated per (task, machine) branch.
const MAX_CREWS_PER_CANDIDATE: usize = 32;
/// How often (in nodes) each worker polls its limits.
const LIMIT_CHECK_INTERVAL: u64 = 256;

/// One task fixed on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPlacement {
    pub task: usize,
    pub machine: usize,
    pub operators: Vec<usize>,
    pub start: i64,
    pub end: i64,
}

/// A complete assignment with its objective.
#[derive(Debug, Clone)]
pub struct EngineSolution {
    pub placements: Vec<TaskPlacement>,
    pub objective: ObjectiveValue,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Search space exhausted; the incumbent is optimal.
    Optimal,
    /// Stopped early with an incumbent in hand.
    Feasible,
    /// No placement of all tasks exists.
    Infeasible,
    /// Stopped early with nothing to show.
    Timeout,
    /// Memory budget exceeded.
    Memory,
}

/// Streamed on every improving incumbent. Carries the full placement set
/// so the caller can salvage the best partial after a hard abort.
#[derive(Debug, Clone)]
pub struct IncumbentReport {
    pub primary: i64,
    pub secondary: i64,
    pub placed: usize,
    pub elapsed: StdDuration,
    pub placements: Vec<TaskPlacement>,
}

/// Search limits and knobs.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub max_time: StdDuration,
    pub num_workers: usize,
    pub memory_limit_mb: u64,
    pub seed: u64,
    /// Cooperative external stop (controller timeout / user cancel).
    pub cancel: Arc<AtomicBool>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_time: StdDuration::from_secs(60),
            num_workers: 1,
            memory_limit_mb: 1024,
            seed: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Search result.
#[derive(Debug)]
pub struct SearchOutcome {
    pub termination: Termination,
    pub best: Option<EngineSolution>,
    pub nodes: u64,
    pub elapsed: StdDuration,
}

/// Mutable timetable used by both the exact search and the fallback
/// dispatchers: busy intervals per machine/operator/zone plus placements.
pub(crate) struct ScheduleState<'m> {
    model: &'m CpModel,
    pub respect_calendar: bool,
    pub respect_wip: bool,
    machine_busy: Vec<Vec<(i64, i64)>>,
    operator_busy: Vec<Vec<(i64, i64)>>,
    zone_busy: Vec<Vec<(i64, i64)>>,
    task_end: Vec<Option<i64>>,
    predecessors: Vec<Vec<usize>>,
    pub placements: Vec<TaskPlacement>,
}

pub(crate) struct PlacementUndo {
    task: usize,
    machine: usize,
    zone: usize,
}

impl<'m> ScheduleState<'m> {
    pub fn new(model: &'m CpModel) -> Self {
        let mut predecessors = vec![Vec::new(); model.tasks.len()];
        for &(p, s) in &model.precedences {
            predecessors[s].push(p);
        }
        Self {
            model,
            respect_calendar: true,
            respect_wip: true,
            machine_busy: vec![Vec::new(); model.machines.len()],
            operator_busy: vec![Vec::new(); model.operators.len()],
            zone_busy: vec![Vec::new(); model.zones.len()],
            task_end: vec![None; model.tasks.len()],
            predecessors,
            placements: Vec::with_capacity(model.tasks.len()),
        }
    }

    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    /// Tasks whose predecessors are all placed and which are not placed
    /// themselves.
    pub fn ready_tasks(&self) -> Vec<usize> {
        (0..self.model.tasks.len())
            .filter(|&t| {
                self.task_end[t].is_none()
                    && self.predecessors[t].iter().all(|&p| self.task_end[p].is_some())
            })
            .collect()
    }

    /// Earliest minute the task may begin: its release pushed past every
    /// placed predecessor.
    pub fn release_of(&self, task: usize) -> i64 {
        let mut release = self.model.tasks[task].release;
        for &p in &self.predecessors[task] {
            if let Some(end) = self.task_end[p] {
                release = release.max(end);
            }
        }
        release
    }

    fn overlap_advance(busy: &[(i64, i64)], start: i64, end: i64) -> Option<i64> {
        busy.iter()
            .filter(|&&(s, e)| s < end && start < e)
            .map(|&(_, e)| e)
            .min()
    }

    /// When the zone is saturated somewhere in `[start, end)`, the earliest
    /// minute worth retrying; `None` when the interval is admissible.
    fn wip_advance(&self, zone: usize, start: i64, end: i64) -> Option<i64> {
        let limit = self.model.zones[zone].wip_limit;
        if limit == u32::MAX {
            return None;
        }
        let overlapping: Vec<(i64, i64)> = self.zone_busy[zone]
            .iter()
            .copied()
            .filter(|&(s, e)| s < end && start < e)
            .collect();
        if (overlapping.len() as u32) < limit {
            return None;
        }
        // Sweep concurrency inside the candidate interval.
        let mut events: Vec<(i64, i32)> = Vec::with_capacity(overlapping.len() * 2);
        for &(s, e) in &overlapping {
            events.push((s.max(start), 1));
            events.push((e.min(end), -1));
        }
        events.sort_unstable();
        let mut concurrent = 0i32;
        for &(_, delta) in &events {
            concurrent += delta;
            if concurrent as u32 >= limit {
                return overlapping.iter().map(|&(_, e)| e).filter(|&e| e > start).min();
            }
        }
        None
    }

    /// Earliest feasible start for `(task, machine, crew)`, or `None` when
    /// no start fits inside the horizon.
    pub fn earliest_start(&self, task: usize, machine: usize, crew: &[usize]) -> Option<i64> {
        let duration = self.model.tasks[task].duration();
        let mut t = self.release_of(task);
        loop {
            if self.respect_calendar {
                t = earliest_fit(&self.model.calendar_windows, t, duration)?;
            }
            if t + duration > self.model.horizon {
                return None;
            }
            let end = t + duration;

            let mut advance: Option<i64> = Self::overlap_advance(&self.machine_busy[machine], t, end);
            for &o in crew {
                let candidate = Self::overlap_advance(&self.operator_busy[o], t, end);
                advance = match (advance, candidate) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
            if advance.is_none() && self.respect_wip {
                let zone = self.model.machines[machine].zone;
                advance = self.wip_advance(zone, t, end);
            }
            match advance {
                Some(next) if next > t => t = next,
                Some(_) => return None, // should not happen; busy ends precede starts
                None => return Some(t),
            }
        }
    }

    pub fn place(
        &mut self,
        task: usize,
        machine: usize,
        crew: Vec<usize>,
        start: i64,
    ) -> PlacementUndo {
        let end = start + self.model.tasks[task].duration();
        let zone = self.model.machines[machine].zone;
        self.machine_busy[machine].push((start, end));
        for &o in &crew {
            self.operator_busy[o].push((start, end));
        }
        self.zone_busy[zone].push((start, end));
        self.task_end[task] = Some(end);
        self.placements.push(TaskPlacement {
            task,
            machine,
            operators: crew,
            start,
            end,
        });
        PlacementUndo { task, machine, zone }
    }

    /// Reverses the most recent [`place`](Self::place). Placements follow
    /// strict LIFO discipline during search.
    pub fn unplace(&mut self, undo: PlacementUndo) {
        let placement = self.placements.pop().expect("unplace without place");
        debug_assert_eq!(placement.task, undo.task);
        self.machine_busy[undo.machine].pop();
        for &o in &placement.operators {
            self.operator_busy[o].pop();
        }
        self.zone_busy[undo.zone].pop();
        self.task_end[undo.task] = None;
    }

    /// Objective of the complete assignment.
    pub fn objective(&self) -> ObjectiveValue {
        let model = self.model;
        let makespan = self.placements.iter().map(|p| p.end).max().unwrap_or(0);
        let mut tardiness_weighted = 0i64;
        for job in &model.jobs {
            let job_end = job
                .tasks
                .iter()
                .filter_map(|&t| self.task_end[t])
                .max()
                .unwrap_or(0);
            let tardiness = (job_end - job.due).max(0);
            tardiness_weighted += tardiness * job.priority_weight;
        }
        let primary = model.objective.makespan_weight * makespan
            + model.objective.tardiness_weight * tardiness_weighted;

        let mut secondary = 0i64;
        for p in &self.placements {
            let minutes = p.end - p.start;
            secondary += minutes * model.machines[p.machine].cost_cents_per_minute;
            for &o in &p.operators {
                secondary += minutes * model.operators[o].cost_cents_per_minute;
            }
        }
        ObjectiveValue { primary, secondary }
    }

    /// Resource-free lower bound on the primary objective for the current
    /// partial assignment: walks every job chain assuming unplaced tasks
    /// run back to back from their release.
    pub fn lower_bound_primary(&self) -> i64 {
        let model = self.model;
        let mut makespan_lb = self.placements.iter().map(|p| p.end).max().unwrap_or(0);
        let mut tardiness_lb = 0i64;
        for job in &model.jobs {
            let mut chain_end = 0i64;
            for &t in &job.tasks {
                chain_end = match self.task_end[t] {
                    Some(end) => chain_end.max(end),
                    None => chain_end.max(model.tasks[t].release) + model.tasks[t].duration(),
                };
            }
            makespan_lb = makespan_lb.max(chain_end);
            tardiness_lb += (chain_end - job.due).max(0) * job.priority_weight;
        }
        model.objective.makespan_weight * makespan_lb
            + model.objective.tardiness_weight * tardiness_lb
    }

    /// Approximate live footprint, polled by the memory guard.
    pub fn live_bytes(&self) -> u64 {
        let intervals: usize = self.machine_busy.iter().map(Vec::len).sum::<usize>()
            + self.operator_busy.iter().map(Vec::len).sum::<usize>()
            + self.zone_busy.iter().map(Vec::len).sum::<usize>();
        (intervals * 16 + self.placements.len() * 96 + self.task_end.len() * 16) as u64
    }
}

/// Enumerates qualified crews for a `(task, machine)` branch: the cartesian
/// product of slot coverers, deduplicated as sets and capped.
pub(crate) fn crew_options(model: &CpModel, task: &TaskVar, mc: &MachineCandidate) -> Vec<Vec<usize>> {
    if task.skill_slots.is_empty() {
        if mc.requires_operator {
            return task.eligible_operators.iter().map(|&o| vec![o]).collect();
        }
        return vec![Vec::new()];
    }
    let mut crews: Vec<Vec<usize>> = vec![Vec::new()];
    for slot in &task.skill_slots {
        let mut expanded = Vec::new();
        for crew in &crews {
            for &o in &slot.covering_operators {
                let mut next = crew.clone();
                if !next.contains(&o) {
                    next.push(o);
                }
                next.sort_unstable();
                expanded.push(next);
            }
            if expanded.len() > MAX_CREWS_PER_CANDIDATE * 4 {
                break;
            }
        }
        expanded.sort();
        expanded.dedup();
        crews = expanded;
        if crews.is_empty() {
            return Vec::new();
        }
    }
    // Prefer small, cheap crews first.
    crews.sort_by_key(|crew| {
        let cost: i64 = crew
            .iter()
            .map(|&o| model.operators[o].cost_cents_per_minute)
            .sum();
        (crew.len(), cost)
    });
    crews.truncate(MAX_CREWS_PER_CANDIDATE);
    crews
}

struct Shared {
    best: Mutex<Option<EngineSolution>>,
    best_primary: AtomicI64,
    nodes: AtomicU64,
    stop: AtomicBool,
    progress: Option<Mutex<Sender<IncumbentReport>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Deadline,
    Cancelled,
    Memory,
}

struct Worker<'m> {
    model: &'m CpModel,
    shared: &'m Shared,
    params: &'m SearchParams,
    state: ScheduleState<'m>,
    crews: Vec<Vec<Vec<Vec<usize>>>>,
    rng: StdRng,
    jitter: bool,
    started: Instant,
    deadline: Instant,
    local_nodes: u64,
}

impl<'m> Worker<'m> {
    fn new(
        model: &'m CpModel,
        shared: &'m Shared,
        params: &'m SearchParams,
        worker_index: usize,
        started: Instant,
    ) -> Self {
        let crews = model
            .tasks
            .iter()
            .map(|task| {
                task.machine_candidates
                    .iter()
                    .map(|mc| crew_options(model, task, mc))
                    .collect()
            })
            .collect();
        Self {
            model,
            shared,
            params,
            state: ScheduleState::new(model),
            crews,
            rng: StdRng::seed_from_u64(params.seed.wrapping_add(worker_index as u64)),
            jitter: worker_index > 0,
            started,
            deadline: started + params.max_time,
            local_nodes: 0,
        }
    }

    fn check_limits(&mut self) -> Result<(), Interrupt> {
        if self.params.cancel.load(Ordering::Relaxed) {
            self.shared.stop.store(true, Ordering::Relaxed);
            return Err(Interrupt::Cancelled);
        }
        if self.shared.stop.load(Ordering::Relaxed) {
            return Err(Interrupt::Deadline);
        }
        if Instant::now() >= self.deadline {
            self.shared.stop.store(true, Ordering::Relaxed);
            return Err(Interrupt::Deadline);
        }
        let live_mb = (self.state.live_bytes() * self.params.num_workers as u64
            + self.model.estimated_memory_bytes())
            / (1024 * 1024);
        if live_mb > self.params.memory_limit_mb {
            self.shared.stop.store(true, Ordering::Relaxed);
            return Err(Interrupt::Memory);
        }
        Ok(())
    }

    fn offer_incumbent(&self) {
        let solution = EngineSolution {
            placements: self.state.placements.clone(),
            objective: self.state.objective(),
        };
        let mut guard = self.shared.best.lock().expect("incumbent lock poisoned");
        let improves = match guard.as_ref() {
            None => true,
            Some(current) => solution
                .objective
                .better_than(&current.objective, &self.model.objective),
        };
        if improves {
            self.shared
                .best_primary
                .store(solution.objective.primary, Ordering::Relaxed);
            trace!(
                primary = solution.objective.primary,
                secondary = solution.objective.secondary,
                "new incumbent"
            );
            if let Some(progress) = &self.shared.progress {
                let report = IncumbentReport {
                    primary: solution.objective.primary,
                    secondary: solution.objective.secondary,
                    placed: solution.placements.len(),
                    elapsed: self.started.elapsed(),
                    placements: solution.placements.clone(),
                };
                if let Ok(sender) = progress.lock() {
                    let _ = sender.send(report);
                }
            }
            *guard = Some(solution);
        }
    }

    fn order_ready(&mut self, ready: &mut [usize]) {
        let model = self.model;
        let state = &self.state;
        let mut keys: Vec<(usize, (i64, i64, u16, u32))> = ready
            .iter()
            .map(|&t| {
                let task = &model.tasks[t];
                let job = &model.jobs[task.job];
                let slack = job.due - (state.release_of(t) + task.duration());
                (t, (-job.priority_weight, slack, task.sequence, 0))
            })
            .collect();
        if self.jitter {
            for key in &mut keys {
                key.1 .3 = self.rng.random_range(0..1024u32);
            }
        }
        keys.sort_by_key(|&(_, key)| key);
        for (slot, (t, _)) in ready.iter_mut().zip(keys) {
            *slot = t;
        }
    }

    fn dfs(&mut self) -> Result<(), Interrupt> {
        self.local_nodes += 1;
        if self.local_nodes % LIMIT_CHECK_INTERVAL == 0 {
            self.shared
                .nodes
                .fetch_add(LIMIT_CHECK_INTERVAL, Ordering::Relaxed);
            self.check_limits()?;
        }

        if self.state.placed_count() == self.model.tasks.len() {
            self.offer_incumbent();
            return Ok(());
        }

        // Bound: keep exploring only while the partial can still beat (or
        // tie within the cost band) the incumbent primary.
        let best_primary = self.shared.best_primary.load(Ordering::Relaxed);
        if best_primary != i64::MAX {
            let band =
                (self.model.objective.cost_tolerance * best_primary as f64).abs() as i64;
            if self.state.lower_bound_primary() > best_primary + band {
                return Ok(());
            }
        }

        let mut ready = self.state.ready_tasks();
        self.order_ready(&mut ready);
        for task in ready {
            let candidate_count = self.model.tasks[task].machine_candidates.len();
            for mc_idx in 0..candidate_count {
                let machine = self.model.tasks[task].machine_candidates[mc_idx].machine;
                let crew_count = self.crews[task][mc_idx].len();
                for crew_idx in 0..crew_count {
                    let crew = self.crews[task][mc_idx][crew_idx].clone();
                    if let Some(start) = self.state.earliest_start(task, machine, &crew) {
                        let undo = self.state.place(task, machine, crew, start);
                        let result = self.dfs();
                        self.state.unplace(undo);
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the worker to exhaustion or interrupt. `Ok(())` means the full
    /// space was covered.
    fn run(&mut self) -> Result<(), Interrupt> {
        self.check_limits()?;
        let result = self.dfs();
        self.shared
            .nodes
            .fetch_add(self.local_nodes % LIMIT_CHECK_INTERVAL, Ordering::Relaxed);
        result
    }
}

/// Runs the branch-and-bound under the given limits.
pub fn search(
    model: &CpModel,
    params: &SearchParams,
    progress: Option<Sender<IncumbentReport>>,
) -> SearchOutcome {
    let started = Instant::now();

    if let Some(reason) = model.structural_infeasibility() {
        debug!(reason = %reason, "model structurally infeasible");
        return SearchOutcome {
            termination: Termination::Infeasible,
            best: None,
            nodes: 0,
            elapsed: started.elapsed(),
        };
    }
    if model.tasks.is_empty() {
        return SearchOutcome {
            termination: Termination::Optimal,
            best: Some(EngineSolution {
                placements: Vec::new(),
                objective: ObjectiveValue {
                    primary: 0,
                    secondary: 0,
                },
            }),
            nodes: 0,
            elapsed: started.elapsed(),
        };
    }

    let shared = Shared {
        best: Mutex::new(None),
        best_primary: AtomicI64::new(i64::MAX),
        nodes: AtomicU64::new(0),
        stop: AtomicBool::new(false),
        progress: progress.map(Mutex::new),
    };

    let workers = params.num_workers.clamp(1, 8);
    let results: Vec<Result<(), Interrupt>> = if workers == 1 {
        vec![Worker::new(model, &shared, params, 0, started).run()]
    } else {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    let shared = &shared;
                    scope.spawn(move || Worker::new(model, shared, params, w, started).run())
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("worker panicked")).collect()
        })
    };

    let best = shared.best.into_inner().expect("incumbent lock poisoned");
    let nodes = shared.nodes.load(Ordering::Relaxed);
    let exhausted = results.iter().any(|r| r.is_ok());
    let memory_hit = results
        .iter()
        .any(|r| matches!(r, Err(Interrupt::Memory)));

    let termination = if exhausted {
        if best.is_some() {
            Termination::Optimal
        } else {
            Termination::Infeasible
        }
    } else if memory_hit {
        Termination::Memory
    } else if best.is_some() {
        Termination::Feasible
    } else {
        Termination::Timeout
    };

    debug!(
        ?termination,
        nodes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search finished"
    );
    SearchOutcome {
        termination,
        best,
        nodes,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{JobId, MachineId, OperationId, OperatorId, TaskId, ZoneId};
    use crate::solver::model::{
        JobVar, MachineSlot, ObjectiveSpec, OperatorSlot, ZoneSlot,
    };

    fn t0() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    /// Compact model builder for engine tests: `jobs[j] = (due, weight,
    /// Vec<(setup, processing)>)`, every task runnable on every machine by
    /// any single operator.
    fn build_model(
        jobs: Vec<(i64, i64, Vec<(i64, i64)>)>,
        machine_count: usize,
        operator_count: usize,
        horizon: i64,
    ) -> CpModel {
        let zone = ZoneSlot {
            zone_id: ZoneId::new(),
            zone_code: "Z".into(),
            wip_limit: u32::MAX,
        };
        let machines: Vec<MachineSlot> = (0..machine_count)
            .map(|i| MachineSlot {
                machine_id: MachineId::new(),
                machine_code: format!("M{i}"),
                zone: 0,
                cost_cents_per_minute: 10,
            })
            .collect();
        let operators: Vec<OperatorSlot> = (0..operator_count)
            .map(|i| OperatorSlot {
                operator_id: OperatorId::new(),
                employee_id: format!("O{i}"),
                cost_cents_per_minute: 50,
                effectiveness_permille: 1000,
            })
            .collect();

        let mut tasks = Vec::new();
        let mut job_vars = Vec::new();
        let mut precedences = Vec::new();
        for (job_idx, (due, weight, specs)) in jobs.into_iter().enumerate() {
            let mut job_var = JobVar {
                job_id: JobId::new(),
                job_number: format!("JOB{job_idx}"),
                priority_weight: weight,
                due,
                tasks: Vec::new(),
            };
            for (i, (setup, processing)) in specs.into_iter().enumerate() {
                let idx = tasks.len();
                if let Some(&prev) = job_var.tasks.last() {
                    precedences.push((prev, idx));
                }
                job_var.tasks.push(idx);
                tasks.push(TaskVar {
                    task_id: TaskId::new(),
                    job: job_idx,
                    sequence: ((i + 1) * 10) as u16,
                    operation_id: OperationId::new(),
                    setup_minutes: setup,
                    processing_minutes: processing,
                    release: 0,
                    machine_candidates: (0..machine_count)
                        .map(|m| MachineCandidate {
                            machine: m,
                            requires_operator: operator_count > 0,
                        })
                        .collect(),
                    skill_slots: Vec::new(),
                    eligible_operators: (0..operator_count).collect(),
                });
            }
            job_vars.push(job_var);
        }

        CpModel {
            name: "engine-test".into(),
            t0: t0(),
            horizon,
            tasks,
            jobs: job_vars,
            machines,
            operators,
            zones: vec![zone],
            precedences,
            calendar_windows: vec![(0, horizon)],
            objective: ObjectiveSpec::default(),
        }
    }

    fn run(model: &CpModel) -> SearchOutcome {
        search(model, &SearchParams::default(), None)
    }

    #[test]
    fn test_single_task_optimal_makespan() {
        // One 60+10 task, one machine, one operator: optimal makespan 70.
        let model = build_model(vec![(48 * 60, 2, vec![(10, 60)])], 1, 1, 14 * 24 * 60);
        let outcome = run(&model);
        assert_eq!(outcome.termination, Termination::Optimal);
        let best = outcome.best.unwrap();
        assert_eq!(best.placements.len(), 1);
        assert_eq!(best.placements[0].start, 0);
        assert_eq!(best.placements[0].end, 70);
        assert_eq!(best.objective.primary, 70); // no tardiness
    }

    #[test]
    fn test_precedence_chain_makespan() {
        // Tasks 10,20,30 of 60 min each, one machine, two operators.
        let model = build_model(
            vec![(48 * 60, 2, vec![(0, 60), (0, 60), (0, 60)])],
            1,
            2,
            14 * 24 * 60,
        );
        let outcome = run(&model);
        assert_eq!(outcome.termination, Termination::Optimal);
        let best = outcome.best.unwrap();
        let mut placements = best.placements.clone();
        placements.sort_by_key(|p| p.start);
        assert_eq!(placements[0].start, 0);
        assert_eq!(placements[1].start, 60);
        assert_eq!(placements[2].start, 120);
        assert_eq!(best.objective.primary, 180);
    }

    #[test]
    fn test_machine_contention_serializes() {
        // Two single-task jobs on one machine: one at 0, one at 60.
        let model = build_model(
            vec![(24 * 60, 2, vec![(0, 60)]), (24 * 60, 2, vec![(0, 60)])],
            1,
            2,
            14 * 24 * 60,
        );
        let outcome = run(&model);
        assert_eq!(outcome.termination, Termination::Optimal);
        let best = outcome.best.unwrap();
        let mut starts: Vec<i64> = best.placements.iter().map(|p| p.start).collect();
        starts.sort_unstable();
        assert_eq!(starts, vec![0, 60]);
        assert_eq!(best.objective.primary, 120);
    }

    #[test]
    fn test_urgent_job_scheduled_first() {
        // URGENT (weight 10) due in 30 min vs NORMAL due in 24h, shared
        // machine. Placing the urgent job first gives tardiness 30 on it
        // and zero on the normal one.
        let model = build_model(
            vec![(30, 10, vec![(0, 60)]), (24 * 60, 2, vec![(0, 60)])],
            1,
            2,
            14 * 24 * 60,
        );
        let outcome = run(&model);
        assert_eq!(outcome.termination, Termination::Optimal);
        let best = outcome.best.unwrap();
        let urgent = best.placements.iter().find(|p| p.task == 0).unwrap();
        let normal = best.placements.iter().find(|p| p.task == 1).unwrap();
        assert_eq!(urgent.start, 0);
        assert_eq!(normal.start, 60);
        // makespan 120 + 10 * (30 tardiness * weight 10)
        assert_eq!(best.objective.primary, 120 + 10 * 300);
    }

    #[test]
    fn test_no_overlap_per_operator() {
        // Two independent tasks, two machines, ONE operator: the operator
        // forces serialization even though machines are free.
        let model = build_model(
            vec![(24 * 60, 2, vec![(0, 60)]), (24 * 60, 2, vec![(0, 60)])],
            2,
            1,
            14 * 24 * 60,
        );
        let outcome = run(&model);
        let best = outcome.best.unwrap();
        let mut starts: Vec<i64> = best.placements.iter().map(|p| p.start).collect();
        starts.sort_unstable();
        assert_eq!(starts, vec![0, 60]);
    }

    #[test]
    fn test_wip_limit_serializes_zone() {
        let mut model = build_model(
            vec![(24 * 60, 2, vec![(0, 60)]), (24 * 60, 2, vec![(0, 60)])],
            2,
            2,
            14 * 24 * 60,
        );
        model.zones[0].wip_limit = 1;
        let outcome = run(&model);
        let best = outcome.best.unwrap();
        let mut starts: Vec<i64> = best.placements.iter().map(|p| p.start).collect();
        starts.sort_unstable();
        assert_eq!(starts, vec![0, 60]);
    }

    #[test]
    fn test_calendar_containment() {
        // Working windows 0-100 and 200-400; a 150-minute task only fits
        // in the second window.
        let mut model = build_model(vec![(24 * 60, 2, vec![(0, 150)])], 1, 1, 14 * 24 * 60);
        model.calendar_windows = vec![(0, 100), (200, 400)];
        let outcome = run(&model);
        let best = outcome.best.unwrap();
        assert_eq!(best.placements[0].start, 200);
        assert_eq!(best.placements[0].end, 350);
    }

    #[test]
    fn test_infeasible_when_nothing_fits() {
        // 100-minute task, horizon 50.
        let model = build_model(vec![(24 * 60, 2, vec![(0, 100)])], 1, 1, 50);
        let outcome = run(&model);
        assert_eq!(outcome.termination, Termination::Infeasible);
        assert!(outcome.best.is_none());
    }

    #[test]
    fn test_timeout_classification() {
        // 12 independent jobs; zero time budget forces an immediate stop.
        let jobs = (0..12).map(|_| (24 * 60, 2, vec![(0, 60)])).collect();
        let model = build_model(jobs, 2, 2, 30 * 24 * 60);
        let params = SearchParams {
            max_time: StdDuration::from_millis(0),
            ..Default::default()
        };
        let outcome = search(&model, &params, None);
        assert!(matches!(
            outcome.termination,
            Termination::Timeout | Termination::Feasible
        ));
    }

    #[test]
    fn test_external_cancel_stops_search() {
        let jobs = (0..12).map(|_| (24 * 60, 2, vec![(0, 60)])).collect();
        let model = build_model(jobs, 2, 2, 30 * 24 * 60);
        let cancel = Arc::new(AtomicBool::new(true));
        let params = SearchParams {
            cancel: cancel.clone(),
            ..Default::default()
        };
        let outcome = search(&model, &params, None);
        assert!(matches!(
            outcome.termination,
            Termination::Timeout | Termination::Feasible
        ));
    }

    #[test]
    fn test_progress_channel_reports_incumbents() {
        let model = build_model(vec![(48 * 60, 2, vec![(10, 60)])], 1, 1, 14 * 24 * 60);
        let (tx, rx) = std::sync::mpsc::channel();
        let outcome = search(&model, &SearchParams::default(), Some(tx));
        assert_eq!(outcome.termination, Termination::Optimal);
        let reports: Vec<IncumbentReport> = rx.try_iter().collect();
        assert!(!reports.is_empty());
        assert_eq!(reports.last().unwrap().primary, 70);
    }

    #[test]
    fn test_portfolio_matches_single_worker() {
        let model = build_model(
            vec![
                (24 * 60, 2, vec![(0, 30), (0, 40)]),
                (24 * 60, 5, vec![(0, 50)]),
            ],
            2,
            2,
            14 * 24 * 60,
        );
        let single = search(&model, &SearchParams::default(), None);
        let multi = search(
            &model,
            &SearchParams {
                num_workers: 4,
                ..Default::default()
            },
            None,
        );
        assert_eq!(single.termination, Termination::Optimal);
        assert_eq!(multi.termination, Termination::Optimal);
        assert_eq!(
            single.best.unwrap().objective.primary,
            multi.best.unwrap().objective.primary
        );
    }

    #[test]
    fn test_secondary_prefers_cheaper_machine() {
        let mut model = build_model(vec![(24 * 60, 2, vec![(0, 60)])], 2, 1, 14 * 24 * 60);
        model.machines[0].cost_cents_per_minute = 100;
        model.machines[1].cost_cents_per_minute = 5;
        let outcome = run(&model);
        let best = outcome.best.unwrap();
        assert_eq!(best.placements[0].machine, 1);
    }

    #[test]
    fn test_empty_model_trivially_optimal() {
        let model = build_model(vec![], 1, 1, 60);
        let outcome = run(&model);
        assert_eq!(outcome.termination, Termination::Optimal);
        assert!(outcome.best.unwrap().placements.is_empty());
    }
}
