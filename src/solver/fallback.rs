//! Deterministic dispatch schedulers used when the CP path fails.
//!
//! Three strategies of decreasing strictness, all sharing one serial
//! dispatch core over [`ScheduleState`]:
//!
//! 1. **GreedyPriority** — pick the ready task with the highest
//!    `(priority, -slack, -sequence)` key, place it on the
//!    earliest-available qualified (machine, crew) tuple.
//! 2. **CriticalPathFirst** — order by longest remaining precedence chain
//!    (computed over planned durations), ties broken by the greedy key.
//! 3. **Relaxed** — last resort: keep minimum skill qualification and
//!    precedence/no-overlap, drop WIP limits, calendar containment and
//!    skill-level preference.
//!
//! Every strategy produces the same solution shape as the CP path plus a
//! quality score strictly below the CP scores.

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::solver::engine::{crew_options, EngineSolution, ScheduleState};
use crate::solver::model::CpModel;

/// Quality score of a CP-proven optimum.
pub const QUALITY_OPTIMAL: f64 = 1.0;
/// Quality score of a CP feasible (not proven optimal) solution.
pub const QUALITY_FEASIBLE: f64 = 0.7;
/// Quality score of a best-incumbent salvaged from a timeout.
pub const QUALITY_PARTIAL: f64 = 0.6;

/// Fallback dispatch strategies in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    GreedyPriority,
    CriticalPathFirst,
    Relaxed,
}

impl FallbackStrategy {
    /// Strategies in the order the resilience controller tries them.
    pub fn escalation_order() -> [FallbackStrategy; 3] {
        [
            FallbackStrategy::GreedyPriority,
            FallbackStrategy::CriticalPathFirst,
            FallbackStrategy::Relaxed,
        ]
    }

    /// Solution confidence in `[0, 1]`, decreasing with strategy severity.
    pub fn quality_score(self) -> f64 {
        match self {
            FallbackStrategy::GreedyPriority => 0.5,
            FallbackStrategy::CriticalPathFirst => 0.45,
            FallbackStrategy::Relaxed => 0.3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FallbackStrategy::GreedyPriority => "greedy_priority",
            FallbackStrategy::CriticalPathFirst => "critical_path_first",
            FallbackStrategy::Relaxed => "relaxed",
        }
    }
}

/// Longest remaining chain (own duration included) below each task,
/// following the precedence graph over planned durations.
fn chain_tails(model: &CpModel) -> Vec<i64> {
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..model.tasks.len()).map(|i| graph.add_node(i)).collect();
    for &(p, s) in &model.precedences {
        graph.add_edge(nodes[p], nodes[s], ());
    }
    let order = toposort(&graph, None).unwrap_or_default();

    let mut tails = vec![0i64; model.tasks.len()];
    for node in order.into_iter().rev() {
        let t = graph[node];
        let down = graph
            .neighbors(node)
            .map(|succ| tails[graph[succ]])
            .max()
            .unwrap_or(0);
        tails[t] = model.tasks[t].duration() + down;
    }
    tails
}

/// Runs one dispatch strategy to completion.
///
/// Returns `None` when some task cannot be placed at all under the
/// strategy's (possibly relaxed) constraints.
pub fn run_fallback(model: &CpModel, strategy: FallbackStrategy) -> Option<EngineSolution> {
    if model.structural_infeasibility().is_some() {
        return None;
    }

    let mut state = ScheduleState::new(model);
    if strategy == FallbackStrategy::Relaxed {
        state.respect_calendar = false;
        state.respect_wip = false;
    }
    let tails = match strategy {
        FallbackStrategy::CriticalPathFirst => chain_tails(model),
        _ => Vec::new(),
    };

    while state.placed_count() < model.tasks.len() {
        let ready = state.ready_tasks();
        if ready.is_empty() {
            return None;
        }

        // Dispatch key: highest priority first, then least slack, then
        // lowest sequence; critical-path mode leads with the longest tail.
        let task = ready
            .into_iter()
            .min_by_key(|&t| {
                let tv = &model.tasks[t];
                let job = &model.jobs[tv.job];
                let slack = job.due - (state.release_of(t) + tv.duration());
                let tail = tails.get(t).copied().unwrap_or(0);
                (-tail, -job.priority_weight, slack, tv.sequence)
            })
            .expect("ready set checked non-empty");

        let (machine, crew, start) = best_placement(model, &state, task, strategy)?;
        let _ = state.place(task, machine, crew, start);
    }

    let objective = state.objective();
    debug!(
        strategy = strategy.as_str(),
        primary = objective.primary,
        secondary = objective.secondary,
        "fallback dispatch complete"
    );
    Some(EngineSolution {
        placements: state.placements,
        objective,
    })
}

/// Earliest-available qualified (machine, crew, start) for a task. Ties on
/// start fall to crews with more preferred-level members (except under
/// Relaxed), then to cheaper crews.
fn best_placement(
    model: &CpModel,
    state: &ScheduleState<'_>,
    task: usize,
    strategy: FallbackStrategy,
) -> Option<(usize, Vec<usize>, i64)> {
    let tv = &model.tasks[task];
    let mut best: Option<((i64, i64, i64), usize, Vec<usize>)> = None;

    for mc in &tv.machine_candidates {
        for crew in crew_options(model, tv, mc) {
            let Some(start) = state.earliest_start(task, mc.machine, &crew) else {
                continue;
            };
            let preferred = if strategy == FallbackStrategy::Relaxed {
                0
            } else {
                crew_preference(model, task, &crew)
            };
            let cost: i64 = model.machines[mc.machine].cost_cents_per_minute
                + crew
                    .iter()
                    .map(|&o| model.operators[o].cost_cents_per_minute)
                    .sum::<i64>();
            let key = (start, -preferred, cost);
            if best.as_ref().map_or(true, |(k, _, _)| key < *k) {
                best = Some((key, mc.machine, crew));
            }
        }
    }
    best.map(|((start, _, _), machine, crew)| (machine, crew, start))
}

/// Number of skill slots covered at the preferred level by the crew.
fn crew_preference(model: &CpModel, task: usize, crew: &[usize]) -> i64 {
    model.tasks[task]
        .skill_slots
        .iter()
        .filter(|slot| crew.iter().any(|o| slot.preferred_operators.contains(o)))
        .count() as i64
}
