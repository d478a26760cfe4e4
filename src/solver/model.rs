//! Constraint model for the scheduling core.
//!
//! The model is an index-based, immutable description of one solve: task
//! interval variables with their candidate machines and crews, resource
//! no-overlap sets, precedence pairs, calendar windows, WIP groups and the
//! hierarchical objective. Building it is the job of
//! [`ModelBuilder`](crate::solver::builder::ModelBuilder); searching it is
//! the job of the [`engine`](crate::solver::engine).
//!
//! Time is integer minutes relative to the schedule epoch `t0`, horizon
//! `[0, H)`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{JobId, MachineId, OperationId, OperatorId, TaskId, ZoneId};

/// A machine a task may run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineCandidate {
    /// Index into [`CpModel::machines`].
    pub machine: usize,
    /// Whether this machine needs at least one operator attending.
    pub requires_operator: bool,
}

/// One skill slot a task's crew must cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillSlot {
    pub skill_type: String,
    /// Operator indices satisfying the slot's minimum requirement.
    pub covering_operators: Vec<usize>,
    /// Subset also meeting the preferred level.
    pub preferred_operators: Vec<usize>,
}

/// Interval variable for one task.
#[derive(Debug, Clone)]
pub struct TaskVar {
    pub task_id: TaskId,
    pub job: usize,
    pub sequence: u16,
    pub operation_id: OperationId,
    pub setup_minutes: i64,
    /// Processing minutes after operator-efficiency adjustment.
    pub processing_minutes: i64,
    /// Earliest allowed start, relative minutes.
    pub release: i64,
    pub machine_candidates: Vec<MachineCandidate>,
    pub skill_slots: Vec<SkillSlot>,
    /// Union of slot coverers, or every available operator when the task
    /// has no skill slots but still needs attendance.
    pub eligible_operators: Vec<usize>,
}

impl TaskVar {
    pub fn duration(&self) -> i64 {
        self.setup_minutes + self.processing_minutes
    }
}

/// Per-job data the objective needs.
#[derive(Debug, Clone)]
pub struct JobVar {
    pub job_id: JobId,
    pub job_number: String,
    pub priority_weight: i64,
    /// Due instant in relative minutes (may exceed the horizon).
    pub due: i64,
    /// Indices of this job's tasks in sequence order.
    pub tasks: Vec<usize>,
}

/// A machine slot in the model.
#[derive(Debug, Clone)]
pub struct MachineSlot {
    pub machine_id: MachineId,
    pub machine_code: String,
    pub zone: usize,
    pub cost_cents_per_minute: i64,
}

/// An operator slot in the model.
#[derive(Debug, Clone)]
pub struct OperatorSlot {
    pub operator_id: OperatorId,
    pub employee_id: String,
    pub cost_cents_per_minute: i64,
    /// Efficiency in permille against this solve's skill profile baseline.
    pub effectiveness_permille: i64,
}

/// A WIP accounting group.
#[derive(Debug, Clone)]
pub struct ZoneSlot {
    pub zone_id: ZoneId,
    pub zone_code: String,
    pub wip_limit: u32,
}

/// Objective configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    /// Weight of the makespan term in the primary objective.
    pub makespan_weight: i64,
    /// Weight of the priority-weighted tardiness term.
    pub tardiness_weight: i64,
    /// Whether the secondary (cost) objective is optimized at all.
    pub hierarchical: bool,
    /// Relative tolerance on the primary inside which secondaries compete.
    pub cost_tolerance: f64,
}

impl Default for ObjectiveSpec {
    fn default() -> Self {
        Self {
            makespan_weight: 1,
            tardiness_weight: 10,
            hierarchical: true,
            cost_tolerance: 0.02,
        }
    }
}

/// A `(primary, secondary)` objective sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectiveValue {
    pub primary: i64,
    /// Total cost in cents.
    pub secondary: i64,
}

impl ObjectiveValue {
    /// Lexicographic comparison with an ε-band on the primary: primaries
    /// within `tolerance` of each other compare by secondary.
    pub fn better_than(&self, other: &ObjectiveValue, spec: &ObjectiveSpec) -> bool {
        if !spec.hierarchical {
            return self.primary < other.primary;
        }
        let band = (spec.cost_tolerance * other.primary as f64).abs() as i64;
        if self.primary + band < other.primary {
            return true;
        }
        if other.primary + band < self.primary {
            return false;
        }
        match self.secondary.cmp(&other.secondary) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.primary < other.primary,
        }
    }
}

/// The complete constraint instance for one solve.
#[derive(Debug, Clone)]
pub struct CpModel {
    pub name: String,
    /// Schedule epoch; minute 0 of the relative grid.
    pub t0: NaiveDateTime,
    /// Horizon length in minutes; all intervals live in `[0, horizon)`.
    pub horizon: i64,
    pub tasks: Vec<TaskVar>,
    pub jobs: Vec<JobVar>,
    pub machines: Vec<MachineSlot>,
    pub operators: Vec<OperatorSlot>,
    pub zones: Vec<ZoneSlot>,
    /// `(predecessor, successor)` pairs: `end(p) <= start(s)`. Includes
    /// intra-job sequence pairs and caller-supplied cross-job pairs.
    pub precedences: Vec<(usize, usize)>,
    /// Sorted, disjoint working windows in relative minutes.
    pub calendar_windows: Vec<(i64, i64)>,
    pub objective: ObjectiveSpec,
}

impl CpModel {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Direct predecessors of a task.
    pub fn predecessors_of(&self, task: usize) -> impl Iterator<Item = usize> + '_ {
        self.precedences
            .iter()
            .filter(move |(_, s)| *s == task)
            .map(|(p, _)| *p)
    }

    /// A task that can never be placed, with the reason. The search
    /// engine fails fast on these instead of exploring an empty space.
    pub fn structural_infeasibility(&self) -> Option<String> {
        for task in &self.tasks {
            let job = &self.jobs[task.job];
            if task.machine_candidates.is_empty() {
                return Some(format!(
                    "task {} of job {} has no capable available machine",
                    task.sequence, job.job_number
                ));
            }
            for slot in &task.skill_slots {
                if slot.covering_operators.is_empty() {
                    return Some(format!(
                        "task {} of job {} requires skill '{}' no available operator satisfies",
                        task.sequence, job.job_number, slot.skill_type
                    ));
                }
            }
            let needs_crew = task
                .machine_candidates
                .iter()
                .all(|mc| mc.requires_operator);
            if needs_crew && task.skill_slots.is_empty() && task.eligible_operators.is_empty() {
                return Some(format!(
                    "task {} of job {} needs an attending operator but none is available",
                    task.sequence, job.job_number
                ));
            }
            let duration = task.duration();
            let fits = self
                .calendar_windows
                .iter()
                .any(|(s, e)| e - s >= duration);
            if !fits {
                return Some(format!(
                    "task {} of job {} ({duration} min) does not fit in any working window",
                    task.sequence, job.job_number
                ));
            }
        }
        None
    }

    /// Rough model footprint used by the memory guard.
    pub fn estimated_memory_bytes(&self) -> u64 {
        let per_task: u64 = self
            .tasks
            .iter()
            .map(|t| {
                (t.machine_candidates.len() + t.eligible_operators.len() + t.skill_slots.len())
                    as u64
                    * 64
                    + 256
            })
            .sum();
        let search_state = (self.tasks.len() as u64)
            * ((self.machines.len() + self.operators.len()) as u64 * 16 + 512);
        per_task + search_state + (self.calendar_windows.len() as u64) * 16
    }

    /// Wall-clock instant for a relative minute.
    pub fn instant_at(&self, minute: i64) -> NaiveDateTime {
        self.t0 + chrono::Duration::minutes(minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ObjectiveSpec {
        ObjectiveSpec {
            makespan_weight: 1,
            tardiness_weight: 10,
            hierarchical: true,
            cost_tolerance: 0.02,
        }
    }

    #[test]
    fn test_objective_strictly_better_primary() {
        let a = ObjectiveValue {
            primary: 100,
            secondary: 500,
        };
        let b = ObjectiveValue {
            primary: 200,
            secondary: 100,
        };
        assert!(a.better_than(&b, &spec()));
        assert!(!b.better_than(&a, &spec()));
    }

    #[test]
    fn test_objective_secondary_breaks_band() {
        // Primaries within 2% of each other: secondary decides.
        let a = ObjectiveValue {
            primary: 100,
            secondary: 50,
        };
        let b = ObjectiveValue {
            primary: 101,
            secondary: 500,
        };
        assert!(a.better_than(&b, &spec()));
        let c = ObjectiveValue {
            primary: 99,
            secondary: 500,
        };
        assert!(a.better_than(&c, &spec())); // same secondary rule, cheaper wins
        assert!(!c.better_than(&a, &spec()));
    }

    #[test]
    fn test_objective_non_hierarchical_ignores_secondary() {
        let flat = ObjectiveSpec {
            hierarchical: false,
            ..spec()
        };
        let a = ObjectiveValue {
            primary: 100,
            secondary: 999,
        };
        let b = ObjectiveValue {
            primary: 100,
            secondary: 1,
        };
        assert!(!a.better_than(&b, &flat));
        assert!(!b.better_than(&a, &flat));
    }

    #[test]
    fn test_objective_equal_primary_equal_secondary() {
        let a = ObjectiveValue {
            primary: 100,
            secondary: 10,
        };
        assert!(!a.better_than(&a, &spec()));
    }
}
