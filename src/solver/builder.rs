//! Translates a domain snapshot into a [`CpModel`].
//!
//! The builder is pure: it reads immutable aggregates loaded before the
//! solve and produces an index-based model, so the search never touches
//! repositories or locks.

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::entities::{Job, Machine, Operator, ProductionZone, TaskStatus};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::value_objects::{BusinessCalendar, SkillRequirement, TaskId, ZoneId};
use crate::solver::model::{
    CpModel, JobVar, MachineCandidate, MachineSlot, ObjectiveSpec, OperatorSlot, SkillSlot,
    TaskVar, ZoneSlot,
};

/// Immutable snapshot of everything one solve needs.
#[derive(Debug, Clone)]
pub struct SchedulingProblem {
    pub name: String,
    /// Schedule epoch: minute 0 of the solver grid.
    pub t0: chrono::NaiveDateTime,
    pub horizon_minutes: i64,
    pub jobs: Vec<Job>,
    pub machines: Vec<Machine>,
    pub operators: Vec<Operator>,
    pub zones: Vec<ProductionZone>,
    /// Caller-supplied cross-job precedence pairs.
    pub cross_job_precedences: Vec<(TaskId, TaskId)>,
    pub calendar: BusinessCalendar,
    pub objective: ObjectiveSpec,
}

/// Builds the constraint model from a [`SchedulingProblem`].
pub struct ModelBuilder<'p> {
    problem: &'p SchedulingProblem,
}

impl<'p> ModelBuilder<'p> {
    pub fn new(problem: &'p SchedulingProblem) -> Self {
        Self { problem }
    }

    /// Translates the snapshot.
    ///
    /// # Errors
    ///
    /// - `Validation` on a non-positive horizon or a precedence cycle.
    /// - `EntityNotFound` when a cross-job precedence references a task
    ///   outside the snapshot.
    /// - `ResourceError` when the roster is empty.
    pub fn build(&self) -> DomainResult<CpModel> {
        let p = self.problem;
        if p.horizon_minutes <= 0 {
            return Err(SchedulingError::validation(
                "horizon_minutes",
                "scheduling horizon must be positive",
            ));
        }

        let machines: Vec<&Machine> = p.machines.iter().filter(|m| m.is_available()).collect();
        if machines.is_empty() {
            return Err(SchedulingError::ResourceError {
                message: "no available machines in the roster".into(),
            });
        }
        let operators: Vec<&Operator> = p.operators.iter().filter(|o| o.is_available()).collect();

        let (zones, zone_index) = self.build_zones(&machines);
        let machine_slots: Vec<MachineSlot> = machines
            .iter()
            .map(|m| MachineSlot {
                machine_id: m.id,
                machine_code: m.machine_code.clone(),
                zone: zone_index[&m.zone_id],
                cost_cents_per_minute: cents(m.cost_per_minute),
            })
            .collect();
        let operator_slots: Vec<OperatorSlot> = operators
            .iter()
            .map(|o| OperatorSlot {
                operator_id: o.id,
                employee_id: o.employee_id.clone(),
                cost_cents_per_minute: cents(o.hourly_rate / Decimal::from(60)),
                effectiveness_permille: mean_effectiveness_permille(o),
            })
            .collect();

        let (tasks, jobs, task_index) = self.build_tasks(&machines, &operators)?;
        let precedences = self.build_precedences(&tasks, &jobs, &task_index)?;
        let calendar_windows = p.calendar.working_windows(p.t0, p.horizon_minutes);

        let model = CpModel {
            name: p.name.clone(),
            t0: p.t0,
            horizon: p.horizon_minutes,
            tasks,
            jobs,
            machines: machine_slots,
            operators: operator_slots,
            zones,
            precedences,
            calendar_windows,
            objective: p.objective,
        };
        debug!(
            tasks = model.tasks.len(),
            machines = model.machines.len(),
            operators = model.operators.len(),
            windows = model.calendar_windows.len(),
            precedences = model.precedences.len(),
            "constraint model built"
        );
        Ok(model)
    }

    fn build_zones(&self, machines: &[&Machine]) -> (Vec<ZoneSlot>, HashMap<ZoneId, usize>) {
        let mut zones = Vec::new();
        let mut index = HashMap::new();
        for zone in &self.problem.zones {
            index.entry(zone.id).or_insert_with(|| {
                zones.push(ZoneSlot {
                    zone_id: zone.id,
                    zone_code: zone.zone_code.clone(),
                    wip_limit: zone.wip_limit,
                });
                zones.len() - 1
            });
        }
        // Machines referencing an unknown zone get an unbounded implicit one.
        for machine in machines {
            index.entry(machine.zone_id).or_insert_with(|| {
                zones.push(ZoneSlot {
                    zone_id: machine.zone_id,
                    zone_code: format!("zone-{}", machine.zone_id),
                    wip_limit: u32::MAX,
                });
                zones.len() - 1
            });
        }
        (zones, index)
    }

    #[allow(clippy::type_complexity)]
    fn build_tasks(
        &self,
        machines: &[&Machine],
        operators: &[&Operator],
    ) -> DomainResult<(Vec<TaskVar>, Vec<JobVar>, HashMap<TaskId, usize>)> {
        let p = self.problem;
        let mut tasks = Vec::new();
        let mut jobs = Vec::new();
        let mut task_index = HashMap::new();

        for job in &p.jobs {
            let mut job_var = JobVar {
                job_id: job.id(),
                job_number: job.job_number().to_string(),
                priority_weight: job.priority().weight(),
                due: (job.due_date() - p.t0).num_minutes(),
                tasks: Vec::new(),
            };
            let job_idx = jobs.len();

            for task in job.tasks_in_sequence() {
                if matches!(task.status(), TaskStatus::Completed | TaskStatus::Cancelled) {
                    continue;
                }
                let operation = task.operation_id();
                let machine_candidates: Vec<MachineCandidate> = machines
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.can_perform(operation))
                    .map(|(idx, m)| MachineCandidate {
                        machine: idx,
                        requires_operator: m.requires_operator(),
                    })
                    .collect();

                let requirements = merge_requirements(
                    machine_candidates
                        .iter()
                        .flat_map(|mc| machines[mc.machine].requirements_for(operation)),
                );
                let skill_slots: Vec<SkillSlot> = requirements
                    .iter()
                    .map(|req| SkillSlot {
                        skill_type: req.skill_type().to_string(),
                        covering_operators: operators
                            .iter()
                            .enumerate()
                            .filter(|(_, o)| o.satisfies(req))
                            .map(|(idx, _)| idx)
                            .collect(),
                        preferred_operators: operators
                            .iter()
                            .enumerate()
                            .filter(|(_, o)| {
                                o.skills.iter().any(|s| req.is_preferred_by(s))
                            })
                            .map(|(idx, _)| idx)
                            .collect(),
                    })
                    .collect();

                let eligible_operators: Vec<usize> = if skill_slots.is_empty() {
                    if machine_candidates.iter().any(|mc| mc.requires_operator) {
                        (0..operators.len()).collect()
                    } else {
                        Vec::new()
                    }
                } else {
                    let mut union: Vec<usize> = skill_slots
                        .iter()
                        .flat_map(|s| s.covering_operators.iter().copied())
                        .collect();
                    union.sort_unstable();
                    union.dedup();
                    union
                };

                let processing_minutes = adjusted_processing_minutes(
                    task.planned_duration().ceil_minutes(),
                    &requirements,
                    &eligible_operators,
                    operators,
                );

                let idx = tasks.len();
                task_index.insert(task.id(), idx);
                job_var.tasks.push(idx);
                tasks.push(TaskVar {
                    task_id: task.id(),
                    job: job_idx,
                    sequence: task.sequence_in_job(),
                    operation_id: operation,
                    setup_minutes: task.setup_duration().ceil_minutes(),
                    processing_minutes,
                    release: 0,
                    machine_candidates,
                    skill_slots,
                    eligible_operators,
                });
            }
            jobs.push(job_var);
        }
        Ok((tasks, jobs, task_index))
    }

    fn build_precedences(
        &self,
        tasks: &[TaskVar],
        jobs: &[JobVar],
        task_index: &HashMap<TaskId, usize>,
    ) -> DomainResult<Vec<(usize, usize)>> {
        let mut precedences = Vec::new();
        for job in jobs {
            for pair in job.tasks.windows(2) {
                precedences.push((pair[0], pair[1]));
            }
        }
        for (pred, succ) in &self.problem.cross_job_precedences {
            let p = *task_index
                .get(pred)
                .ok_or_else(|| SchedulingError::not_found("Task", pred))?;
            let s = *task_index
                .get(succ)
                .ok_or_else(|| SchedulingError::not_found("Task", succ))?;
            precedences.push((p, s));
        }

        // Cycle detection over the combined precedence graph.
        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..tasks.len()).map(|i| graph.add_node(i)).collect();
        for &(p, s) in &precedences {
            graph.add_edge(nodes[p], nodes[s], ());
        }
        if toposort(&graph, None).is_err() {
            return Err(SchedulingError::validation(
                "precedences",
                "precedence constraints form a cycle",
            ));
        }
        Ok(precedences)
    }
}

/// Deduplicates requirements by skill type, keeping the strictest demand.
fn merge_requirements<'a>(
    requirements: impl Iterator<Item = &'a SkillRequirement>,
) -> Vec<SkillRequirement> {
    let mut merged: Vec<SkillRequirement> = Vec::new();
    for req in requirements {
        match merged
            .iter_mut()
            .find(|r| r.skill_type() == req.skill_type())
        {
            Some(existing) => {
                if req.minimum_level() > existing.minimum_level()
                    || (req.minimum_level() == existing.minimum_level()
                        && req.years_experience_required() > existing.years_experience_required())
                {
                    *existing = req.clone();
                }
            }
            None => merged.push(req.clone()),
        }
    }
    merged
}

/// Processing time stretched by the best achievable crew efficiency:
/// `ceil(planned / best_effectiveness)`. Full efficiency when the task
/// has no skill profile.
fn adjusted_processing_minutes(
    planned: i64,
    requirements: &[SkillRequirement],
    eligible: &[usize],
    operators: &[&Operator],
) -> i64 {
    if requirements.is_empty() || eligible.is_empty() {
        return planned;
    }
    let best = eligible
        .iter()
        .map(|&idx| operators[idx].effectiveness_for(requirements))
        .max()
        .unwrap_or(Decimal::ONE);
    if best >= Decimal::ONE || best.is_zero() {
        return planned;
    }
    (Decimal::from(planned) / best)
        .ceil()
        .to_i64()
        .unwrap_or(planned)
}

fn cents(amount: Decimal) -> i64 {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .unwrap_or(0)
}

fn mean_effectiveness_permille(operator: &Operator) -> i64 {
    if operator.skills.is_empty() {
        return 1000;
    }
    let sum: Decimal = operator.skills.iter().map(|s| s.effectiveness()).sum();
    let mean = sum / Decimal::from(operator.skills.len() as u64);
    (mean * Decimal::from(1000)).to_i64().unwrap_or(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AutomationLevel, Machine, Operator, Task};
    use crate::domain::value_objects::{
        Duration, JobPriority, OperationId, Skill, SkillRequirement, ZoneId,
    };

    fn t0() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn one_task_job(operation: OperationId, minutes: i64) -> Job {
        let mut job = Job::create(
            "JOB001",
            1,
            JobPriority::Normal,
            t0() + chrono::Duration::hours(48),
            None,
            t0(),
        )
        .unwrap();
        job.add_task(
            Task::new(
                job.id(),
                operation,
                10,
                Duration::from_minutes_i64(minutes).unwrap(),
                Duration::from_minutes_i64(10).unwrap(),
            )
            .unwrap(),
        )
        .unwrap();
        job
    }

    fn problem(jobs: Vec<Job>, machines: Vec<Machine>, operators: Vec<Operator>) -> SchedulingProblem {
        SchedulingProblem {
            name: "test".into(),
            t0: t0(),
            horizon_minutes: 7 * 24 * 60,
            jobs,
            machines,
            operators,
            zones: Vec::new(),
            cross_job_precedences: Vec::new(),
            calendar: BusinessCalendar::around_the_clock(),
            objective: ObjectiveSpec::default(),
        }
    }

    #[test]
    fn test_build_single_task_model() {
        let op = OperationId::new();
        let zone = ZoneId::new();
        let machine = Machine::new("M1", "Mill", AutomationLevel::Manual, zone)
            .with_capability(op);
        let operator = Operator::new("EMP-1", "Ada", zone)
            .with_skill(Skill::advanced("machining", 5).unwrap());
        let model = ModelBuilder::new(&problem(
            vec![one_task_job(op, 60)],
            vec![machine],
            vec![operator],
        ))
        .build()
        .unwrap();

        assert_eq!(model.tasks.len(), 1);
        assert_eq!(model.tasks[0].duration(), 70);
        assert_eq!(model.tasks[0].machine_candidates.len(), 1);
        // Manual machine, no skill slots: every operator is eligible.
        assert_eq!(model.tasks[0].eligible_operators, vec![0]);
        assert!(model.structural_infeasibility().is_none());
    }

    #[test]
    fn test_unqualified_roster_is_structurally_infeasible() {
        let op = OperationId::new();
        let zone = ZoneId::new();
        let req = SkillRequirement::at_level("welding", 3).unwrap();
        let machine = Machine::new("M1", "Welder", AutomationLevel::Manual, zone)
            .with_skill_requirement(op, req);
        let operator = Operator::new("EMP-1", "Ada", zone)
            .with_skill(Skill::intermediate("welding", 2).unwrap());
        let model = ModelBuilder::new(&problem(
            vec![one_task_job(op, 60)],
            vec![machine],
            vec![operator],
        ))
        .build()
        .unwrap();
        let reason = model.structural_infeasibility().unwrap();
        assert!(reason.contains("welding"));
    }

    #[test]
    fn test_offline_machines_excluded() {
        let op = OperationId::new();
        let zone = ZoneId::new();
        let mut machine = Machine::new("M1", "Mill", AutomationLevel::FullyAutomatic, zone)
            .with_capability(op);
        machine.status = crate::domain::entities::MachineStatus::Offline;
        let err = ModelBuilder::new(&problem(vec![one_task_job(op, 60)], vec![machine], vec![]))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "RESOURCE_ERROR");
    }

    #[test]
    fn test_efficiency_stretches_processing() {
        let op = OperationId::new();
        let zone = ZoneId::new();
        // Level-2 operator, no experience: effectiveness 2/3.
        let req = SkillRequirement::at_level("machining", 2).unwrap();
        let machine = Machine::new("M1", "Mill", AutomationLevel::Manual, zone)
            .with_skill_requirement(op, req);
        let operator = Operator::new("EMP-1", "Ada", zone)
            .with_skill(Skill::new("machining", 2, 0, []).unwrap());
        let model = ModelBuilder::new(&problem(
            vec![one_task_job(op, 60)],
            vec![machine],
            vec![operator],
        ))
        .build()
        .unwrap();
        // ceil(60 / (2/3)) = 90, plus 10 setup.
        assert_eq!(model.tasks[0].processing_minutes, 90);
        assert_eq!(model.tasks[0].duration(), 100);
    }

    #[test]
    fn test_cross_job_precedence_and_cycle() {
        let op = OperationId::new();
        let zone = ZoneId::new();
        let machine = Machine::new("M1", "Mill", AutomationLevel::FullyAutomatic, zone)
            .with_capability(op);
        let job_a = one_task_job(op, 60);
        let mut job_b = Job::create(
            "JOB002",
            1,
            JobPriority::Normal,
            t0() + chrono::Duration::hours(48),
            None,
            t0(),
        )
        .unwrap();
        job_b
            .add_task(
                Task::new(
                    job_b.id(),
                    op,
                    10,
                    Duration::from_minutes_i64(30).unwrap(),
                    Duration::ZERO,
                )
                .unwrap(),
            )
            .unwrap();
        let a_task = job_a.tasks_in_sequence().next().unwrap().id();
        let b_task = job_b.tasks_in_sequence().next().unwrap().id();

        let mut p = problem(vec![job_a, job_b], vec![machine], vec![]);
        p.cross_job_precedences = vec![(a_task, b_task)];
        let model = ModelBuilder::new(&p).build().unwrap();
        assert!(model.precedences.contains(&(0, 1)));

        // Adding the reverse edge closes a cycle.
        p.cross_job_precedences.push((b_task, a_task));
        let err = ModelBuilder::new(&p).build().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_unknown_precedence_task() {
        let op = OperationId::new();
        let zone = ZoneId::new();
        let machine = Machine::new("M1", "Mill", AutomationLevel::FullyAutomatic, zone)
            .with_capability(op);
        let mut p = problem(vec![one_task_job(op, 60)], vec![machine], vec![]);
        p.cross_job_precedences = vec![(TaskId::new(), TaskId::new())];
        let err = ModelBuilder::new(&p).build().unwrap_err();
        assert_eq!(err.error_code(), "ENTITY_NOT_FOUND");
    }
}
