//! Operator resource entity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::value_objects::{OperatorId, Skill, SkillRequirement, ZoneId};

/// Availability state of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorStatus {
    Available,
    Assigned,
    Absent,
    OnBreak,
}

impl fmt::Display for OperatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperatorStatus::Available => "AVAILABLE",
            OperatorStatus::Assigned => "ASSIGNED",
            OperatorStatus::Absent => "ABSENT",
            OperatorStatus::OnBreak => "ON_BREAK",
        };
        f.write_str(s)
    }
}

/// A skilled worker who can attend machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    /// Unique business key, e.g. `"EMP-042"`.
    pub employee_id: String,
    pub name: String,
    pub status: OperatorStatus,
    pub zone_id: ZoneId,
    pub skills: Vec<Skill>,
    pub hourly_rate: Decimal,
}

impl Operator {
    pub fn new(
        employee_id: impl Into<String>,
        name: impl Into<String>,
        zone_id: ZoneId,
    ) -> Self {
        Self {
            id: OperatorId::new(),
            employee_id: employee_id.into(),
            name: name.into(),
            status: OperatorStatus::Available,
            zone_id,
            skills: Vec::new(),
            hourly_rate: Decimal::ZERO,
        }
    }

    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn with_hourly_rate(mut self, rate: Decimal) -> Self {
        self.hourly_rate = rate;
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == OperatorStatus::Available
    }

    pub fn skill_for(&self, skill_type: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.skill_type() == skill_type)
    }

    /// Whether this operator can stand in for the given skill slot.
    pub fn satisfies(&self, requirement: &SkillRequirement) -> bool {
        self.skills.iter().any(|s| requirement.is_satisfied_by(s))
    }

    /// Whether every slot in `requirements` is satisfied by this operator
    /// alone.
    pub fn satisfies_all(&self, requirements: &[SkillRequirement]) -> bool {
        requirements.iter().all(|r| self.satisfies(r))
    }

    /// Processing efficiency against a requirement set: the mean
    /// effectiveness of the matching skills, 1.0 when no slot applies.
    pub fn effectiveness_for(&self, requirements: &[SkillRequirement]) -> Decimal {
        let matched: Vec<Decimal> = requirements
            .iter()
            .filter_map(|req| {
                self.skills
                    .iter()
                    .filter(|s| req.is_satisfied_by(s))
                    .map(|s| s.effectiveness())
                    .max()
            })
            .collect();
        if matched.is_empty() {
            Decimal::ONE
        } else {
            matched.iter().sum::<Decimal>() / Decimal::from(matched.len() as u64)
        }
    }

    /// Cost of `minutes` of this operator's time.
    pub fn cost_for_minutes(&self, minutes: i64) -> Decimal {
        self.hourly_rate * Decimal::from(minutes) / Decimal::from(60)
    }
}
