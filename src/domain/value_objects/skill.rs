//! Skill and skill-requirement value objects.
//!
//! A `Skill` describes what an operator can do; a `SkillRequirement`
//! describes what an operation demands. Matching the two gates operator
//! candidacy in the constraint model and in every fallback dispatcher.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::errors::SchedulingError;

/// Minimum and maximum skill level.
pub const MIN_SKILL_LEVEL: u8 = 1;
pub const MAX_SKILL_LEVEL: u8 = 3;

/// An operator's proficiency in one skill area.
///
/// Immutable: upgrades and added certifications produce new values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Skill {
    skill_type: String,
    level: u8,
    years_experience: u32,
    certifications: BTreeSet<String>,
}

impl Skill {
    /// Creates a skill.
    ///
    /// Skill types are normalized to lowercase; levels must be 1..=3.
    pub fn new(
        skill_type: impl Into<String>,
        level: u8,
        years_experience: u32,
        certifications: impl IntoIterator<Item = String>,
    ) -> Result<Self, SchedulingError> {
        let skill_type = skill_type.into().trim().to_lowercase();
        if skill_type.is_empty() {
            return Err(SchedulingError::validation(
                "skill_type",
                "skill type cannot be empty",
            ));
        }
        if !(MIN_SKILL_LEVEL..=MAX_SKILL_LEVEL).contains(&level) {
            return Err(SchedulingError::validation(
                "skill_level",
                format!("skill level must be between {MIN_SKILL_LEVEL} and {MAX_SKILL_LEVEL}, got {level}"),
            ));
        }
        Ok(Self {
            skill_type,
            level,
            years_experience,
            certifications: certifications.into_iter().collect(),
        })
    }

    /// Level-1 skill with no experience.
    pub fn basic(skill_type: impl Into<String>) -> Result<Self, SchedulingError> {
        Self::new(skill_type, 1, 0, [])
    }

    /// Level-2 skill.
    pub fn intermediate(skill_type: impl Into<String>, years: u32) -> Result<Self, SchedulingError> {
        Self::new(skill_type, 2, years, [])
    }

    /// Level-3 skill.
    pub fn advanced(skill_type: impl Into<String>, years: u32) -> Result<Self, SchedulingError> {
        Self::new(skill_type, 3, years, [])
    }

    pub fn skill_type(&self) -> &str {
        &self.skill_type
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn years_experience(&self) -> u32 {
        self.years_experience
    }

    pub fn certifications(&self) -> impl Iterator<Item = &str> {
        self.certifications.iter().map(String::as_str)
    }

    pub fn has_certification(&self, name: &str) -> bool {
        self.certifications.contains(name)
    }

    /// Returns a new skill with the certification added.
    pub fn with_certification(&self, name: impl Into<String>) -> Skill {
        let mut certs = self.certifications.clone();
        certs.insert(name.into());
        Skill {
            certifications: certs,
            ..self.clone()
        }
    }

    /// Returns a new skill upgraded to a strictly higher level.
    pub fn upgraded_to(
        &self,
        new_level: u8,
        additional_years: u32,
    ) -> Result<Skill, SchedulingError> {
        if new_level <= self.level {
            return Err(SchedulingError::business_rule(
                "skill_upgrade",
                format!(
                    "new level {new_level} must be higher than current level {}",
                    self.level
                ),
            ));
        }
        Skill::new(
            self.skill_type.clone(),
            new_level,
            self.years_experience + additional_years,
            self.certifications.iter().cloned(),
        )
    }

    /// Effectiveness in `[0, 1]`:
    /// `level/3 + min(0.2, years·0.02) + min(0.15, certs·0.05)`, capped at 1.
    pub fn effectiveness(&self) -> Decimal {
        let base = Decimal::from(self.level) / Decimal::from(3);
        let experience =
            (Decimal::from(self.years_experience) * Decimal::new(2, 2)).min(Decimal::new(2, 1));
        let certification =
            (Decimal::from(self.certifications.len() as u64) * Decimal::new(5, 2))
                .min(Decimal::new(15, 2));
        (base + experience + certification).min(Decimal::ONE)
    }

    /// Effectiveness as an f64 for heuristic scoring.
    pub fn effectiveness_f64(&self) -> f64 {
        self.effectiveness().to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (level {})", self.skill_type, self.level)
    }
}

/// What an operation demands from at least one assigned operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillRequirement {
    skill_type: String,
    minimum_level: u8,
    preferred_level: Option<u8>,
    years_experience_required: u32,
    required_certifications: BTreeSet<String>,
}

impl SkillRequirement {
    pub fn new(
        skill_type: impl Into<String>,
        minimum_level: u8,
        preferred_level: Option<u8>,
        years_experience_required: u32,
        required_certifications: impl IntoIterator<Item = String>,
    ) -> Result<Self, SchedulingError> {
        let skill_type = skill_type.into().trim().to_lowercase();
        if skill_type.is_empty() {
            return Err(SchedulingError::validation(
                "skill_type",
                "requirement skill type cannot be empty",
            ));
        }
        if !(MIN_SKILL_LEVEL..=MAX_SKILL_LEVEL).contains(&minimum_level) {
            return Err(SchedulingError::validation(
                "minimum_level",
                format!("minimum level must be between {MIN_SKILL_LEVEL} and {MAX_SKILL_LEVEL}"),
            ));
        }
        if let Some(preferred) = preferred_level {
            if preferred < minimum_level || preferred > MAX_SKILL_LEVEL {
                return Err(SchedulingError::validation(
                    "preferred_level",
                    format!("preferred level {preferred} must be within [{minimum_level}, {MAX_SKILL_LEVEL}]"),
                ));
            }
        }
        Ok(Self {
            skill_type,
            minimum_level,
            preferred_level,
            years_experience_required,
            required_certifications: required_certifications.into_iter().collect(),
        })
    }

    /// Requirement on level only.
    pub fn at_level(
        skill_type: impl Into<String>,
        minimum_level: u8,
    ) -> Result<Self, SchedulingError> {
        Self::new(skill_type, minimum_level, None, 0, [])
    }

    pub fn skill_type(&self) -> &str {
        &self.skill_type
    }

    pub fn minimum_level(&self) -> u8 {
        self.minimum_level
    }

    pub fn preferred_level(&self) -> Option<u8> {
        self.preferred_level
    }

    pub fn years_experience_required(&self) -> u32 {
        self.years_experience_required
    }

    pub fn required_certifications(&self) -> impl Iterator<Item = &str> {
        self.required_certifications.iter().map(String::as_str)
    }

    /// A skill satisfies this requirement iff the type matches, the level
    /// meets the minimum, the experience meets the floor and all required
    /// certifications are present.
    pub fn is_satisfied_by(&self, skill: &Skill) -> bool {
        skill.skill_type() == self.skill_type
            && skill.level() >= self.minimum_level
            && skill.years_experience() >= self.years_experience_required
            && self
                .required_certifications
                .iter()
                .all(|c| skill.has_certification(c))
    }

    /// Whether the skill also reaches the preferred level (when one is set).
    pub fn is_preferred_by(&self, skill: &Skill) -> bool {
        match self.preferred_level {
            Some(preferred) => self.is_satisfied_by(skill) && skill.level() >= preferred,
            None => self.is_satisfied_by(skill),
        }
    }

    /// A copy with only the minimum kept (used by the relaxed fallback).
    pub fn without_preference(&self) -> SkillRequirement {
        SkillRequirement {
            preferred_level: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for SkillRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >= level {}", self.skill_type, self.minimum_level)
    }
}
