//! Job priority value object module
//!
//! This module defines the JobPriority value object which determines how
//! heavily a job's tardiness is penalized by the optimizer and in which
//! order jobs are considered by the dispatch heuristics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::SchedulingError;

/// Priority level of a job.
///
/// Ordering follows urgency: `Low < Normal < High < Urgent`. The numeric
/// weight feeds the weighted-tardiness term of the primary objective, so an
/// urgent job one hour late costs ten times a low-priority job one hour late.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl JobPriority {
    /// Tardiness weight used by the primary objective.
    pub fn weight(&self) -> i64 {
        match self {
            JobPriority::Low => 1,
            JobPriority::Normal => 2,
            JobPriority::High => 5,
            JobPriority::Urgent => 10,
        }
    }

    /// All priorities from most to least urgent.
    pub fn descending() -> [JobPriority; 4] {
        [
            JobPriority::Urgent,
            JobPriority::High,
            JobPriority::Normal,
            JobPriority::Low,
        ]
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPriority::Low => "LOW",
            JobPriority::Normal => "NORMAL",
            JobPriority::High => "HIGH",
            JobPriority::Urgent => "URGENT",
        };
        f.write_str(s)
    }
}

impl FromStr for JobPriority {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(JobPriority::Low),
            "NORMAL" => Ok(JobPriority::Normal),
            "HIGH" => Ok(JobPriority::High),
            "URGENT" => Ok(JobPriority::Urgent),
            other => Err(SchedulingError::validation(
                "priority",
                format!("unknown priority '{other}', expected LOW|NORMAL|HIGH|URGENT"),
            )),
        }
    }
}
