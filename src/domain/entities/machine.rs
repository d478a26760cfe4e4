//! Machine resource entity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::domain::value_objects::{MachineId, OperationId, SkillRequirement, ZoneId};

/// Availability state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Available,
    Busy,
    Maintenance,
    Offline,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineStatus::Available => "AVAILABLE",
            MachineStatus::Busy => "BUSY",
            MachineStatus::Maintenance => "MAINTENANCE",
            MachineStatus::Offline => "OFFLINE",
        };
        f.write_str(s)
    }
}

/// How much human attendance a machine needs while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutomationLevel {
    Manual,
    SemiAutomatic,
    FullyAutomatic,
}

/// A machine on the shop floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    /// Unique business key, e.g. `"CNC-01"`.
    pub machine_code: String,
    pub name: String,
    pub automation_level: AutomationLevel,
    pub status: MachineStatus,
    pub zone_id: ZoneId,
    /// Operations this machine can perform.
    pub capabilities: BTreeSet<OperationId>,
    /// Operator skill demanded per operation performed on this machine.
    pub skill_requirements: HashMap<OperationId, Vec<SkillRequirement>>,
    pub cost_per_minute: Decimal,
}

impl Machine {
    pub fn new(
        machine_code: impl Into<String>,
        name: impl Into<String>,
        automation_level: AutomationLevel,
        zone_id: ZoneId,
    ) -> Self {
        Self {
            id: MachineId::new(),
            machine_code: machine_code.into(),
            name: name.into(),
            automation_level,
            status: MachineStatus::Available,
            zone_id,
            capabilities: BTreeSet::new(),
            skill_requirements: HashMap::new(),
            cost_per_minute: Decimal::ZERO,
        }
    }

    pub fn with_capability(mut self, operation_id: OperationId) -> Self {
        self.capabilities.insert(operation_id);
        self
    }

    pub fn with_skill_requirement(
        mut self,
        operation_id: OperationId,
        requirement: SkillRequirement,
    ) -> Self {
        self.capabilities.insert(operation_id);
        self.skill_requirements
            .entry(operation_id)
            .or_default()
            .push(requirement);
        self
    }

    pub fn with_cost_per_minute(mut self, cost: Decimal) -> Self {
        self.cost_per_minute = cost;
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == MachineStatus::Available
    }

    /// Whether this machine can run the operation. An empty capability
    /// set means a universal machine.
    pub fn can_perform(&self, operation_id: OperationId) -> bool {
        self.capabilities.is_empty() || self.capabilities.contains(&operation_id)
    }

    /// Skill slots an operator crew must cover for this operation.
    pub fn requirements_for(&self, operation_id: OperationId) -> &[SkillRequirement] {
        self.skill_requirements
            .get(&operation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether running a task here needs at least one operator.
    pub fn requires_operator(&self) -> bool {
        self.automation_level != AutomationLevel::FullyAutomatic
    }
}
