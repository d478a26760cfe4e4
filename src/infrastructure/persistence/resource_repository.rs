//! SQLite implementations of the resource repositories: machines (with
//! capabilities and per-operation skill requirements), operators (with
//! skills) and production zones. Skill types encountered on writes are
//! recorded in the `skills` catalog.

use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::entities::{
    AutomationLevel, Machine, MachineStatus, Operator, OperatorStatus, ProductionZone,
};
use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::repositories::{MachineRepository, OperatorRepository, ZoneRepository};
use crate::domain::value_objects::{
    MachineId, OperationId, OperatorId, Skill, SkillRequirement, ZoneId,
};

pub struct SqliteMachineRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteMachineRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn machine_from_row(row: &Row<'_>) -> rusqlite::Result<Machine> {
        let id: String = row.get("id")?;
        let automation: String = row.get("automation_level")?;
        let status: String = row.get("status")?;
        let zone: String = row.get("zone_id")?;
        let cost: String = row.get("cost_per_minute")?;
        Ok(Machine {
            id: parse_id::<MachineId>(&id)?,
            machine_code: row.get("machine_code")?,
            name: row.get("name")?,
            automation_level: parse_automation(&automation)?,
            status: parse_machine_status(&status)?,
            zone_id: parse_id::<ZoneId>(&zone)?,
            capabilities: Default::default(),
            skill_requirements: Default::default(),
            cost_per_minute: parse_decimal(&cost)?,
        })
    }

    fn load_details(&self, machine: &mut Machine) -> DomainResult<()> {
        let machine_id = machine.id.to_string();
        let mut stmt = self
            .conn
            .prepare("SELECT operation_id FROM machine_capabilities WHERE machine_id = ?1")?;
        let capabilities: Vec<OperationId> = stmt
            .query_map([&machine_id], |row| {
                let operation: String = row.get(0)?;
                parse_id::<OperationId>(&operation)
            })?
            .collect::<rusqlite::Result<_>>()?;
        machine.capabilities = capabilities.into_iter().collect();

        let mut stmt = self.conn.prepare(
            "SELECT operation_id, skill_type, minimum_level, preferred_level,
                    years_experience_required, required_certifications
             FROM machine_skill_requirements WHERE machine_id = ?1",
        )?;
        let requirements: Vec<(OperationId, SkillRequirement)> = stmt
            .query_map([&machine_id], |row| {
                let operation: String = row.get("operation_id")?;
                let skill_type: String = row.get("skill_type")?;
                let certifications: String = row.get("required_certifications")?;
                let requirement = SkillRequirement::new(
                    skill_type,
                    row.get("minimum_level")?,
                    row.get("preferred_level")?,
                    row.get("years_experience_required")?,
                    parse_string_list(&certifications)?,
                )
                .map_err(|e| column_error(e.to_string()))?;
                Ok((parse_id::<OperationId>(&operation)?, requirement))
            })?
            .collect::<rusqlite::Result<_>>()?;
        for (operation, requirement) in requirements {
            machine.capabilities.insert(operation);
            machine
                .skill_requirements
                .entry(operation)
                .or_default()
                .push(requirement);
        }
        Ok(())
    }

    fn loaded(&self, mut machine: Machine) -> DomainResult<Machine> {
        self.load_details(&mut machine)?;
        Ok(machine)
    }
}

impl MachineRepository for SqliteMachineRepository<'_> {
    fn get_by_id(&self, id: MachineId) -> DomainResult<Option<Machine>> {
        let machine = self
            .conn
            .query_row(
                "SELECT * FROM machines WHERE id = ?1",
                [id.to_string()],
                Self::machine_from_row,
            )
            .optional()?;
        machine.map(|m| self.loaded(m)).transpose()
    }

    fn get_by_code(&self, machine_code: &str) -> DomainResult<Option<Machine>> {
        let machine = self
            .conn
            .query_row(
                "SELECT * FROM machines WHERE machine_code = ?1",
                [machine_code],
                Self::machine_from_row,
            )
            .optional()?;
        machine.map(|m| self.loaded(m)).transpose()
    }

    fn find_available(&self) -> DomainResult<Vec<Machine>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM machines WHERE status = 'AVAILABLE' ORDER BY machine_code")?;
        let machines: Vec<Machine> = stmt
            .query_map([], Self::machine_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        machines.into_iter().map(|m| self.loaded(m)).collect()
    }

    fn save(&mut self, machine: &Machine) -> DomainResult<()> {
        self.conn.execute(
            "INSERT INTO machines (id, machine_code, name, automation_level, status,
                 zone_id, cost_per_minute)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 machine_code = excluded.machine_code,
                 name = excluded.name,
                 automation_level = excluded.automation_level,
                 status = excluded.status,
                 zone_id = excluded.zone_id,
                 cost_per_minute = excluded.cost_per_minute",
            params![
                machine.id.to_string(),
                machine.machine_code,
                machine.name,
                automation_str(machine.automation_level),
                machine.status.to_string(),
                machine.zone_id.to_string(),
                machine.cost_per_minute.to_string(),
            ],
        )?;
        let machine_id = machine.id.to_string();
        self.conn.execute(
            "DELETE FROM machine_capabilities WHERE machine_id = ?1",
            [&machine_id],
        )?;
        self.conn.execute(
            "DELETE FROM machine_skill_requirements WHERE machine_id = ?1",
            [&machine_id],
        )?;
        for operation in &machine.capabilities {
            self.conn.execute(
                "INSERT INTO machine_capabilities (machine_id, operation_id) VALUES (?1, ?2)",
                params![machine_id, operation.to_string()],
            )?;
        }
        for (operation, requirements) in &machine.skill_requirements {
            for requirement in requirements {
                let certifications = serde_json::to_string(
                    &requirement.required_certifications().collect::<Vec<_>>(),
                )
                .unwrap_or_else(|_| "[]".into());
                self.conn.execute(
                    "INSERT INTO machine_skill_requirements
                         (machine_id, operation_id, skill_type, minimum_level,
                          preferred_level, years_experience_required, required_certifications)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        machine_id,
                        operation.to_string(),
                        requirement.skill_type(),
                        requirement.minimum_level(),
                        requirement.preferred_level(),
                        requirement.years_experience_required(),
                        certifications,
                    ],
                )?;
                register_skill(self.conn, requirement.skill_type())?;
            }
        }
        Ok(())
    }

    fn delete(&mut self, id: MachineId) -> DomainResult<()> {
        let affected = self
            .conn
            .execute("DELETE FROM machines WHERE id = ?1", [id.to_string()])?;
        if affected == 0 {
            return Err(SchedulingError::not_found("Machine", id));
        }
        Ok(())
    }
}

pub struct SqliteOperatorRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteOperatorRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn operator_from_row(row: &Row<'_>) -> rusqlite::Result<Operator> {
        let id: String = row.get("id")?;
        let status: String = row.get("status")?;
        let zone: String = row.get("zone_id")?;
        let rate: String = row.get("hourly_rate")?;
        Ok(Operator {
            id: parse_id::<OperatorId>(&id)?,
            employee_id: row.get("employee_id")?,
            name: row.get("name")?,
            status: parse_operator_status(&status)?,
            zone_id: parse_id::<ZoneId>(&zone)?,
            skills: Vec::new(),
            hourly_rate: parse_decimal(&rate)?,
        })
    }

    fn load_skills(&self, operator: &mut Operator) -> DomainResult<()> {
        let mut stmt = self.conn.prepare(
            "SELECT skill_type, level, years_experience, certifications
             FROM operator_skills WHERE operator_id = ?1 ORDER BY skill_type",
        )?;
        operator.skills = stmt
            .query_map([operator.id.to_string()], |row| {
                let skill_type: String = row.get("skill_type")?;
                let certifications: String = row.get("certifications")?;
                Skill::new(
                    skill_type,
                    row.get("level")?,
                    row.get("years_experience")?,
                    parse_string_list(&certifications)?,
                )
                .map_err(|e| column_error(e.to_string()))
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(())
    }

    fn loaded(&self, mut operator: Operator) -> DomainResult<Operator> {
        self.load_skills(&mut operator)?;
        Ok(operator)
    }
}

impl OperatorRepository for SqliteOperatorRepository<'_> {
    fn get_by_id(&self, id: OperatorId) -> DomainResult<Option<Operator>> {
        let operator = self
            .conn
            .query_row(
                "SELECT * FROM operators WHERE id = ?1",
                [id.to_string()],
                Self::operator_from_row,
            )
            .optional()?;
        operator.map(|o| self.loaded(o)).transpose()
    }

    fn get_by_employee_id(&self, employee_id: &str) -> DomainResult<Option<Operator>> {
        let operator = self
            .conn
            .query_row(
                "SELECT * FROM operators WHERE employee_id = ?1",
                [employee_id],
                Self::operator_from_row,
            )
            .optional()?;
        operator.map(|o| self.loaded(o)).transpose()
    }

    fn find_available(&self) -> DomainResult<Vec<Operator>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM operators WHERE status = 'AVAILABLE' ORDER BY employee_id")?;
        let operators: Vec<Operator> = stmt
            .query_map([], Self::operator_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        operators.into_iter().map(|o| self.loaded(o)).collect()
    }

    fn save(&mut self, operator: &Operator) -> DomainResult<()> {
        self.conn.execute(
            "INSERT INTO operators (id, employee_id, name, status, zone_id, hourly_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 employee_id = excluded.employee_id,
                 name = excluded.name,
                 status = excluded.status,
                 zone_id = excluded.zone_id,
                 hourly_rate = excluded.hourly_rate",
            params![
                operator.id.to_string(),
                operator.employee_id,
                operator.name,
                operator.status.to_string(),
                operator.zone_id.to_string(),
                operator.hourly_rate.to_string(),
            ],
        )?;
        let operator_id = operator.id.to_string();
        self.conn.execute(
            "DELETE FROM operator_skills WHERE operator_id = ?1",
            [&operator_id],
        )?;
        for skill in &operator.skills {
            let certifications =
                serde_json::to_string(&skill.certifications().collect::<Vec<_>>())
                    .unwrap_or_else(|_| "[]".into());
            self.conn.execute(
                "INSERT INTO operator_skills
                     (operator_id, skill_type, level, years_experience, certifications)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    operator_id,
                    skill.skill_type(),
                    skill.level(),
                    skill.years_experience(),
                    certifications,
                ],
            )?;
            register_skill(self.conn, skill.skill_type())?;
        }
        Ok(())
    }

    fn delete(&mut self, id: OperatorId) -> DomainResult<()> {
        let affected = self
            .conn
            .execute("DELETE FROM operators WHERE id = ?1", [id.to_string()])?;
        if affected == 0 {
            return Err(SchedulingError::not_found("Operator", id));
        }
        Ok(())
    }
}

pub struct SqliteZoneRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteZoneRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn zone_from_row(row: &Row<'_>) -> rusqlite::Result<ProductionZone> {
        let id: String = row.get("id")?;
        Ok(ProductionZone {
            id: parse_id::<ZoneId>(&id)?,
            zone_code: row.get("zone_code")?,
            name: row.get("name")?,
            wip_limit: row.get("wip_limit")?,
        })
    }
}

impl ZoneRepository for SqliteZoneRepository<'_> {
    fn get_by_id(&self, id: ZoneId) -> DomainResult<Option<ProductionZone>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM production_zones WHERE id = ?1",
                [id.to_string()],
                Self::zone_from_row,
            )
            .optional()?)
    }

    fn get_all(&self) -> DomainResult<Vec<ProductionZone>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM production_zones ORDER BY zone_code")?;
        let result = stmt
            .query_map([], Self::zone_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(result)
    }

    fn save(&mut self, zone: &ProductionZone) -> DomainResult<()> {
        self.conn.execute(
            "INSERT INTO production_zones (id, zone_code, name, wip_limit)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 zone_code = excluded.zone_code,
                 name = excluded.name,
                 wip_limit = excluded.wip_limit",
            params![
                zone.id.to_string(),
                zone.zone_code,
                zone.name,
                zone.wip_limit,
            ],
        )?;
        Ok(())
    }
}

fn register_skill(conn: &Connection, skill_type: &str) -> DomainResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO skills (skill_type) VALUES (?1)",
        [skill_type],
    )?;
    Ok(())
}

fn column_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, message.into())
}

fn parse_id<T: std::str::FromStr<Err = uuid::Error>>(text: &str) -> rusqlite::Result<T> {
    text.parse()
        .map_err(|e: uuid::Error| column_error(format!("invalid id '{text}': {e}")))
}

fn parse_decimal(text: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(text).map_err(|e| column_error(format!("invalid decimal '{text}': {e}")))
}

fn parse_string_list(text: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(text).map_err(|e| column_error(format!("invalid list '{text}': {e}")))
}

fn parse_automation(text: &str) -> rusqlite::Result<AutomationLevel> {
    match text {
        "MANUAL" => Ok(AutomationLevel::Manual),
        "SEMI_AUTOMATIC" => Ok(AutomationLevel::SemiAutomatic),
        "FULLY_AUTOMATIC" => Ok(AutomationLevel::FullyAutomatic),
        other => Err(column_error(format!("unknown automation level '{other}'"))),
    }
}

fn automation_str(level: AutomationLevel) -> &'static str {
    match level {
        AutomationLevel::Manual => "MANUAL",
        AutomationLevel::SemiAutomatic => "SEMI_AUTOMATIC",
        AutomationLevel::FullyAutomatic => "FULLY_AUTOMATIC",
    }
}

fn parse_machine_status(text: &str) -> rusqlite::Result<MachineStatus> {
    match text {
        "AVAILABLE" => Ok(MachineStatus::Available),
        "BUSY" => Ok(MachineStatus::Busy),
        "MAINTENANCE" => Ok(MachineStatus::Maintenance),
        "OFFLINE" => Ok(MachineStatus::Offline),
        other => Err(column_error(format!("unknown machine status '{other}'"))),
    }
}

fn parse_operator_status(text: &str) -> rusqlite::Result<OperatorStatus> {
    match text {
        "AVAILABLE" => Ok(OperatorStatus::Available),
        "ASSIGNED" => Ok(OperatorStatus::Assigned),
        "ABSENT" => Ok(OperatorStatus::Absent),
        "ON_BREAK" => Ok(OperatorStatus::OnBreak),
        other => Err(column_error(format!("unknown operator status '{other}'"))),
    }
}
