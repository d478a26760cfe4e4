//! Production zone entity.
//!
//! A zone groups machines for work-in-progress accounting: at any instant
//! at most `wip_limit` tasks may run concurrently inside one zone.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::ZoneId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionZone {
    pub id: ZoneId,
    /// Unique business key, e.g. `"WELD"`.
    pub zone_code: String,
    pub name: String,
    pub wip_limit: u32,
}

impl ProductionZone {
    pub fn new(zone_code: impl Into<String>, name: impl Into<String>, wip_limit: u32) -> Self {
        Self {
            id: ZoneId::new(),
            zone_code: zone_code.into(),
            name: name.into(),
            wip_limit,
        }
    }
}
