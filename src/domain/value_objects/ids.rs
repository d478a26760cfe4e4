//! Typed identifiers for aggregates and entities.
//!
//! Every identity is an opaque 128-bit UUID wrapped in a newtype so that
//! a `TaskId` can never be passed where a `JobId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID (e.g. one read back from storage).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(
    /// Identity of a [`Job`](crate::domain::entities::Job) aggregate.
    JobId
);
define_id!(
    /// Identity of a [`Task`](crate::domain::entities::Task) within a job.
    TaskId
);
define_id!(
    /// Identity of a machine resource.
    MachineId
);
define_id!(
    /// Identity of an operator resource.
    OperatorId
);
define_id!(
    /// Identity of an operation in the external operation catalog.
    OperationId
);
define_id!(
    /// Identity of a production zone (WIP accounting unit).
    ZoneId
);
define_id!(
    /// Identity of a [`Schedule`](crate::domain::entities::Schedule) aggregate.
    ScheduleId
);
define_id!(
    /// Identity of an operator-to-task assignment record.
    AssignmentId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_roundtrip_via_str() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_serde_transparent() {
        let id = MachineId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: MachineId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
