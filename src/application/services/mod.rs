pub mod health;
pub mod optimization_service;

pub use health::ServiceStats;
pub use optimization_service::{OptimizationService, PersistenceGateway, RosterSnapshot};
