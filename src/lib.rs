pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod resilience;
pub mod solver;

pub use application::dto;
pub use application::services::OptimizationService;
pub use domain::entities;
pub use domain::value_objects;
pub use infrastructure::events;
pub use infrastructure::persistence;
