pub mod gateway;
pub mod job_repository;
pub mod resource_repository;
pub mod schedule_repository;
pub mod schema;
pub mod unit_of_work;

pub use gateway::SqliteGateway;
pub use job_repository::SqliteJobRepository;
pub use resource_repository::{
    SqliteMachineRepository, SqliteOperatorRepository, SqliteZoneRepository,
};
pub use schedule_repository::SqliteScheduleRepository;
pub use unit_of_work::{
    transactional, TransactionMetrics, TransactionState, TxRetryConfig, UnitOfWork,
};
