pub mod in_memory;

pub use in_memory::{
    InMemoryGateway, InMemoryJobRepository, InMemoryMachineRepository,
    InMemoryOperatorRepository, InMemoryScheduleRepository, InMemoryZoneRepository,
};
