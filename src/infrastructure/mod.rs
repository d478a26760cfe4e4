pub mod events;
pub mod import;
pub mod persistence;
pub mod repositories;
