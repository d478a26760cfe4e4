pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;
