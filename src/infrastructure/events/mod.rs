pub mod event_bus;
pub mod publisher;

pub use event_bus::{AsyncEventHandler, EventBus, EventHandler, DEFAULT_HISTORY_SIZE};
pub use publisher::EventPublisher;
