//! Post-commit event publication.
//!
//! The publisher takes the events a unit of work hands back at commit and
//! pushes them through the bus in the order the aggregates produced them.
//! Publication is best effort: handler failures are isolated and logged
//! by the bus, never surfaced to the committing caller.

use std::sync::Arc;
use tracing::debug;

use crate::domain::events::DomainEvent;
use crate::infrastructure::events::event_bus::EventBus;

#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<EventBus>,
}

impl EventPublisher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Publishes committed events synchronously, preserving order.
    pub fn publish_committed(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        debug!(count = events.len(), "publishing committed events");
        for event in events {
            self.bus.publish(&event);
        }
    }

    /// Publishes committed events through the async path, one at a time
    /// so aggregate order is preserved for sync subscribers.
    pub async fn publish_committed_async(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        debug!(count = events.len(), "publishing committed events (async)");
        for event in events {
            self.bus.publish_async(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{EventKind, EventPayload};
    use crate::domain::value_objects::JobId;
    use std::sync::Mutex;

    fn event(number: &str) -> DomainEvent {
        DomainEvent::new(
            chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            EventPayload::JobCreated {
                job_id: JobId::new(),
                job_number: number.into(),
            },
        )
    }

    #[test]
    fn test_publishes_in_aggregate_order() {
        let bus = Arc::new(EventBus::new(10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(
            EventKind::JobCreated,
            Arc::new(move |e: &DomainEvent| {
                if let EventPayload::JobCreated { job_number, .. } = &e.payload {
                    sink.lock().unwrap().push(job_number.clone());
                }
            }),
        );
        let publisher = EventPublisher::new(bus);
        publisher.publish_committed(vec![event("A"), event("B"), event("C")]);
        assert_eq!(*seen.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let bus = Arc::new(EventBus::new(10));
        let publisher = EventPublisher::new(bus.clone());
        publisher.publish_committed(Vec::new());
        assert!(bus.history(None).is_empty());
    }
}
