//! In-process event bus.
//!
//! Typed publish/subscribe keyed by [`EventKind`]. Synchronous publication
//! dispatches handlers in subscription order and isolates each handler: a
//! panicking handler is logged and never blocks the rest. Asynchronous
//! publication runs sync handlers on the blocking pool and async handlers
//! concurrently; ordering between independent async handlers is not
//! guaranteed. A bounded FIFO history of published events is kept for
//! debugging.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::domain::events::{DomainEvent, EventKind};

/// Default bound of the event history buffer.
pub const DEFAULT_HISTORY_SIZE: usize = 1_000;

/// Synchronous event handler.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DomainEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&DomainEvent) + Send + Sync,
{
    fn handle(&self, event: &DomainEvent) {
        self(event)
    }
}

/// Asynchronous event handler.
#[async_trait]
pub trait AsyncEventHandler: Send + Sync {
    async fn handle(&self, event: DomainEvent);
}

/// In-memory typed pub/sub with a bounded history.
pub struct EventBus {
    sync_handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    async_handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn AsyncEventHandler>>>>,
    history: Mutex<VecDeque<DomainEvent>>,
    max_history: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl EventBus {
    pub fn new(max_history: usize) -> Self {
        Self {
            sync_handlers: RwLock::new(HashMap::new()),
            async_handlers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            max_history,
        }
    }

    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.sync_handlers
            .write()
            .expect("handler lock poisoned")
            .entry(kind)
            .or_default()
            .push(handler);
        info!(?kind, "handler subscribed");
    }

    pub fn subscribe_async(&self, kind: EventKind, handler: Arc<dyn AsyncEventHandler>) {
        self.async_handlers
            .write()
            .expect("handler lock poisoned")
            .entry(kind)
            .or_default()
            .push(handler);
        info!(?kind, "async handler subscribed");
    }

    pub fn clear_handlers(&self, kind: Option<EventKind>) {
        match kind {
            Some(kind) => {
                self.sync_handlers
                    .write()
                    .expect("handler lock poisoned")
                    .remove(&kind);
                self.async_handlers
                    .write()
                    .expect("handler lock poisoned")
                    .remove(&kind);
            }
            None => {
                self.sync_handlers
                    .write()
                    .expect("handler lock poisoned")
                    .clear();
                self.async_handlers
                    .write()
                    .expect("handler lock poisoned")
                    .clear();
            }
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        let sync = self
            .sync_handlers
            .read()
            .expect("handler lock poisoned")
            .get(&kind)
            .map_or(0, Vec::len);
        let asynchronous = self
            .async_handlers
            .read()
            .expect("handler lock poisoned")
            .get(&kind)
            .map_or(0, Vec::len);
        sync + asynchronous
    }

    fn record(&self, event: &DomainEvent) {
        let mut history = self.history.lock().expect("history lock poisoned");
        history.push_back(event.clone());
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Publishes synchronously: handlers run in subscription order, each
    /// isolated from the others' failures.
    pub fn publish(&self, event: &DomainEvent) {
        self.record(event);
        let handlers = self
            .sync_handlers
            .read()
            .expect("handler lock poisoned")
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            debug!(kind = ?event.kind(), "no handlers registered");
            return;
        }
        debug!(kind = ?event.kind(), handlers = handlers.len(), "publishing event");
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler.handle(event))).is_err() {
                error!(kind = ?event.kind(), "event handler panicked; continuing");
            }
        }
    }

    /// Publishes asynchronously: sync handlers on the blocking pool, async
    /// handlers awaited concurrently. Failures are logged, never raised.
    pub async fn publish_async(&self, event: DomainEvent) {
        self.record(&event);
        let kind = event.kind();
        let sync_handlers = self
            .sync_handlers
            .read()
            .expect("handler lock poisoned")
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        let async_handlers = self
            .async_handlers
            .read()
            .expect("handler lock poisoned")
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let blocking_tasks: Vec<_> = sync_handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                tokio::task::spawn_blocking(move || {
                    if catch_unwind(AssertUnwindSafe(|| handler.handle(&event))).is_err() {
                        error!(?kind, "event handler panicked; continuing");
                    }
                })
            })
            .collect();
        for joined in join_all(blocking_tasks).await {
            if joined.is_err() {
                error!(?kind, "event handler task failed to join");
            }
        }

        let futures: Vec<_> = async_handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                async move { handler.handle(event).await }
            })
            .collect();
        join_all(futures).await;
    }

    /// Published events, oldest first, optionally filtered by kind.
    pub fn history(&self, kind: Option<EventKind>) -> Vec<DomainEvent> {
        let history = self.history.lock().expect("history lock poisoned");
        history
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind() == k))
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().expect("history lock poisoned").clear();
    }
}
