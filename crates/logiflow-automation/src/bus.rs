//! In-process event bus.
//!
//! `publish` awaits every interested handler before returning, so the rule
//! matcher runs on the publisher's task. Handlers must bound their own work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::event::SystemEvent;

/// Receives published events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &SystemEvent);
}

/// Filter on `(event_type, entity_type)`.
pub type EventFilter = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
}

/// Publish/subscribe hub for [`SystemEvent`]s.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe `handler` to events accepted by `filter(event_type, entity_type)`.
    pub fn subscribe<F>(&self, filter: F, handler: Arc<dyn EventHandler>) -> SubscriptionId
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sub = Subscription {
            id,
            filter: Box::new(filter),
            handler,
        };
        match self.subscriptions.write() {
            Ok(mut subs) => subs.push(sub),
            Err(poisoned) => poisoned.into_inner().push(sub),
        }
        id
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.subscribe(|_, _| true, handler)
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = match self.subscriptions.write() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() < before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Deliver `event` to every matching handler, in subscription order.
    /// Returns the number of handlers invoked.
    pub async fn publish(&self, event: &SystemEvent) -> usize {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subs = match self.subscriptions.read() {
                Ok(subs) => subs,
                Err(poisoned) => poisoned.into_inner(),
            };
            subs.iter()
                .filter(|s| (s.filter)(&event.event_type, &event.entity_type))
                .map(|s| s.handler.clone())
                .collect()
        };

        tracing::debug!(
            "📨 Publishing {} ({}:{}) to {} handler(s)",
            event.event_type,
            event.entity_type,
            event.entity_id,
            handlers.len()
        );
        for handler in &handlers {
            handler.handle(event).await;
        }
        handlers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
