//! Cross-cutting notifications for authorization failures.
//!
//! Hosts subscribe to react globally, for example to force a fresh login on
//! `Unauthorized`, without every call site handling the error itself.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Broadcast by the engine when a call is classified as 401 or 403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    Unauthorized,
    Prohibited { message: String },
}

type Listener = Arc<dyn Fn(&NetEvent) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Observer registry owned by one `ApiClient`.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<SubscriptionId, Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&NetEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().insert(id, Arc::new(listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Notify listeners in subscription order. The lock is released before
    /// any listener runs, so listeners may subscribe or unsubscribe.
    pub fn publish(&self, event: &NetEvent) {
        let listeners: Vec<Listener> = self.listeners.read().values().cloned().collect();
        tracing::debug!(?event, listeners = listeners.len(), "publishing event");
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
