//! In-flight request handles and the registry that can cancel them in bulk.
//!
//! # Design
//! The registry is the only shared mutable state in the engine. It sits
//! behind a reader-writer lock: `insert`, `cancel_all` and `prune` take the
//! write side, `count` and `handles` take the read side and may overlap each
//! other. `cancel_all` swaps the collection out under the write lock and
//! cancels the detached handles afterwards, so cancellation never runs with
//! the lock held.
//!
//! Handles are not removed when their request completes. They stay until a
//! bulk cancel, or until the host calls `prune`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const COMPLETED: u8 = 2;

/// One executing call.
///
/// Cancellation is cooperative: the transport task is told to stop and the
/// resulting `Cancelled` error still arrives through the normal delivery
/// path.
#[derive(Debug)]
pub struct RequestHandle {
    id: Uuid,
    state: AtomicU8,
    token: CancellationToken,
}

impl RequestHandle {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(RUNNING),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True until the request completes or is cancelled.
    pub fn is_alive(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Tell the transport task to stop. Has no effect once the request has
    /// completed.
    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(id = %self.id, "cancelling request");
            self.token.cancel();
        }
    }

    /// Mark the transport as settled. Returns false if the handle was
    /// cancelled first.
    pub(crate) fn complete(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Thread-safe, insertion-ordered set of in-flight handles.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    handles: RwLock<Vec<Arc<RequestHandle>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<RequestHandle>) {
        self.handles.write().push(handle);
    }

    pub fn count(&self) -> usize {
        self.handles.read().len()
    }

    /// Snapshot of the registered handles, in insertion order.
    pub fn handles(&self) -> Vec<Arc<RequestHandle>> {
        self.handles.read().clone()
    }

    /// Cancel every registered handle and clear the registry. Handles inserted
    /// concurrently may or may not be part of this pass.
    pub fn cancel_all(&self) {
        let drained = std::mem::take(&mut *self.handles.write());
        tracing::debug!(count = drained.len(), "cancelling all in-flight requests");
        for handle in &drained {
            handle.cancel();
        }
    }

    /// Drop handles that are no longer alive. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut handles = self.handles.write();
        let before = handles.len();
        handles.retain(|h| h.is_alive());
        before - handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn new_handle_is_alive() {
        let handle = RequestHandle::new();
        assert!(handle.is_alive());
        assert!(!handle.is_cancelled());
        assert!(!handle.token().is_cancelled());
    }

    #[test]
    fn cancel_stops_handle_and_token() {
        let handle = RequestHandle::new();
        handle.cancel();
        assert!(!handle.is_alive());
        assert!(handle.is_cancelled());
        assert!(handle.token().is_cancelled());
        assert!(!handle.complete());
    }

    #[test]
    fn cancel_after_completion_is_noop() {
        let handle = RequestHandle::new();
        assert!(handle.complete());
        handle.cancel();
        assert!(!handle.is_cancelled());
        assert!(!handle.token().is_cancelled());
    }

    #[test]
    fn handle_ids_are_unique() {
        assert_ne!(RequestHandle::new().id(), RequestHandle::new().id());
    }

    #[test]
    fn cancel_all_cancels_and_clears() {
        let registry = RequestRegistry::new();
        let handles: Vec<_> = (0..5).map(|_| Arc::new(RequestHandle::new())).collect();
        for h in &handles {
            registry.insert(h.clone());
        }
        assert_eq!(registry.count(), 5);

        registry.cancel_all();

        assert_eq!(registry.count(), 0);
        assert!(handles.iter().all(|h| !h.is_alive()));
    }

    #[test]
    fn completed_handles_are_retained_until_pruned() {
        let registry = RequestRegistry::new();
        let done = Arc::new(RequestHandle::new());
        let running = Arc::new(RequestHandle::new());
        registry.insert(done.clone());
        registry.insert(running.clone());
        done.complete();

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.handles()[0].id(), running.id());
    }

    #[test]
    fn cancel_all_races_with_concurrent_inserts() {
        let registry = Arc::new(RequestRegistry::new());
        let before: Vec<_> = (0..64).map(|_| Arc::new(RequestHandle::new())).collect();
        for h in &before {
            registry.insert(h.clone());
        }

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        registry.insert(Arc::new(RequestHandle::new()));
                    }
                })
            })
            .collect();
        registry.cancel_all();
        for w in writers {
            w.join().unwrap();
        }

        assert!(before.iter().all(|h| !h.is_alive()));
        assert!(registry.count() <= 1000);
        registry.cancel_all();
        assert_eq!(registry.count(), 0);
    }
}
