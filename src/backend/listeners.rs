//! Session-change listener registry with disposable subscriptions.
//!
//! DESIGN
//! ======
//! Each subscriber gets its own unbounded queue, so every event is delivered
//! exactly once and in emission order. A [`Subscription`] removes itself from
//! the registry when dropped; there is no way to leak a listener by
//! forgetting to unsubscribe.

#[cfg(test)]
#[path = "listeners_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::model::SessionEvent;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<SessionEvent>>,
}

/// Registry owned by a backend; hands out subscriptions and fans out events.
#[derive(Clone, Default)]
pub struct SessionListeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl SessionListeners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let id = table.next_id;
        table.next_id += 1;
        table.senders.insert(id, tx);
        tracing::debug!(listener = id, active = table.senders.len(), "session listener subscribed");
        Subscription { id, events: rx, table: Arc::downgrade(&self.table) }
    }

    /// Deliver `event` to every live listener.
    pub fn emit(&self, event: &SessionEvent) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.senders.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for one registered listener. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    table: Weak<Mutex<ListenerTable>>,
}

impl Subscription {
    /// Wait for the next event. `None` once the owning backend is gone.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Release the listener now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
            table.senders.remove(&self.id);
            tracing::debug!(listener = self.id, active = table.senders.len(), "session listener released");
        }
    }
}
