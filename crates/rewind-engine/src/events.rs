//! Observable history events and the observer list that delivers them.
//!
//! Events are fire-and-forget: observers cannot veto or acknowledge them.
//! The only ordering guarantee is that a refused rollback emits
//! [`HistoryEvent::RollbackBlocked`] and never a `RollbackPerformed` in the
//! same call.

use std::fmt;

use serde::Serialize;

/// Something UI affordances or analytics may want to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// A rollback started applying a snapshot `steps` positions back.
    RollbackPerformed { steps: usize },
    /// A rollforward started applying a snapshot `steps` positions forward.
    RollforwardPerformed { steps: usize },
    /// The lock gate was engaged, or refused a rollback.
    RollbackBlocked,
    /// The lock gate was released (explicitly or because the locked
    /// snapshot left the history).
    RollbackUnblocked,
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&HistoryEvent)>;

/// Ordered list of observers.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    observers: Vec<(SubscriptionId, Observer)>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&HistoryEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn emit(&mut self, event: HistoryEvent) {
        tracing::trace!(?event, observers = self.observers.len(), "history event");
        for (_, observer) in &mut self.observers {
            observer(&event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}
