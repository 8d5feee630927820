//! Subscription registry and batch dispatch.
//!
//! All mutations and the dispatch read are serialized by one mutex. Dispatch
//! holds it for a whole batch, so a subscriber is never added or removed in the
//! middle of one: a subscriber registered while a batch is dispatching sees
//! none of that batch and starts with the next one.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Sender};
use log::debug;

use crate::error::{NotifierError, NotifierResult, ValidationError};
use crate::event::{Event, EventKind};

use super::subscription::{Subscription, SubscriptionId};

#[derive(Debug)]
struct Subscriber {
    interest: HashSet<EventKind>,
    tx: Sender<Event>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    subscribers: HashMap<SubscriptionId, Subscriber>,
    closed: bool,
}

/// Outcome of dispatching one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events handed to subscriber channels (one per matching subscriber).
    pub delivered: usize,
    /// Subscribers removed because their receiver was dropped.
    pub pruned: usize,
}

/// Concurrent map of subscribers with their interest filters.
///
/// # Backpressure
///
/// Delivery uses a blocking send on each subscriber's bounded channel while the
/// registry lock is held. A subscriber that stops draining its channel stalls
/// dispatch to everyone, and with it the poll loop. Events are never dropped to
/// work around a slow subscriber.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

impl SubscriptionRegistry {
    /// Creates an empty registry whose subscriber channels hold `capacity`
    /// events (0 makes every delivery a rendezvous).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscriber for the given event kinds.
    pub fn subscribe(&self, interest: impl IntoIterator<Item = EventKind>) -> NotifierResult<Subscription> {
        let interest: HashSet<EventKind> = interest.into_iter().collect();
        if interest.is_empty() {
            return Err(ValidationError::EmptyInterest.into());
        }

        let (tx, rx) = bounded::<Event>(self.capacity);
        let id = SubscriptionId::new();

        let mut inner = self.lock();
        if inner.closed {
            return Err(NotifierError::ShutdownInProgress);
        }
        debug!("subscription {id} registered for {interest:?}");
        inner.subscribers.insert(id, Subscriber { interest, tx });
        Ok(Subscription::new(id, rx))
    }

    /// Removes a subscriber. Returns false if it was not registered.
    ///
    /// Events already buffered in its channel remain readable; the channel then
    /// disconnects.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!("subscription {id} removed");
        }
        removed
    }

    /// Delivers `events`, in order, to every subscriber interested in each
    /// event's kind.
    ///
    /// Subscribers whose receiver has been dropped are removed after the batch.
    pub fn dispatch(&self, events: &[Event]) -> DispatchReport {
        let mut report = DispatchReport::default();
        if events.is_empty() {
            return report;
        }

        let mut inner = self.lock();
        let mut dead: HashSet<SubscriptionId> = HashSet::new();

        for event in events {
            let kind = event.kind();
            for (id, sub) in &inner.subscribers {
                if !sub.interest.contains(&kind) || dead.contains(id) {
                    continue;
                }
                if sub.tx.send(event.clone()).is_ok() {
                    report.delivered += 1;
                } else {
                    dead.insert(*id);
                }
            }
        }

        for id in &dead {
            inner.subscribers.remove(id);
            debug!("subscription {id} pruned: receiver dropped");
        }
        report.pruned = dead.len();
        report
    }

    /// Rejects further subscriptions and drops every subscriber's sender.
    ///
    /// Returns the number of subscribers that were registered.
    pub fn close(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let count = inner.subscribers.len();
        inner.subscribers.clear();
        count
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Returns true if no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
