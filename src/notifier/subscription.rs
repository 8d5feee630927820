use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NotifierError, NotifierResult};
use crate::event::Event;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Receive side of a subscription.
///
/// Events arrive in non-decreasing sequence-id order. The channel is bounded:
/// a subscriber that stops draining it eventually stalls the poll loop, so
/// consumers must keep up or configure a larger capacity. Once the notifier has
/// stopped or the subscription is removed, the channel disconnects after the
/// buffered events have been drained.
///
/// Dropping a `Subscription` does not unsubscribe immediately; the registry
/// prunes it the next time an event for it fails to deliver.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<Event>,
}

impl Subscription {
    pub(crate) const fn new(id: SubscriptionId, rx: Receiver<Event>) -> Self {
        Self { id, rx }
    }

    /// The identity to pass to [`Notifier::unsubscribe`](super::Notifier::unsubscribe).
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The underlying channel, for use in `select!`.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<Event> {
        &self.rx
    }

    /// Splits into identity and channel.
    #[must_use]
    pub fn into_parts(self) -> (SubscriptionId, Receiver<Event>) {
        (self.id, self.rx)
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> NotifierResult<Event> {
        self.rx.recv().map_err(|_| NotifierError::SubscriptionClosed { id: self.id })
    }

    /// Receive the next event, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    pub fn recv_timeout(&self, timeout: Duration) -> NotifierResult<Option<Event>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(NotifierError::SubscriptionClosed { id: self.id }),
        }
    }

    /// Receive an already-buffered event, if any.
    ///
    /// Returns `Ok(None)` when nothing is buffered.
    pub fn try_recv(&self) -> NotifierResult<Option<Event>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(NotifierError::SubscriptionClosed { id: self.id }),
        }
    }
}
