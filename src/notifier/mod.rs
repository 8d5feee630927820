//! Notifier core: long-polling loop, cursor tracking and subscriber fan-out.
//!
//! A [`Notifier`] is constructed explicitly around an [`UpdateSource`] and
//! owned by the application. Subscriptions can be registered before or while
//! the poll loop runs:
//!
//! ```rust,ignore
//! use telenotify::{CancellationToken, EventKind, Notifier, NotifierConfig};
//!
//! let notifier = Notifier::new(source, NotifierConfig::default())?;
//! let messages = notifier.subscribe([EventKind::Message])?;
//!
//! let token = CancellationToken::new();
//! let handle = notifier.run(token.clone())?;   // returns immediately
//!
//! while let Ok(event) = messages.recv() {
//!     // ...
//! }
//!
//! token.cancel();
//! handle.join()?;                              // blocks until Stopped
//! ```

/// Lifecycle state machine and cancellation.
pub mod lifecycle;
/// Poll loop worker.
mod poller;
/// Subscriber registry and dispatch.
pub mod registry;
/// Subscription handle.
pub mod subscription;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::warn;

use crate::error::{NotifierError, NotifierResult, ValidationError};
use crate::event::EventKind;
use crate::source::UpdateSource;

pub use lifecycle::{CancellationToken, LifecycleState, RunHandle};
pub use registry::{DispatchReport, SubscriptionRegistry};
pub use subscription::{Subscription, SubscriptionId};

use lifecycle::Lifecycle;
use poller::Poller;

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Wait between the end of one tick and the start of the next.
    pub poll_interval: Duration,
    /// Per-subscription channel capacity. 0 makes each delivery a rendezvous.
    pub subscriber_capacity: usize,
    /// Cursor value to start from; the first fetch asks for `initial_cursor + 1`.
    pub initial_cursor: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            subscriber_capacity: 1024,
            initial_cursor: 0,
        }
    }
}

impl NotifierConfig {
    /// Checks the configuration for values the poll loop cannot run with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval.is_zero() {
            return Err(ValidationError::InvalidConfig {
                field: "poll_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// State shared between the facade and the poll loop thread.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) lifecycle: Lifecycle,
    /// Read-only mirror of the poll loop's cursor.
    pub(crate) cursor: AtomicU64,
    pub(crate) error_tx: Sender<NotifierError>,
    pub(crate) error_rx: Receiver<NotifierError>,
}

impl Shared {
    pub(crate) fn new(subscriber_capacity: usize, initial_cursor: u64) -> Self {
        let (error_tx, error_rx) = unbounded();
        Self {
            registry: SubscriptionRegistry::new(subscriber_capacity),
            lifecycle: Lifecycle::new(),
            cursor: AtomicU64::new(initial_cursor),
            error_tx,
            error_rx,
        }
    }
}

/// Polls an upstream source and fans events out to subscribers.
pub struct Notifier {
    cfg: NotifierConfig,
    source: Arc<dyn UpdateSource>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("cfg", &self.cfg)
            .field("state", &self.state())
            .field("cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Creates an idle notifier.
    pub fn new(source: impl UpdateSource + 'static, cfg: NotifierConfig) -> NotifierResult<Self> {
        cfg.validate()?;
        let shared = Arc::new(Shared::new(cfg.subscriber_capacity, cfg.initial_cursor));
        Ok(Self {
            cfg,
            source: Arc::new(source),
            shared,
        })
    }

    /// Creates an idle notifier polling the public bot API with `token`.
    #[cfg(feature = "http")]
    pub fn for_bot(token: impl Into<String>) -> NotifierResult<Self> {
        let source = crate::transport::HttpUpdateSource::new(crate::transport::HttpSourceConfig::with_token(token))?;
        Self::new(source, NotifierConfig::default())
    }

    /// The configuration this notifier was built with.
    #[must_use]
    pub const fn config(&self) -> &NotifierConfig {
        &self.cfg
    }

    /// Registers a subscriber for the given event kinds.
    ///
    /// Safe to call concurrently with dispatch. A subscriber registered while a
    /// batch is being dispatched receives none of that batch.
    pub fn subscribe(&self, interest: impl IntoIterator<Item = EventKind>) -> NotifierResult<Subscription> {
        self.shared.lifecycle.ensure_accepting()?;
        self.shared.registry.subscribe(interest)
    }

    /// Removes a subscriber. Unknown or already removed ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> NotifierResult<()> {
        self.shared.lifecycle.ensure_accepting()?;
        self.shared.registry.unsubscribe(id);
        Ok(())
    }

    /// Starts the poll loop on a dedicated thread and returns immediately.
    ///
    /// The loop runs until `token` is cancelled. Use the returned handle to wait
    /// for it to reach [`LifecycleState::Stopped`]. A notifier runs at most once.
    pub fn run(&self, token: CancellationToken) -> NotifierResult<RunHandle> {
        self.shared.lifecycle.start(token.clone())?;

        let poller = Poller::new(
            Arc::clone(&self.source),
            Arc::clone(&self.shared),
            self.cfg.initial_cursor,
            self.cfg.poll_interval,
        );

        let spawned = thread::Builder::new()
            .name("telenotify-poll".to_string())
            .spawn(move || poller.run(token));

        match spawned {
            Ok(join) => Ok(RunHandle::new(join)),
            Err(err) => {
                self.shared.registry.close();
                self.shared.lifecycle.mark_stopped();
                warn!("poll loop failed to start: {err}");
                Err(NotifierError::internal(format!("failed to spawn poll loop: {err}")))
            }
        }
    }

    /// Channel of poll failures. Every failed tick produces one error.
    ///
    /// All clones share the same queue; each error is received once.
    #[must_use]
    pub fn errors(&self) -> Receiver<NotifierError> {
        self.shared.error_rx.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    /// Last delivered sequence id, as last published by the poll loop.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.shared.cursor.load(Ordering::Acquire)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.len()
    }
}
