//! Lifecycle state machine and cooperative cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::error::{NotifierError, NotifierResult};

/// Lifecycle of a notifier: `Idle -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed; subscriptions accepted, no poll loop yet.
    Idle,
    /// Poll loop active.
    Running,
    /// Cancellation observed; the in-flight tick is finishing.
    Stopping,
    /// Poll loop exited. Terminal.
    Stopped,
}

impl LifecycleState {
    /// Returns true if subscribe/unsubscribe are still accepted.
    #[must_use]
    pub const fn accepts_subscriptions(self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Cloneable cooperative cancellation token.
///
/// Cancelling is idempotent and visible to every clone. The channel returned by
/// [`CancellationToken::signal`] never carries a message; it disconnects once the
/// token is cancelled, which makes it usable as a `select!` arm.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug)]
struct TokenInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the only sender disconnects every clone of the signal.
        let mut trigger = self.inner.trigger.lock().unwrap_or_else(PoisonError::into_inner);
        drop(trigger.take());
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Channel that becomes disconnected when the token is cancelled.
    #[must_use]
    pub fn signal(&self) -> Receiver<()> {
        self.inner.signal.clone()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared lifecycle bookkeeping between the notifier facade and its worker.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Mutex<LifecycleState>,
    token: Mutex<Option<CancellationToken>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Idle),
            token: Mutex::new(None),
        }
    }

    /// Current state. A running notifier whose token has been cancelled reports
    /// `Stopping` even before the worker has observed it.
    pub(crate) fn state(&self) -> LifecycleState {
        let state = *self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state == LifecycleState::Running && self.token_cancelled() {
            return LifecycleState::Stopping;
        }
        state
    }

    /// `Idle -> Running`. Any other starting state is rejected.
    pub(crate) fn start(&self, token: CancellationToken) -> NotifierResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != LifecycleState::Idle {
            return Err(NotifierError::InvalidState { state: *state });
        }
        *state = LifecycleState::Running;
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    /// `Running -> Stopping`. No-op from any other state.
    pub(crate) fn mark_stopping(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == LifecycleState::Running {
            *state = LifecycleState::Stopping;
        }
    }

    /// Enter the terminal state.
    pub(crate) fn mark_stopped(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = LifecycleState::Stopped;
    }

    /// Fails with `ShutdownInProgress` once stopping or stopped.
    pub(crate) fn ensure_accepting(&self) -> NotifierResult<()> {
        if self.state().accepts_subscriptions() {
            Ok(())
        } else {
            Err(NotifierError::ShutdownInProgress)
        }
    }

    fn token_cancelled(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Handle to a running poll loop, returned by
/// [`Notifier::run`](super::Notifier::run).
#[derive(Debug)]
pub struct RunHandle {
    join: JoinHandle<()>,
}

impl RunHandle {
    pub(crate) const fn new(join: JoinHandle<()>) -> Self {
        Self { join }
    }

    /// Returns true once the poll loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Blocks until the poll loop has stopped.
    ///
    /// This only returns after the token passed to `run` has been cancelled and
    /// the in-flight tick has finished.
    pub fn join(self) -> NotifierResult<()> {
        self.join
            .join()
            .map_err(|_| NotifierError::internal("notifier poll loop panicked"))
    }
}
