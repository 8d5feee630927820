//! Error types for telenotify.
//!
//! All errors are strongly typed using thiserror. Failures on the polling
//! path are reported asynchronously on the notifier's error channel and never
//! stop the loop; only cancellation does.

use thiserror::Error;

use crate::notifier::{LifecycleState, SubscriptionId};

/// Validation errors for configuration and subscription input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Subscription interest set cannot be empty")]
    EmptyInterest,
}

/// Transport-level failures while talking to the upstream source.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("Request timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Malformed response: {message}")]
    MalformedResponse {
        message: String,
    },

    #[error("Response too large ({size} bytes, limit {limit})")]
    ResponseTooLarge {
        size: u64,
        limit: u64,
    },
}

/// Failure returned by an [`UpdateSource`](crate::source::UpdateSource).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Remote API rejected request (code {code}): {description}")]
    RemoteRejected {
        code: i64,
        description: String,
    },
}

/// Top-level error type for telenotify.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote API rejected request (code {code}): {description}")]
    RemoteRejected {
        code: i64,
        description: String,
    },

    #[error("Notifier is shutting down")]
    ShutdownInProgress,

    #[error("Subscription {id} is closed")]
    SubscriptionClosed {
        id: SubscriptionId,
    },

    #[error("Operation not allowed in lifecycle state {state}")]
    InvalidState {
        state: LifecycleState,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl From<FetchError> for NotifierError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transport(t) => Self::Transport(t),
            FetchError::RemoteRejected { code, description } => Self::RemoteRejected { code, description },
        }
    }
}

impl NotifierError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if the upstream API rejected the request.
    #[must_use]
    pub const fn is_remote_rejected(&self) -> bool {
        matches!(self, Self::RemoteRejected { .. })
    }

    /// Returns true if the notifier refused the call because it is stopping.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShutdownInProgress)
    }

    /// Returns true if the poll loop will retry the same range on its next tick.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RemoteRejected { .. })
    }
}

/// Result type alias for notifier operations.
pub type NotifierResult<T> = Result<T, NotifierError>;
