//! # telenotify - long-polling update notifier
//!
//! telenotify polls a bot API's `getUpdates` endpoint on a fixed interval and
//! fans each update out to the subscribers interested in its kind, tracking a
//! delivery cursor so no update is fetched or delivered twice.
//!
//! ## Core Concepts
//!
//! - **Event**: one upstream update with a monotonically increasing sequence id
//!   and a typed payload
//! - **Cursor**: last delivered sequence id; the next poll asks for `cursor + 1`
//! - **Subscription**: an interest filter plus a bounded delivery channel
//! - **Notifier**: owns the poll loop, the registry and the lifecycle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use telenotify::{CancellationToken, EventKind, Notifier};
//!
//! let notifier = Notifier::for_bot(token)?;
//! let messages = notifier.subscribe([EventKind::Message])?;
//! let errors = notifier.errors();
//!
//! let cancel = CancellationToken::new();
//! let handle = notifier.run(cancel.clone())?;
//!
//! let event = messages.recv()?;
//! println!("{:?}", event.payload.message().and_then(|m| m.text.as_deref()));
//!
//! cancel.cancel();
//! handle.join()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cursor;
pub mod error;
pub mod event;
pub mod notifier;
pub mod source;
pub mod transport;

// Re-export primary types at crate root for convenience
pub use cursor::Cursor;
pub use error::{FetchError, NotifierError, NotifierResult, TransportError, ValidationError};
pub use event::{Chat, ChatType, Event, EventKind, EventPayload, Message, User};
pub use notifier::{
    CancellationToken, DispatchReport, LifecycleState, Notifier, NotifierConfig, RunHandle, Subscription,
    SubscriptionId, SubscriptionRegistry,
};
pub use source::UpdateSource;
pub use transport::HttpSourceConfig;

#[cfg(feature = "http")]
pub use transport::HttpUpdateSource;
