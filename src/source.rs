//! Upstream source abstraction.
//!
//! The notifier pulls batches through this trait. The HTTP implementation
//! lives in [`crate::transport`]; tests and embedders can plug in their own.

use std::sync::Arc;

use crate::error::FetchError;
use crate::event::Event;

/// Source of upstream events.
///
/// # Contract
/// - Returns events with `sequence_id >= from_sequence_id`, in ascending order.
/// - Once an id has been returned and acknowledged, no lower id reappears.
/// - Implementations must be safe to call from the poll loop's thread.
pub trait UpdateSource: Send + Sync {
    /// Fetch all events whose sequence id is at least `from_sequence_id`.
    fn fetch_events(&self, from_sequence_id: u64) -> Result<Vec<Event>, FetchError>;
}

impl<S: UpdateSource + ?Sized> UpdateSource for Arc<S> {
    fn fetch_events(&self, from_sequence_id: u64) -> Result<Vec<Event>, FetchError> {
        (**self).fetch_events(from_sequence_id)
    }
}

impl<S: UpdateSource + ?Sized> UpdateSource for Box<S> {
    fn fetch_events(&self, from_sequence_id: u64) -> Result<Vec<Event>, FetchError> {
        (**self).fetch_events(from_sequence_id)
    }
}
