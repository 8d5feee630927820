//! Delivery cursor for the poll loop.

use crate::event::Event;

/// Last successfully delivered sequence id.
///
/// Owned exclusively by the poll loop. The value only moves forward: it is
/// advanced after a batch has been dispatched and never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    last_delivered: u64,
}

impl Cursor {
    /// Creates a cursor positioned after `last_delivered`.
    #[must_use]
    pub const fn new(last_delivered: u64) -> Self {
        Self { last_delivered }
    }

    /// Last delivered sequence id.
    #[must_use]
    pub const fn last_delivered(&self) -> u64 {
        self.last_delivered
    }

    /// Inclusive lower bound for the next fetch.
    #[must_use]
    pub const fn next_lower_bound(&self) -> u64 {
        self.last_delivered.saturating_add(1)
    }

    /// Returns true if `event` has not been delivered yet.
    #[must_use]
    pub const fn is_fresh(&self, event: &Event) -> bool {
        event.sequence_id > self.last_delivered
    }

    /// Moves the cursor to `sequence_id` if it is ahead. Returns true if it moved.
    pub fn advance(&mut self, sequence_id: u64) -> bool {
        if sequence_id > self.last_delivered {
            self.last_delivered = sequence_id;
            true
        } else {
            false
        }
    }
}
