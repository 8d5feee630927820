//! Poll loop worker.
//!
//! One dedicated thread owns the cursor, fetches from the upstream source on a
//! fixed interval and dispatches each batch to the registry. At most one fetch
//! is in flight. Cancellation is checked at tick boundaries only.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{after, select};
use log::{debug, info, warn};

use crate::cursor::Cursor;
use crate::error::NotifierError;
use crate::event::Event;
use crate::source::UpdateSource;

use super::lifecycle::CancellationToken;
use super::registry::DispatchReport;
use super::Shared;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Fetch succeeded with nothing new.
    Idle,
    /// A batch was dispatched and the cursor advanced.
    Dispatched {
        events: usize,
        stale: usize,
        report: DispatchReport,
    },
    /// Fetch failed; cursor unchanged.
    Failed,
}

pub(crate) struct Poller {
    source: Arc<dyn UpdateSource>,
    shared: Arc<Shared>,
    cursor: Cursor,
    interval: Duration,
}

impl Poller {
    pub(crate) fn new(
        source: Arc<dyn UpdateSource>,
        shared: Arc<Shared>,
        initial_cursor: u64,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            shared,
            cursor: Cursor::new(initial_cursor),
            interval,
        }
    }

    /// One fetch + dispatch cycle.
    pub(crate) fn tick(&mut self) -> TickOutcome {
        let from = self.cursor.next_lower_bound();
        debug!("polling for events from sequence id {from}");

        let batch = match self.source.fetch_events(from) {
            Ok(batch) => batch,
            Err(err) => {
                warn!("poll from sequence id {from} failed, will retry: {err}");
                // The receiver lives in `Shared`, so this cannot disconnect.
                let _ = self.shared.error_tx.send(NotifierError::from(err));
                return TickOutcome::Failed;
            }
        };

        // Each accepted id raises the bar, so repeats and regressions inside
        // one batch are dropped along with ids at or below the cursor.
        let total = batch.len();
        let mut high_water = self.cursor;
        let fresh: Vec<Event> = batch
            .into_iter()
            .filter(|e| high_water.advance(e.sequence_id))
            .collect();
        let stale = total - fresh.len();
        if stale > 0 {
            warn!(
                "skipped {stale} duplicate or out-of-order event(s), cursor {}",
                self.cursor.last_delivered()
            );
        }

        let Some(max_id) = fresh.iter().map(|e| e.sequence_id).max() else {
            return TickOutcome::Idle;
        };

        let report = self.shared.registry.dispatch(&fresh);

        let previous = self.cursor.last_delivered();
        self.cursor.advance(max_id);
        self.shared.cursor.fetch_max(self.cursor.last_delivered(), Ordering::AcqRel);
        debug!(
            "dispatched {} event(s) ({} deliveries), cursor {previous} -> {}",
            fresh.len(),
            report.delivered,
            self.cursor.last_delivered()
        );

        TickOutcome::Dispatched {
            events: fresh.len(),
            stale,
            report,
        }
    }

    /// Runs until `token` is cancelled, then closes the registry and enters
    /// the terminal state.
    pub(crate) fn run(mut self, token: CancellationToken) {
        let shared = Arc::clone(&self.shared);
        let _stopped = StopGuard { shared: &shared };

        info!(
            "poll loop started (interval {:?}, cursor {})",
            self.interval,
            self.cursor.last_delivered()
        );

        let cancelled = token.signal();
        loop {
            select! {
                recv(cancelled) -> _ => break,
                recv(after(self.interval)) -> _ => {}
            }

            self.tick();

            if token.is_cancelled() {
                break;
            }
        }

        shared.lifecycle.mark_stopping();
        info!("poll loop stopping at cursor {}", self.cursor.last_delivered());
    }
}

/// Closes the registry and marks the notifier stopped when the loop exits,
/// including by panic.
struct StopGuard<'a> {
    shared: &'a Shared,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        let closed = self.shared.registry.close();
        self.shared.lifecycle.mark_stopped();
        info!("poll loop stopped, closed {closed} subscription(s)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::error::{FetchError, TransportError};
    use crate::event::{EventKind, EventPayload, Message};

    /// Replays scripted responses and records requested lower bounds.
    #[derive(Default)]
    struct Script {
        responses: Mutex<VecDeque<Result<Vec<Event>, FetchError>>>,
        requests: Mutex<Vec<u64>>,
    }

    impl Script {
        fn push(&self, response: Result<Vec<Event>, FetchError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn requests(&self) -> Vec<u64> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl UpdateSource for Script {
        fn fetch_events(&self, from_sequence_id: u64) -> Result<Vec<Event>, FetchError> {
            self.requests.lock().unwrap().push(from_sequence_id);
            self.responses.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn msg(id: u64) -> Event {
        Event::new(id, EventPayload::Message(Message::default()))
    }

    fn poller(script: &Arc<Script>, initial: u64) -> (Poller, Arc<Shared>) {
        let shared = Arc::new(Shared::new(16, initial));
        let source: Arc<dyn UpdateSource> = Arc::clone(script) as Arc<dyn UpdateSource>;
        let poller = Poller::new(source, Arc::clone(&shared), initial, Duration::from_millis(1));
        (poller, shared)
    }

    #[test]
    fn test_tick_advances_cursor_to_batch_max() {
        let script = Arc::new(Script::default());
        script.push(Ok(vec![msg(1), msg(2), msg(3)]));
        let (mut p, shared) = poller(&script, 0);
        let sub = shared.registry.subscribe([EventKind::Message]).unwrap();

        let outcome = p.tick();
        assert!(matches!(outcome, TickOutcome::Dispatched { events: 3, stale: 0, .. }));
        assert_eq!(shared.cursor.load(Ordering::Acquire), 3);

        p.tick();
        assert_eq!(script.requests(), vec![1, 4]);
        assert_eq!(sub.try_recv().unwrap().unwrap().sequence_id, 1);
    }

    #[test]
    fn test_failed_tick_keeps_lower_bound_and_reports() {
        let script = Arc::new(Script::default());
        script.push(Err(TransportError::Timeout { duration_ms: 5000 }.into()));
        let (mut p, shared) = poller(&script, 5);

        assert_eq!(p.tick(), TickOutcome::Failed);
        assert_eq!(p.tick(), TickOutcome::Idle);
        assert_eq!(script.requests(), vec![6, 6]);
        assert_eq!(shared.cursor.load(Ordering::Acquire), 5);

        let err = shared.error_rx.try_recv().unwrap();
        assert!(err.is_transport());
    }

    #[test]
    fn test_stale_events_are_skipped() {
        let script = Arc::new(Script::default());
        script.push(Ok(vec![msg(9), msg(10), msg(11)]));
        let (mut p, shared) = poller(&script, 10);
        let sub = shared.registry.subscribe([EventKind::Message]).unwrap();

        let outcome = p.tick();
        assert!(matches!(outcome, TickOutcome::Dispatched { events: 1, stale: 2, .. }));
        assert_eq!(sub.try_recv().unwrap().unwrap().sequence_id, 11);
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_repeated_id_within_batch_is_delivered_once() {
        let script = Arc::new(Script::default());
        script.push(Ok(vec![msg(1), msg(2), msg(2), msg(3)]));
        let (mut p, shared) = poller(&script, 0);
        let sub = shared.registry.subscribe([EventKind::Message]).unwrap();

        let outcome = p.tick();
        assert!(matches!(outcome, TickOutcome::Dispatched { events: 3, stale: 1, .. }));
        let ids: Vec<u64> = sub.receiver().try_iter().map(|e| e.sequence_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(shared.cursor.load(Ordering::Acquire), 3);
    }

    #[test]
    fn test_descending_pair_keeps_delivery_order() {
        let script = Arc::new(Script::default());
        script.push(Ok(vec![msg(5), msg(3)]));
        let (mut p, shared) = poller(&script, 0);
        let sub = shared.registry.subscribe([EventKind::Message]).unwrap();

        let outcome = p.tick();
        assert!(matches!(outcome, TickOutcome::Dispatched { events: 1, stale: 1, .. }));
        let ids: Vec<u64> = sub.receiver().try_iter().map(|e| e.sequence_id).collect();
        assert_eq!(ids, vec![5]);

        p.tick();
        assert_eq!(script.requests(), vec![1, 6]);
    }

    #[test]
    fn test_all_stale_batch_is_idle() {
        let script = Arc::new(Script::default());
        script.push(Ok(vec![msg(3)]));
        let (mut p, shared) = poller(&script, 3);

        assert_eq!(p.tick(), TickOutcome::Idle);
        assert_eq!(shared.cursor.load(Ordering::Acquire), 3);
    }

    #[test]
    fn test_cursor_advances_without_subscribers() {
        let script = Arc::new(Script::default());
        script.push(Ok(vec![msg(1), msg(2)]));
        let (mut p, shared) = poller(&script, 0);

        p.tick();
        assert_eq!(shared.cursor.load(Ordering::Acquire), 2);
    }
}
