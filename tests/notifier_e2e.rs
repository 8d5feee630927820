//! End-to-end tests for the poll loop, fan-out and shutdown.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use common::{channel_post, fast_config, message, GatedSource, ScriptedSource, WAIT};
use telenotify::{
    CancellationToken, EventKind, FetchError, LifecycleState, Notifier, NotifierConfig, NotifierError, Subscription,
    TransportError,
};

fn next_id(sub: &Subscription) -> u64 {
    sub.recv_timeout(WAIT)
        .expect("subscription closed")
        .expect("no event before timeout")
        .sequence_id
}

fn stop(cancel: &CancellationToken, handle: telenotify::RunHandle) {
    cancel.cancel();
    handle.join().expect("poll loop failed");
}

#[test]
fn test_fan_out_by_interest() {
    let (source, requests) =
        ScriptedSource::new(vec![Ok(vec![message(1), channel_post(2), message(3)])]);
    let notifier = Notifier::new(source, fast_config()).unwrap();

    let a = notifier.subscribe([EventKind::Message]).unwrap();
    let b = notifier
        .subscribe([EventKind::Message, EventKind::ChannelPost])
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();

    assert_eq!(next_id(&a), 1);
    assert_eq!(next_id(&a), 3);
    assert_eq!(next_id(&b), 1);
    assert_eq!(next_id(&b), 2);
    assert_eq!(next_id(&b), 3);

    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 4);
    assert_eq!(notifier.cursor(), 3);

    stop(&cancel, handle);
    assert!(matches!(a.try_recv(), Err(NotifierError::SubscriptionClosed { .. })));
}

#[test]
fn test_failed_fetch_keeps_lower_bound() {
    let cfg = NotifierConfig {
        initial_cursor: 5,
        ..fast_config()
    };
    let (source, requests) = ScriptedSource::new(vec![Err(FetchError::Transport(TransportError::Timeout {
        duration_ms: 5_000,
    }))]);
    let notifier = Notifier::new(source, cfg).unwrap();
    let errors = notifier.errors();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();

    let err = errors.recv_timeout(WAIT).unwrap();
    assert!(err.is_transport());
    assert!(err.is_retryable());

    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 6);
    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 6);
    assert_eq!(notifier.cursor(), 5);

    stop(&cancel, handle);
}

#[test]
fn test_remote_rejection_is_reported_then_recovered() {
    let (source, requests) = ScriptedSource::new(vec![
        Err(FetchError::RemoteRejected {
            code: 409,
            description: "Conflict: terminated by other getUpdates request".to_string(),
        }),
        Ok(vec![message(7)]),
    ]);
    let notifier = Notifier::new(source, fast_config()).unwrap();
    let sub = notifier.subscribe([EventKind::Message]).unwrap();
    let errors = notifier.errors();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();

    match errors.recv_timeout(WAIT).unwrap() {
        NotifierError::RemoteRejected { code, .. } => assert_eq!(code, 409),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(next_id(&sub), 7);

    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 8);

    stop(&cancel, handle);
}

#[test]
fn test_overlapping_batches_are_delivered_once() {
    let (source, _requests) = ScriptedSource::new(vec![
        Ok(vec![message(1), message(2)]),
        Ok(vec![message(2), message(3)]),
        Ok(vec![message(1), message(3), message(4)]),
    ]);
    let notifier = Notifier::new(source, fast_config()).unwrap();
    let sub = notifier.subscribe([EventKind::Message]).unwrap();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();

    let received: Vec<u64> = (0..4).map(|_| next_id(&sub)).collect();
    assert_eq!(received, vec![1, 2, 3, 4]);

    stop(&cancel, handle);
    let leftovers: Vec<u64> = sub.receiver().try_iter().map(|e| e.sequence_id).collect();
    assert!(leftovers.is_empty(), "duplicates delivered: {leftovers:?}");
}

#[test]
fn test_repeats_within_one_batch_are_delivered_once() {
    let (source, requests) = ScriptedSource::new(vec![Ok(vec![message(1), message(2), message(2), message(3)])]);
    let notifier = Notifier::new(source, fast_config()).unwrap();
    let sub = notifier.subscribe([EventKind::Message]).unwrap();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();

    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(requests.recv_timeout(WAIT).unwrap(), 4);
    stop(&cancel, handle);

    let received: Vec<u64> = sub.receiver().try_iter().map(|e| e.sequence_id).collect();
    assert_eq!(received, vec![1, 2, 3]);
}

#[test]
fn test_cursor_never_decreases() {
    let batches = (0..20u64)
        .map(|i| Ok(vec![message(i * 3 + 1), channel_post(i * 3 + 2), message(i * 3 + 3)]))
        .collect();
    let (source, _requests) = ScriptedSource::new(batches);
    let notifier = Notifier::new(source, fast_config()).unwrap();
    let sub = notifier.subscribe([EventKind::Message]).unwrap();

    let done = AtomicBool::new(false);
    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();

    thread::scope(|s| {
        let sampler = s.spawn(|| {
            let mut samples = Vec::new();
            while !done.load(Ordering::Acquire) {
                samples.push(notifier.cursor());
                thread::yield_now();
            }
            samples
        });

        let mut last = 0;
        for _ in 0..40 {
            let id = next_id(&sub);
            assert!(id > last, "out of order: {id} after {last}");
            last = id;
        }
        done.store(true, Ordering::Release);

        let samples = sampler.join().unwrap();
        assert!(samples.windows(2).all(|w| w[0] <= w[1]));
    });

    stop(&cancel, handle);
    assert_eq!(notifier.cursor(), 60);
}

#[test]
fn test_unsubscribe_leaves_other_subscribers_untouched() {
    let (source, requests) = ScriptedSource::new(vec![]);
    let notifier = Notifier::new(source, fast_config()).unwrap();
    let keep = notifier.subscribe([EventKind::Message]).unwrap();
    let (gone_id, gone_rx) = notifier.subscribe([EventKind::Message]).unwrap().into_parts();

    notifier.unsubscribe(gone_id).unwrap();
    notifier.unsubscribe(gone_id).unwrap();
    assert_eq!(notifier.subscriber_count(), 1);
    assert!(gone_rx.recv().is_err());

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();
    requests.recv_timeout(WAIT).unwrap();
    notifier.unsubscribe(gone_id).unwrap();
    assert_eq!(notifier.subscriber_count(), 1);
    assert!(keep.try_recv().unwrap().is_none());

    stop(&cancel, handle);
}

#[test]
fn test_subscriber_added_mid_dispatch_sees_only_later_batches() {
    let cfg = NotifierConfig {
        poll_interval: Duration::from_millis(50),
        subscriber_capacity: 0,
        initial_cursor: 0,
    };
    let (source, _requests) = ScriptedSource::new(vec![Ok(vec![message(1), message(2)]), Ok(vec![message(3)])]);
    let notifier = Notifier::new(source, cfg).unwrap();
    let a = notifier.subscribe([EventKind::Message]).unwrap();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();

    thread::scope(|s| {
        // Rendezvous delivery: the batch [1, 2] stays in flight until `a` takes 2.
        assert_eq!(next_id(&a), 1);
        let late = s.spawn(|| notifier.subscribe([EventKind::Message]).unwrap());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(next_id(&a), 2);

        let b = late.join().unwrap();
        let b_first = s.spawn(move || next_id(&b));
        assert_eq!(next_id(&a), 3);
        assert_eq!(b_first.join().unwrap(), 3);
    });

    stop(&cancel, handle);
}

#[test]
fn test_cancel_waits_for_in_flight_tick() {
    let (source, gate) = GatedSource::new();
    let notifier = Notifier::new(source, fast_config()).unwrap();
    let sub = notifier.subscribe([EventKind::Message]).unwrap();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();
    assert_eq!(notifier.state(), LifecycleState::Running);

    assert_eq!(gate.entered.recv_timeout(WAIT).unwrap(), 1);
    cancel.cancel();
    assert_eq!(notifier.state(), LifecycleState::Stopping);
    assert!(!handle.is_finished());

    gate.release.send(Ok(vec![message(1)])).unwrap();
    handle.join().unwrap();

    assert_eq!(notifier.state(), LifecycleState::Stopped);
    assert_eq!(notifier.cursor(), 1);
    assert_eq!(next_id(&sub), 1);
    assert!(matches!(sub.recv(), Err(NotifierError::SubscriptionClosed { .. })));
    assert!(gate.entered.try_recv().is_err());
}

#[test]
fn test_stopped_notifier_rejects_everything() {
    let (source, _requests) = ScriptedSource::new(vec![]);
    let notifier = Notifier::new(source, fast_config()).unwrap();
    let sub = notifier.subscribe([EventKind::Message]).unwrap();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();
    assert!(matches!(
        notifier.run(CancellationToken::new()),
        Err(NotifierError::InvalidState { .. })
    ));
    stop(&cancel, handle);

    assert_eq!(notifier.state(), LifecycleState::Stopped);
    assert!(notifier.subscribe([EventKind::Message]).unwrap_err().is_shutdown());
    assert!(notifier.unsubscribe(sub.id()).unwrap_err().is_shutdown());
    assert!(matches!(sub.recv(), Err(NotifierError::SubscriptionClosed { .. })));
    assert!(matches!(
        notifier.run(CancellationToken::new()),
        Err(NotifierError::InvalidState {
            state: LifecycleState::Stopped
        })
    ));
}

#[test]
fn test_cancel_before_first_tick() {
    let (source, requests) = ScriptedSource::new(vec![Ok(vec![message(1)])]);
    let cfg = NotifierConfig {
        poll_interval: Duration::from_secs(60),
        ..NotifierConfig::default()
    };
    let notifier = Notifier::new(source, cfg).unwrap();

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone()).unwrap();
    stop(&cancel, handle);

    assert!(requests.try_recv().is_err());
    assert_eq!(notifier.cursor(), 0);
}
