//! update-listener
//!
//! Polls the bot API with the token from `TELEGRAM_BOT_TOKEN`, prints incoming
//! messages and channel posts, and stops cleanly on Ctrl+C.

use std::thread;

use crossbeam_channel::{never, select, Receiver};
use log::{error, info};

use telenotify::{
    CancellationToken, Event, EventKind, HttpSourceConfig, HttpUpdateSource, Notifier, NotifierConfig,
    NotifierError,
};

fn describe(event: &Event) -> String {
    match event.payload.message() {
        Some(msg) => format!(
            "#{} {} in chat {}: {}",
            event.sequence_id,
            event.kind(),
            msg.chat.id,
            msg.text.as_deref().unwrap_or("<no text>")
        ),
        None => format!("#{} {}", event.sequence_id, event.kind()),
    }
}

/// Which subscription an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listener {
    Messages,
    Posts,
}

/// Hands every event to `on_event` until both subscription channels
/// disconnect (after the notifier stops). Returns the number of wakeups.
///
/// A disconnected receiver is always ready, so it is swapped for `never()` to
/// keep `select!` blocking on the channels that are still open.
fn drain_until_closed(
    mut messages: Receiver<Event>,
    mut posts: Receiver<Event>,
    errors: &Receiver<NotifierError>,
    mut on_event: impl FnMut(Listener, &Event),
) -> usize {
    let mut open = 2;
    let mut wakeups = 0;
    while open > 0 {
        wakeups += 1;
        let mut closed = None;
        select! {
            recv(messages) -> ev => match ev {
                Ok(ev) => on_event(Listener::Messages, &ev),
                Err(_) => closed = Some(Listener::Messages),
            },
            recv(posts) -> ev => match ev {
                Ok(ev) => on_event(Listener::Posts, &ev),
                Err(_) => closed = Some(Listener::Posts),
            },
            recv(errors) -> err => {
                if let Ok(err) = err {
                    error!("poll failed: {err}");
                }
            },
        }
        match closed {
            Some(Listener::Messages) => messages = never(),
            Some(Listener::Posts) => posts = never(),
            None => continue,
        }
        open -= 1;
    }
    wakeups
}

fn print_updates(messages: Receiver<Event>, posts: Receiver<Event>, errors: &Receiver<NotifierError>) {
    drain_until_closed(messages, posts, errors, |listener, ev| match listener {
        Listener::Messages => info!("listener 1: {}", describe(ev)),
        Listener::Posts => info!("listener 2: {}", describe(ev)),
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // The blocking HTTP client must be built outside the async runtime.
    let source = HttpUpdateSource::new(HttpSourceConfig::from_env()?)?;
    let notifier = Notifier::new(source, NotifierConfig::default())?;

    let (_, messages) = notifier.subscribe([EventKind::Message])?.into_parts();
    let (_, posts) = notifier
        .subscribe([EventKind::EditedMessage, EventKind::ChannelPost])?
        .into_parts();
    let errors = notifier.errors();

    let printer = thread::Builder::new()
        .name("update-printer".to_string())
        .spawn(move || print_updates(messages, posts, &errors))?;

    let cancel = CancellationToken::new();
    let handle = notifier.run(cancel.clone())?;
    info!("listening for updates, press Ctrl+C to stop");

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())?;

    info!("stopping listener");
    cancel.cancel();
    handle.join()?;
    if printer.join().is_err() {
        error!("printer thread panicked");
    }
    Ok(())
}
