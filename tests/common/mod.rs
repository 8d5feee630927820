#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use telenotify::{Event, EventPayload, FetchError, Message, NotifierConfig, UpdateSource};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn message(id: u64) -> Event {
    Event::new(id, EventPayload::Message(Message::default()))
}

pub fn channel_post(id: u64) -> Event {
    Event::new(id, EventPayload::ChannelPost(Message::default()))
}

pub fn fast_config() -> NotifierConfig {
    NotifierConfig {
        poll_interval: Duration::from_millis(5),
        ..NotifierConfig::default()
    }
}

/// Replays queued responses in order, then returns empty batches.
///
/// Every requested lower bound is published on `requests` so tests can wait
/// for the poll loop to reach a given tick.
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<Vec<Event>, FetchError>>>,
    requests_tx: Sender<u64>,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<Vec<Event>, FetchError>>) -> (Self, Receiver<u64>) {
        let (requests_tx, requests_rx) = unbounded();
        let source = Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests_tx,
        };
        (source, requests_rx)
    }
}

impl UpdateSource for ScriptedSource {
    fn fetch_events(&self, from_sequence_id: u64) -> Result<Vec<Event>, FetchError> {
        let _ = self.requests_tx.send(from_sequence_id);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Blocks every fetch until the test releases a response through the gate.
pub struct GatedSource {
    entered_tx: Sender<u64>,
    gate_rx: Receiver<Result<Vec<Event>, FetchError>>,
}

pub struct Gate {
    pub entered: Receiver<u64>,
    pub release: Sender<Result<Vec<Event>, FetchError>>,
}

impl GatedSource {
    pub fn new() -> (Self, Gate) {
        let (entered_tx, entered) = unbounded();
        let (release, gate_rx) = unbounded();
        (Self { entered_tx, gate_rx }, Gate { entered, release })
    }
}

impl UpdateSource for GatedSource {
    fn fetch_events(&self, from_sequence_id: u64) -> Result<Vec<Event>, FetchError> {
        let _ = self.entered_tx.send(from_sequence_id);
        self.gate_rx.recv().unwrap_or_else(|_| Ok(Vec::new()))
    }
}
