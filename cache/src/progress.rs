//! Progress and readiness notifications.
//!
//! Observers subscribe to a [`ProgressHub`] and receive [`ProgressEvent`]s
//! over a standard channel. The hub never blocks on a slow observer, and
//! observers whose receiver was dropped are pruned on the next publish.

use std::fmt;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// Stage of the refresh pipeline an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Validating,
    Fetching,
    Writing,
    Loading,
    Indexing,
    /// Data is resident; consumers may read.
    Ready,
    /// Initialization could not produce data; the dataset is empty.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::Validating => "validating",
            Phase::Fetching => "fetching",
            Phase::Writing => "writing",
            Phase::Loading => "loading",
            Phase::Indexing => "indexing",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// Overall completion, 0 to 100.
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(phase: Phase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Handle returned by [`ProgressHub::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub receiver: Receiver<ProgressEvent>,
}

#[derive(Debug, Default)]
struct Observers {
    next_id: u64,
    senders: Vec<(u64, Sender<ProgressEvent>)>,
}

/// Fan-out of progress events to any number of observers.
#[derive(Debug, Default)]
pub struct ProgressHub {
    observers: Mutex<Observers>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        let mut observers = self.lock();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.senders.push((id, sender));
        Subscription { id, receiver }
    }

    /// Returns `true` if an observer with `id` was registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut observers = self.lock();
        let before = observers.senders.len();
        observers.senders.retain(|(sid, _)| *sid != id);
        observers.senders.len() != before
    }

    pub fn publish(&self, event: ProgressEvent) {
        self.lock()
            .senders
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    pub fn observer_count(&self) -> usize {
        self.lock().senders.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Observers> {
        // A panicking observer cannot corrupt the sender list.
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
