use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Receives the human-readable event lines of the engine.
///
/// Called once per tick and once per recovery command outcome.
pub trait Observer: Send + Sync {
    fn on_event(&self, line: &str);
}

/// Observer discarding every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_event(&self, _line: &str) {}
}

/// Fans events out to any number of front-end subscribers
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<String>,
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Observer for BroadcastObserver {
    fn on_event(&self, line: &str) {
        // Ignore errors if there are no receivers
        if self.tx.send(line.to_string()).is_err() {
            debug!("Observer bus: no subscribers for event");
        }
    }
}

/// Deliver an event without letting a misbehaving observer reach the engine
pub(crate) fn deliver(observer: &dyn Observer, line: &str) {
    if catch_unwind(AssertUnwindSafe(|| observer.on_event(line))).is_err() {
        warn!("Observer panicked while handling an event; ignoring");
    }
}
