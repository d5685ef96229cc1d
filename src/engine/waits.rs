//! Wait primitives over the inbound message stream
//!
//! One-shot waits resolve with the next message on their topic after
//! registration; duration collections buffer messages until a cap or a
//! deadline. Both are driven off the same dispatch call, so a one-shot
//! never consumes a message destined for a collector on the same topic.

use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Wait-primitive failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WaitError {
    #[error("Timed out after {timeout_secs}s waiting for a message on {topic}")]
    Timeout { topic: String, timeout_secs: f64 },
    #[error("Disconnected while waiting for a message on {topic}")]
    Disconnected { topic: String },
}

struct OneShotWait {
    id: u64,
    tx: oneshot::Sender<Result<String, WaitError>>,
}

/// Signal delivered to a running duration collection
#[derive(Debug, Clone, PartialEq)]
pub enum CollectorSignal {
    Message(String),
    Disconnected,
}

struct Collector {
    id: u64,
    tx: mpsc::UnboundedSender<CollectorSignal>,
}

/// Pending one-shot waits and duration collectors, keyed by topic
#[derive(Default)]
pub struct WaitTable {
    next_id: u64,
    one_shots: HashMap<String, Vec<OneShotWait>>,
    collectors: HashMap<String, Vec<Collector>>,
}

impl WaitTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Register a one-shot continuation for the next message on `topic`
    pub fn register_once(
        &mut self,
        topic: &str,
    ) -> (u64, oneshot::Receiver<Result<String, WaitError>>) {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.one_shots
            .entry(topic.to_string())
            .or_default()
            .push(OneShotWait { id, tx });
        (id, rx)
    }

    /// Remove a one-shot continuation (timeout or caller cancellation). Idempotent.
    pub fn cancel_once(&mut self, topic: &str, id: u64) {
        if let Some(waits) = self.one_shots.get_mut(topic) {
            waits.retain(|w| w.id != id);
            if waits.is_empty() {
                self.one_shots.remove(topic);
            }
        }
    }

    /// Register a persistent buffer listener for a duration collection
    pub fn register_collector(
        &mut self,
        topic: &str,
    ) -> (u64, mpsc::UnboundedReceiver<CollectorSignal>) {
        let id = self.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.collectors
            .entry(topic.to_string())
            .or_default()
            .push(Collector { id, tx });
        (id, rx)
    }

    /// Remove a duration collector when its wait completes. Idempotent.
    pub fn remove_collector(&mut self, topic: &str, id: u64) {
        if let Some(collectors) = self.collectors.get_mut(topic) {
            collectors.retain(|c| c.id != id);
            if collectors.is_empty() {
                self.collectors.remove(topic);
            }
        }
    }

    /// Deliver one inbound message. Every one-shot registered on the topic
    /// before this message resolves with it (fan-out, registration order);
    /// every collector on the topic buffers it.
    pub fn dispatch(&mut self, topic: &str, payload: &str) {
        if let Some(waits) = self.one_shots.remove(topic) {
            for wait in waits {
                let _ = wait.tx.send(Ok(payload.to_string()));
            }
        }

        if let Some(collectors) = self.collectors.get_mut(topic) {
            collectors.retain(|c| c.tx.send(CollectorSignal::Message(payload.to_string())).is_ok());
            if collectors.is_empty() {
                self.collectors.remove(topic);
            }
        }
    }

    /// Connection lost: reject every pending one-shot, signal every
    /// collector to resolve early with its partial buffer, clear the table.
    pub fn reject_all(&mut self) {
        for (topic, waits) in self.one_shots.drain() {
            for wait in waits {
                let _ = wait.tx.send(Err(WaitError::Disconnected {
                    topic: topic.clone(),
                }));
            }
        }
        for (_, collectors) in self.collectors.drain() {
            for collector in collectors {
                let _ = collector.tx.send(CollectorSignal::Disconnected);
            }
        }
    }

    pub fn pending_one_shots(&self) -> usize {
        self.one_shots.values().map(Vec::len).sum()
    }

    pub fn active_collectors(&self) -> usize {
        self.collectors.values().map(Vec::len).sum()
    }
}
