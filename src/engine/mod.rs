//! Topic-state engine
//!
//! Derived state rebuilt from the session's event stream: the topic
//! registry, pending waits, and the pinned live-value cache all observe the
//! same inbound messages through a single dispatch point. Handlers run to
//! completion within one dispatch turn, so there is no interleaving inside
//! the handling of a single message.

pub mod pinned;
pub mod registry;
pub mod waits;

pub use pinned::{PinnedCache, PinnedTopic};
pub use registry::{DisplayGroup, TopicEntry, TopicRegistry};
pub use waits::{CollectorSignal, WaitError, WaitTable};

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Derived topic state for one session
pub struct TopicEngine {
    registry: Mutex<TopicRegistry>,
    waits: Mutex<WaitTable>,
    pinned: Mutex<PinnedCache>,
}

impl TopicEngine {
    pub fn new(discovery_namespace: &str) -> Self {
        Self {
            registry: Mutex::new(TopicRegistry::new(discovery_namespace)),
            waits: Mutex::new(WaitTable::new()),
            pinned: Mutex::new(PinnedCache::new()),
        }
    }

    /// Single dispatch point for one inbound message. Registry, waits, and
    /// pinned cache all see the message within this turn, in that order.
    pub async fn handle_message(&self, topic: &str, payload: &str) {
        self.registry.lock().await.handle_message(topic, payload);
        self.waits.lock().await.dispatch(topic, payload);
        self.pinned.lock().await.on_message(topic, payload);
    }

    /// Connection lost (transient): pending waits are rejected, collectors
    /// resolve early, pins are dropped. The registry survives a reconnect
    /// cycle - topics are append-only within the session.
    pub async fn handle_connection_lost(&self) {
        self.waits.lock().await.reject_all();
        self.pinned.lock().await.clear();
    }

    /// Session closed for good: everything derived is cleared.
    pub async fn handle_closed(&self) {
        self.handle_connection_lost().await;
        self.registry.lock().await.clear();
    }

    /// Wait for the next message on `topic`; rejects after `timeout`.
    pub async fn subscribe_once(&self, topic: &str, timeout: Duration) -> Result<String, WaitError> {
        let (id, rx) = self.waits.lock().await.register_once(topic);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without an outcome: table was torn down
            Ok(Err(_)) => Err(WaitError::Disconnected {
                topic: topic.to_string(),
            }),
            Err(_) => {
                self.waits.lock().await.cancel_once(topic, id);
                Err(WaitError::Timeout {
                    topic: topic.to_string(),
                    timeout_secs: timeout.as_secs_f64(),
                })
            }
        }
    }

    /// Collect messages on `topic` until `max_messages` arrive or `duration`
    /// elapses. Always resolves; an empty buffer is a valid result.
    pub async fn subscribe_for_duration(
        &self,
        topic: &str,
        duration: Duration,
        max_messages: usize,
    ) -> Vec<String> {
        if max_messages == 0 {
            return Vec::new();
        }

        let (id, mut rx) = self.waits.lock().await.register_collector(topic);
        let deadline = Instant::now() + duration;
        let mut buffer = Vec::new();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                signal = rx.recv() => match signal {
                    Some(CollectorSignal::Message(payload)) => {
                        buffer.push(payload);
                        if buffer.len() >= max_messages {
                            break;
                        }
                    }
                    Some(CollectorSignal::Disconnected) | None => break,
                }
            }
        }

        self.waits.lock().await.remove_collector(topic, id);
        buffer
    }

    pub async fn pin(&self, topic: &str) -> bool {
        self.pinned.lock().await.pin(topic)
    }

    pub async fn unpin(&self, topic: &str) -> bool {
        self.pinned.lock().await.unpin(topic)
    }

    pub async fn pinned_snapshot(&self) -> Vec<PinnedTopic> {
        self.pinned.lock().await.snapshot()
    }

    pub async fn last_pinned_payload(&self, topic: &str) -> Option<String> {
        self.pinned
            .lock()
            .await
            .last_payload(topic)
            .map(str::to_string)
    }

    pub async fn topics_snapshot(&self) -> Vec<TopicEntry> {
        self.registry.lock().await.topics().to_vec()
    }

    pub async fn grouped_topics(&self) -> Vec<DisplayGroup> {
        self.registry.lock().await.grouped()
    }

    pub async fn contains_topic(&self, topic: &str) -> bool {
        self.registry.lock().await.contains(topic)
    }

    pub async fn revision(&self) -> u64 {
        self.registry.lock().await.revision()
    }

    pub async fn pending_waits(&self) -> usize {
        self.waits.lock().await.pending_one_shots()
    }
}
