//! Top-level application context
//!
//! A `TopicDeck` owns one session, the derived topic-state engine, the
//! publish controller, and the preference store. There are no ambient
//! singletons: every component receives its dependencies explicitly, so
//! multiple decks can coexist (the tests rely on this).

use crate::config::DeckConfig;
use crate::engine::{DisplayGroup, PinnedTopic, TopicEngine, TopicEntry};
use crate::error::DeckResult;
use crate::prefs::PrefsStore;
use crate::publish::{PublishController, SequenceReport};
use crate::session::connection::{pattern_matches, subscription_patterns};
use crate::session::{ConnectionState, MqttSession, Session, SessionError, SessionEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Client context tying the session to its derived state
pub struct TopicDeck {
    config: DeckConfig,
    /// Wildcard patterns the session holds on every connection
    patterns: Vec<String>,
    session: Arc<dyn Session>,
    engine: Arc<TopicEngine>,
    publisher: Arc<PublishController>,
    prefs: Arc<Mutex<PrefsStore>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TopicDeck {
    /// Build a deck backed by a real MQTT session
    pub fn new(config: DeckConfig) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(MqttSession::new(&config, events_tx));
        Self::with_session(config, session, events_rx)
    }

    /// Build a deck over any session implementation (tests use `MockSession`)
    pub fn with_session(
        config: DeckConfig,
        session: Arc<dyn Session>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Arc<Self> {
        let engine = Arc::new(TopicEngine::new(&config.session.discovery_namespace));
        let publisher = Arc::new(PublishController::new(
            session.clone(),
            config.publish.history_limit,
            config.publish.min_interval_ms,
        ));
        let prefs = Arc::new(Mutex::new(PrefsStore::load(&config.prefs.path)));

        let dispatcher = tokio::spawn(Self::dispatch_events(
            events,
            engine.clone(),
            publisher.clone(),
            prefs.clone(),
        ));

        let patterns = subscription_patterns(
            config.session.topic_prefix.as_deref(),
            &config.session.discovery_namespace,
        );

        Arc::new(Self {
            config,
            patterns,
            session,
            engine,
            publisher,
            prefs,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// The single event dispatcher: registry, waits, and pinned cache all
    /// observe each message within one dispatch turn.
    async fn dispatch_events(
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        engine: Arc<TopicEngine>,
        publisher: Arc<PublishController>,
        prefs: Arc<Mutex<PrefsStore>>,
    ) {
        // Restore persisted publish history before processing anything
        let saved_history = prefs.lock().await.prefs().publish_history.clone();
        if !saved_history.is_empty() {
            publisher.restore_history(saved_history).await;
        }

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Message { topic, payload } => {
                    engine.handle_message(&topic, &payload).await;
                }
                SessionEvent::Connected { url } => {
                    info!("Session connected to {}", url);
                    let mut prefs_guard = prefs.lock().await;
                    prefs_guard.set_last_broker_url(&url);
                    if let Err(e) = prefs_guard.save() {
                        debug!(target: "deck", "Failed to persist prefs: {}", e);
                    }
                }
                SessionEvent::ConnectionLost { reason } => {
                    warn!("Connection lost: {}", reason);
                    engine.handle_connection_lost().await;
                    // The job is connection-scoped, like pins
                    publisher.stop_continuous().await;
                }
                SessionEvent::Closed { reason } => {
                    info!("Session closed: {}", reason);
                    engine.handle_closed().await;
                    publisher.stop_continuous().await;
                }
            }
        }
        debug!(target: "deck", "Event dispatcher stopped");
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub async fn connect(&self, url: &str) -> Result<(), SessionError> {
        self.session.connect(url).await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.session.disconnect().await
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.watch_state()
    }

    fn require_connected(&self) -> Result<(), SessionError> {
        let state = self.state();
        if !state.can_operate() {
            return Err(SessionError::NotConnected { state });
        }
        Ok(())
    }

    /// Subscribe only when the topic falls outside the wildcard patterns the
    /// session already holds; waits never stack redundant subscriptions.
    async fn ensure_subscribed(&self, topic: &str) -> Result<(), SessionError> {
        if self.patterns.iter().any(|p| pattern_matches(p, topic)) {
            return Ok(());
        }
        self.session.subscribe(topic).await
    }

    /// Wait for the next message on `topic`. Fails fast when not connected.
    pub async fn subscribe_once(&self, topic: &str, timeout: Duration) -> DeckResult<String> {
        self.require_connected()?;
        self.ensure_subscribed(topic).await?;
        Ok(self.engine.subscribe_once(topic, timeout).await?)
    }

    /// Collect up to `max_messages` from `topic` for `duration`. Fails fast
    /// when not connected; once running it always resolves.
    pub async fn subscribe_for_duration(
        &self,
        topic: &str,
        duration: Duration,
        max_messages: usize,
    ) -> DeckResult<Vec<String>> {
        self.require_connected()?;
        self.ensure_subscribed(topic).await?;
        Ok(self
            .engine
            .subscribe_for_duration(topic, duration, max_messages)
            .await)
    }

    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), SessionError> {
        self.publisher.publish(topic, payload).await
    }

    pub async fn publish_sequence(
        &self,
        topic: &str,
        payloads: &[String],
        delays_secs: &[f64],
    ) -> SequenceReport {
        self.publisher
            .publish_sequence(topic, payloads, delays_secs)
            .await
    }

    /// Pin a topic for live tracking. No-op (false) when not connected or
    /// already pinned.
    pub async fn pin(&self, topic: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.engine.pin(topic).await
    }

    pub async fn unpin(&self, topic: &str) -> bool {
        self.engine.unpin(topic).await
    }

    pub async fn pinned(&self) -> Vec<PinnedTopic> {
        self.engine.pinned_snapshot().await
    }

    pub async fn topics(&self) -> Vec<TopicEntry> {
        self.engine.topics_snapshot().await
    }

    pub async fn grouped_topics(&self) -> Vec<DisplayGroup> {
        self.engine.grouped_topics().await
    }

    pub async fn registry_revision(&self) -> u64 {
        self.engine.revision().await
    }

    pub async fn history_for(&self, topic: &str) -> Vec<String> {
        self.publisher.history_for(topic).await
    }

    pub async fn set_continuous_payload(&self, payload: String) {
        self.publisher.set_payload(payload).await;
    }

    pub async fn start_continuous(&self, topic: &str, frequency_hz: f64) -> Result<(), SessionError> {
        self.publisher.start_continuous(topic, frequency_hz).await
    }

    pub async fn stop_continuous(&self) {
        self.publisher.stop_continuous().await;
    }

    pub async fn continuous_topic(&self) -> Option<String> {
        self.publisher.continuous_topic().await
    }

    /// Snapshot publish history into the prefs file
    pub async fn save_prefs(&self) -> std::io::Result<()> {
        let history = self.publisher.history_snapshot().await;
        let mut prefs_guard = self.prefs.lock().await;
        prefs_guard.set_publish_history(history);
        prefs_guard.set_topic_prefix(self.config.session.topic_prefix.clone());
        prefs_guard.save()
    }

    pub async fn last_broker_url(&self) -> Option<String> {
        self.prefs.lock().await.prefs().last_broker_url.clone()
    }
}

impl Drop for TopicDeck {
    fn drop(&mut self) {
        if let Ok(mut dispatcher) = self.dispatcher.try_lock() {
            if let Some(handle) = dispatcher.take() {
                handle.abort();
            }
        }
    }
}
