//! MQTT-backed session implementation
//!
//! Owns the rumqttc client and event loop, supervises the connection with
//! exponential-backoff reconnects, and forwards inbound messages as
//! [`SessionEvent`]s through a single dispatch channel.

use super::connection::{
    configure_mqtt_options, subscription_patterns, ConnectionState, ReconnectConfig,
    ReconnectDecision, SessionError,
};
use super::handler::{route_event, EventRoute};
use super::{Session, SessionEvent};
use crate::config::{BrokerSection, DeckConfig};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::PublishProperties;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `connect()` waits for the broker's ConnAck before failing
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Broker session over MQTT
pub struct MqttSession {
    broker: BrokerSection,
    patterns: Vec<String>,
    reconnect: ReconnectConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    client: Option<Arc<Mutex<AsyncClient>>>,
    supervisor: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl MqttSession {
    pub fn new(config: &DeckConfig, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        Self {
            broker: config.broker.clone(),
            patterns: subscription_patterns(
                config.session.topic_prefix.as_deref(),
                &config.session.discovery_namespace,
            ),
            reconnect: config.reconnect_config(),
            events,
            state_tx,
            state_rx,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Tear down any existing supervisor. Aborting cancels an in-flight
    /// backoff sleep, so a new connect never races a scheduled reconnect.
    async fn teardown_locked(inner: &mut Inner) {
        if let Some(shutdown_tx) = inner.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = inner.supervisor.take() {
            handle.abort();
        }
        inner.client = None;
    }

    /// Wait until the state watch reports Connected, a terminal state, or the timeout
    async fn wait_for_connected(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                match state_rx.borrow().clone() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(SessionError::ConnectionFailed(reason));
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(SessionError::ConnectionFailed(
                        "state channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectionFailed(
                "no connection acknowledgement from broker".to_string(),
            )),
        }
    }

    /// Sleep for the backoff delay, returning false if shutdown was requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    async fn resubscribe(client: &Arc<Mutex<AsyncClient>>, patterns: &[String]) {
        let client_guard = client.lock().await;
        for pattern in patterns {
            if let Err(e) = client_guard.subscribe(pattern, QoS::AtMostOnce).await {
                error!("Failed to subscribe to {}: {}", pattern, e);
            } else {
                debug!(target: "session", "Subscribed to: {}", pattern);
            }
        }
    }

    /// Handle a connection loss. Returns true to keep the supervisor loop
    /// running (another attempt scheduled), false to stop it.
    #[allow(clippy::too_many_arguments)]
    async fn handle_loss(
        reason: String,
        ctx: &SupervisorContext,
        attempt: &mut u32,
        was_connected: &mut bool,
        event_loop: &mut EventLoop,
        shutdown_rx: watch::Receiver<bool>,
    ) -> bool {
        if *was_connected {
            *was_connected = false;
            let _ = ctx.events.send(SessionEvent::ConnectionLost {
                reason: reason.clone(),
            });
        }

        match ctx.reconnect.next_action(*attempt) {
            ReconnectDecision::Retry {
                attempt: next,
                delay_ms,
            } => {
                *attempt = next;
                let _ = ctx.state_tx.send(ConnectionState::Reconnecting(next));
                info!(
                    "Connection lost ({}), reconnect attempt {}/{} after {}ms",
                    reason, next, ctx.reconnect.max_attempts, delay_ms
                );

                if !Self::interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
                    return false;
                }
                if *shutdown_rx.borrow() {
                    return false;
                }

                match configure_mqtt_options(&ctx.url, &ctx.broker) {
                    Ok(options) => {
                        let (new_client, new_event_loop) = AsyncClient::new(options, 64);
                        *event_loop = new_event_loop;
                        let mut client_guard = ctx.client.lock().await;
                        *client_guard = new_client;
                        true
                    }
                    Err(e) => {
                        // URL was valid at connect time; treat as transient
                        error!("Failed to rebuild connection: {}", e);
                        true
                    }
                }
            }
            ReconnectDecision::GiveUp => {
                let terminal = format!(
                    "Reconnect attempts exhausted after {} tries: {}",
                    ctx.reconnect.max_attempts, reason
                );
                error!("{}", terminal);
                let _ = ctx
                    .state_tx
                    .send(ConnectionState::Disconnected(terminal.clone()));
                let _ = ctx.events.send(SessionEvent::Closed { reason: terminal });
                false
            }
        }
    }

    async fn supervise(
        ctx: SupervisorContext,
        mut event_loop: EventLoop,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Session supervisor started for {}", ctx.url);
        let mut attempt = 0u32;
        let mut was_connected = false;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!(target: "session", "Shutdown signal received, stopping supervisor");
                        break;
                    }
                }

                polled = event_loop.poll() => match polled {
                    Ok(event) => match route_event(&event) {
                        EventRoute::ConnAck => {
                            attempt = 0;
                            was_connected = true;
                            let _ = ctx.state_tx.send(ConnectionState::Connected);
                            Self::resubscribe(&ctx.client, &ctx.patterns).await;
                            let _ = ctx.events.send(SessionEvent::Connected {
                                url: ctx.url.clone(),
                            });
                            info!("Connected to {}", ctx.url);
                        }
                        EventRoute::Message { topic, payload, .. } => {
                            let _ = ctx.events.send(SessionEvent::Message { topic, payload });
                        }
                        EventRoute::Disconnect => {
                            if !Self::handle_loss(
                                "broker closed the connection".to_string(),
                                &ctx,
                                &mut attempt,
                                &mut was_connected,
                                &mut event_loop,
                                shutdown_rx.clone(),
                            )
                            .await
                            {
                                break;
                            }
                        }
                        EventRoute::Infrastructure(desc) => {
                            debug!(target: "session", "MQTT event: {}", desc);
                        }
                        EventRoute::Outgoing => {}
                    },
                    Err(e) => {
                        if !Self::handle_loss(
                            e.to_string(),
                            &ctx,
                            &mut attempt,
                            &mut was_connected,
                            &mut event_loop,
                            shutdown_rx.clone(),
                        )
                        .await
                        {
                            break;
                        }
                    }
                }
            }
        }
        info!("Session supervisor stopped for {}", ctx.url);
    }

    async fn client_handle(&self) -> Result<Arc<Mutex<AsyncClient>>, SessionError> {
        let inner = self.inner.lock().await;
        inner.client.clone().ok_or(SessionError::NotConnected {
            state: ConnectionState::Idle,
        })
    }
}

/// Everything the supervisor task needs, bundled to keep signatures sane
struct SupervisorContext {
    url: String,
    broker: BrokerSection,
    patterns: Vec<String>,
    reconnect: ReconnectConfig,
    client: Arc<Mutex<AsyncClient>>,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

#[async_trait]
impl Session for MqttSession {
    async fn connect(&self, url: &str) -> Result<(), SessionError> {
        let options = configure_mqtt_options(url, &self.broker)?;

        let mut inner = self.inner.lock().await;
        Self::teardown_locked(&mut inner).await;
        let _ = self.state_tx.send(ConnectionState::Connecting);

        let (client, event_loop) = AsyncClient::new(options, 64);
        let shared_client = Arc::new(Mutex::new(client));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = SupervisorContext {
            url: url.to_string(),
            broker: self.broker.clone(),
            patterns: self.patterns.clone(),
            reconnect: self.reconnect.clone(),
            client: shared_client.clone(),
            state_tx: self.state_tx.clone(),
            events: self.events.clone(),
        };

        inner.client = Some(shared_client);
        inner.shutdown_tx = Some(shutdown_tx);
        inner.supervisor = Some(tokio::spawn(Self::supervise(ctx, event_loop, shutdown_rx)));
        drop(inner);

        Self::wait_for_connected(self.state_rx.clone(), CONNECT_TIMEOUT).await
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;

        if let Some(shutdown_tx) = inner.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(client) = inner.client.take() {
            let _ = client.lock().await.disconnect().await;
        }
        if let Some(mut handle) = inner.supervisor.take() {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                warn!("Supervisor did not stop gracefully, aborting");
                handle.abort();
            }
        }
        drop(inner);

        let _ = self.state_tx.send(ConnectionState::Idle);
        let _ = self.events.send(SessionEvent::Closed {
            reason: "manual disconnect".to_string(),
        });
        info!("Session disconnected");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), SessionError> {
        let state = self.state();
        if !state.can_operate() {
            return Err(SessionError::NotConnected { state });
        }

        let client = self.client_handle().await?;
        let client_guard = client.lock().await;
        client_guard
            .publish_with_properties(
                topic,
                QoS::AtMostOnce,
                retain,
                payload.as_bytes().to_vec(),
                PublishProperties::default(),
            )
            .await
            .map_err(|e| SessionError::PublishFailed(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<(), SessionError> {
        let state = self.state();
        if !state.can_operate() {
            return Err(SessionError::NotConnected { state });
        }

        let client = self.client_handle().await?;
        let client_guard = client.lock().await;
        client_guard
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| SessionError::SubscribeFailed(e.to_string()))
    }

    fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        // Best effort: stop background tasks. Graceful shutdown needs an
        // explicit disconnect() call.
        if let Ok(mut inner) = self.inner.try_lock() {
            if let Some(shutdown_tx) = inner.shutdown_tx.take() {
                let _ = shutdown_tx.send(true);
            }
            if let Some(handle) = inner.supervisor.take() {
                handle.abort();
            }
        }
    }
}
