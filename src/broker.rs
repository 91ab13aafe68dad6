//! MQTT subscriber connector.
//!
//! [`BrokerConnector`] owns the broker session. It runs the `rumqttc` event
//! loop as a background task, tracks the connection state, resubscribes after
//! every reconnect, and hands each inbound payload to the bridge queue. The
//! event-loop task never touches storage.
//!
//! State transitions:
//!
//! ```text
//! Disconnected -> Connecting -> Connected (CONNACK) -> Subscribed (SUBACK)
//!       ^                                                   |
//!       +--------------- any connection error --------------+
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rumqttc::{
    AsyncClient, ClientError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeQueue, Pushed};
use crate::ingest::Payload;
use crate::normalize::{self, Inbound};

/// Tag carried by the probe published after every successful subscribe.
const PROBE_TAG: &str = "mqtt_test";

/// Capacity of the rumqttc request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on flushing DISCONNECT during shutdown.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

// ---

/// Connection parameters for the broker session.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    // ---
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("MQTT broker is not connected")]
    NotConnected,

    #[error("MQTT client request failed: {0}")]
    Client(#[from] ClientError),
}

/// Handle to the broker session. Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct BrokerConnector {
    inner: Arc<Inner>,
}

struct Inner {
    settings: BrokerSettings,
    queue: Arc<BridgeQueue<Payload>>,
    state: watch::Sender<ConnectorState>,
    running: Mutex<Option<Session>>,
}

struct Session {
    client: AsyncClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BrokerConnector {
    // ---
    pub fn new(settings: BrokerSettings, queue: Arc<BridgeQueue<Payload>>) -> Self {
        let (state, _) = watch::channel(ConnectorState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                settings,
                queue,
                state,
                running: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> ConnectorState {
        *self.inner.state.borrow()
    }

    /// True once CONNACK has been received and until the session drops.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectorState::Connected | ConnectorState::Subscribed
        )
    }

    /// Start the session in the background.
    ///
    /// Returns `false` without doing anything if a session is already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        // ---
        let mut running = self.inner.lock_running();
        if running.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("MQTT connector already running, start ignored");
            return false;
        }

        let settings = &self.inner.settings;
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Inner::drive(
            Arc::clone(&self.inner),
            client.clone(),
            eventloop,
            cancel.clone(),
        ));

        info!(
            "MQTT connector started for {}:{} topic '{}'",
            settings.host, settings.port, settings.topic
        );
        *running = Some(Session {
            client,
            cancel,
            task,
        });
        true
    }

    /// Disconnect from the broker and stop the background task.
    pub async fn stop(&self) {
        // ---
        let session = self.inner.lock_running().take();
        let Some(session) = session else {
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.task.await {
            error!("MQTT connector task ended abnormally: {}", e);
        }
        self.inner.set_state(ConnectorState::Disconnected);
        info!("MQTT connector stopped");
    }

    /// Publish a self-test message to the subscribed topic.
    ///
    /// The message loops back through the subscription and is discarded by the
    /// decoder, so it proves liveness without touching storage.
    pub fn publish_self_test(&self, tag_id: &str) -> Result<(), BrokerError> {
        // ---
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }

        let client = self
            .inner
            .lock_running()
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(BrokerError::NotConnected)?;

        let timestamp = Utc::now().timestamp_millis().to_string();
        client.try_publish(
            &self.inner.settings.topic,
            QoS::AtLeastOnce,
            false,
            probe_payload(tag_id, &timestamp),
        )?;
        info!("Published self-test message for tag {}", tag_id);
        Ok(())
    }
}

impl Inner {
    // ---
    fn set_state(&self, state: ConnectorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("MQTT connector {:?} -> {:?}", previous, state);
        }
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Session>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decode an inbound payload and enqueue it. Never blocks.
    fn dispatch(&self, payload: &[u8]) {
        // ---
        match normalize::decode(payload) {
            Ok(Inbound::SelfTest) => debug!("Ignoring self-test message"),
            Ok(Inbound::Telemetry(map)) => {
                if self.queue.push(map) == Pushed::EvictedOldest {
                    warn!(
                        "Bridge queue full ({}), dropped oldest payload ({} dropped so far)",
                        self.queue.capacity(),
                        self.queue.dropped()
                    );
                }
            }
            Err(e) => warn!(
                "Dropping malformed MQTT payload: {} - Raw: {}",
                e,
                String::from_utf8_lossy(payload)
            ),
        }
    }

    /// Event-loop task. Polling after an error makes rumqttc reconnect, so the
    /// loop retries forever until cancelled.
    async fn drive(
        self: Arc<Self>,
        client: AsyncClient,
        mut eventloop: EventLoop,
        cancel: CancellationToken,
    ) {
        // ---
        let topic = self.settings.topic.clone();
        self.set_state(ConnectorState::Connecting);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    disconnect(&client, &mut eventloop).await;
                    break;
                }
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.set_state(ConnectorState::Connected);
                    info!(
                        "Connected to MQTT broker {}:{}",
                        self.settings.host, self.settings.port
                    );
                    if let Err(e) = client.try_subscribe(&topic, QoS::AtLeastOnce) {
                        error!("Failed to request subscription to '{}': {}", topic, e);
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|c| matches!(c, SubscribeReasonCode::Failure))
                    {
                        error!("Broker refused subscription to '{}'", topic);
                        continue;
                    }
                    self.set_state(ConnectorState::Subscribed);
                    info!("Subscribed to topic '{}'", topic);

                    match client.try_publish(
                        &topic,
                        QoS::AtLeastOnce,
                        false,
                        probe_payload(PROBE_TAG, "0"),
                    ) {
                        Ok(()) => debug!("Connectivity probe published"),
                        Err(e) => warn!("Failed to publish connectivity probe: {}", e),
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        "MQTT message on '{}' ({} bytes)",
                        publish.topic,
                        publish.payload.len()
                    );
                    self.dispatch(&publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker closed the MQTT session");
                    self.set_state(ConnectorState::Disconnected);
                }
                Ok(_) => {}
                Err(e) => {
                    self.set_state(ConnectorState::Disconnected);
                    warn!(
                        "MQTT connection error: {}; reconnecting in {:?}",
                        e, self.settings.reconnect_delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                    }
                    self.set_state(ConnectorState::Connecting);
                }
            }
        }

        self.set_state(ConnectorState::Disconnected);
    }
}

/// Send DISCONNECT and poll until it has been written, bounded by a grace period.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    // ---
    if client.try_disconnect().is_err() {
        return;
    }

    let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;

    if flushed.is_err() {
        debug!("Timed out flushing MQTT DISCONNECT");
    }
}

fn probe_payload(tag_id: &str, timestamp: &str) -> Vec<u8> {
    serde_json::json!({
        "epc": tag_id,
        "timestamp": timestamp,
        "test": true,
    })
    .to_string()
    .into_bytes()
}
