//! MQTT bus adapter built on `rumqttc`.
//!
//! **Subscribe Topics** (one wildcard subscription, `train/#`):
//! - `train/speed/set` - Speed delta (or absolute speed), numeric string
//! - `train/command` - `stop`, `forward`, `backward`, `connect`, `color`, `horn`
//!
//! **Publish Topics:**
//! - `train/status` - `online` / `offline` (retained)
//! - `train/speed` - Committed speed, decimal string
//!
//! The adapter owns the `rumqttc` event loop. Inbound publishes go through
//! [`BridgeHandle::dispatch`], which never waits on the hub. Outbound
//! publishes from the controller go through [`MqttPublisher`], which only
//! enqueues into the client's request channel.
//!
//! # Example
//!
//! ```ignore
//! let (client, eventloop) = connect_bus(&MqttRuntimeConfig::from_config(&config.mqtt));
//! let (handle, commands) = BridgeHandle::channel(&config);
//!
//! let adapter = MqttBusAdapter::new(eventloop, client.clone(), handle, config.mqtt.subscription().as_str());
//! tokio::spawn(adapter.run());
//!
//! let bridge = BridgeController::new(transport, MqttPublisher::new(client), &config);
//! bridge.run(commands, shutdown).await;
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tracing::{debug, info, warn};

use crate::config::MqttConfig as SharedMqttConfig;
use crate::controller::BridgeHandle;
use crate::traits::{BusPublisher, MqttMessage};

/// Pause after an event loop error before polling again (which reconnects).
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the `rumqttc` request channel.
pub const REQUEST_CAPACITY: usize = 32;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime MQTT client configuration for `rumqttc`.
///
/// This struct uses `String` for runtime compatibility with the `rumqttc` library.
/// Convert from [`crate::config::MqttConfig`] with [`MqttRuntimeConfig::from_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttRuntimeConfig {
    /// MQTT broker hostname
    pub host: String,
    /// MQTT broker port
    pub port: u16,
    /// Client ID
    pub client_id: String,
    /// Username (empty = anonymous)
    pub username: String,
    /// Password
    pub password: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl Default for MqttRuntimeConfig {
    fn default() -> Self {
        Self::from_config(&SharedMqttConfig::default())
    }
}

impl MqttRuntimeConfig {
    /// Create a new config with the given broker address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Create from shared MqttConfig
    pub fn from_config(config: &SharedMqttConfig) -> Self {
        Self {
            host: config.host.as_str().to_string(),
            port: config.port,
            client_id: config.client_id.as_str().to_string(),
            username: config.username.as_str().to_string(),
            password: config.password.as_str().to_string(),
            keep_alive_secs: config.keep_alive_secs,
        }
    }

    /// Set the client ID
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// `rumqttc` options for this configuration.
    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(u64::from(self.keep_alive_secs.max(5))));
        if !self.username.is_empty() {
            options.set_credentials(&self.username, &self.password);
        }
        options
    }
}

/// Create the client and its event loop. No I/O happens until the loop is polled.
pub fn connect_bus(config: &MqttRuntimeConfig) -> (AsyncClient, EventLoop) {
    info!(host = %config.host, port = config.port, client_id = %config.client_id, "configuring MQTT client");
    AsyncClient::new(config.options(), REQUEST_CAPACITY)
}

// ============================================================================
// Publisher
// ============================================================================

/// [`BusPublisher`] over a `rumqttc` client. Publishes at QoS 1 without waiting.
#[derive(Clone, Debug)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Wrap a client.
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl BusPublisher for MqttPublisher {
    type Error = ClientError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ClientError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// What the adapter does with one event loop event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EventAction {
    /// Broker session (re)established: subscribe.
    Subscribe,
    /// Inbound message for the bridge.
    Dispatch(MqttMessage),
    /// We sent a DISCONNECT: stop polling.
    Stop,
    /// Nothing to do.
    Ignore,
}

pub(crate) fn classify(event: Event) -> EventAction {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => EventAction::Subscribe,
        Event::Incoming(Packet::Publish(publish)) => {
            EventAction::Dispatch(MqttMessage::new(publish.topic, publish.payload.to_vec()))
        }
        Event::Outgoing(Outgoing::Disconnect) => EventAction::Stop,
        _ => EventAction::Ignore,
    }
}

/// Drives the `rumqttc` event loop and feeds inbound messages to the bridge.
pub struct MqttBusAdapter {
    eventloop: EventLoop,
    client: AsyncClient,
    handle: BridgeHandle,
    subscription: String,
}

impl MqttBusAdapter {
    /// Create an adapter subscribing to `subscription` (e.g. `train/#`).
    pub fn new(
        eventloop: EventLoop,
        client: AsyncClient,
        handle: BridgeHandle,
        subscription: impl Into<String>,
    ) -> Self {
        Self {
            eventloop,
            client,
            handle,
            subscription: subscription.into(),
        }
    }

    /// Poll until the client disconnects.
    ///
    /// Connection errors are logged and retried after [`RECONNECT_DELAY`];
    /// the subscription is renewed on every ConnAck.
    pub async fn run(mut self) {
        loop {
            match self.eventloop.poll().await {
                Ok(event) => match classify(event) {
                    EventAction::Subscribe => {
                        info!(filter = %self.subscription, "MQTT connected, subscribing");
                        if let Err(e) = self.client.try_subscribe(&self.subscription, QoS::AtLeastOnce) {
                            warn!(error = %e, "subscribe failed");
                        }
                    }
                    EventAction::Dispatch(msg) => {
                        debug!(topic = %msg.topic, "MQTT message");
                        self.handle.dispatch(&msg);
                    }
                    EventAction::Stop => {
                        info!("MQTT disconnected");
                        break;
                    }
                    EventAction::Ignore => {}
                },
                Err(e) => {
                    warn!(error = %e, "MQTT connection error");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}
