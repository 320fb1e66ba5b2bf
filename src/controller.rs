//! Bridge controller: the single session task.
//!
//! The [`BridgeController`] owns the [`ConnectionManager`], the bus publisher,
//! and the committed [`Speed`] and [`ColorIndex`]. Everything that touches the
//! hub happens inside [`BridgeController::run`], one operation at a time.
//!
//! # Event sources
//!
//! ```text
//!   bus callback ──try_send──▶ mpsc ──┐
//!                                     ├──▶ run() ──▶ encoder ──▶ ConnectionManager ──▶ hub
//!   heartbeat interval ───────────────┘       └────▶ BusPublisher (status, speed)
//! ```
//!
//! Bus messages enter through a [`BridgeHandle`], which parses them and
//! queues a [`BridgeCommand`] without waiting for it to run. Commands from
//! the bus run in arrival order; heartbeat ticks interleave between them.
//!
//! # Heartbeat
//!
//! Every tick: if the link is down, try to connect once. Then publish the
//! link status (retained) and the committed speed, whatever the outcome.
//! The heartbeat is the only retry mechanism.
//!
//! # Example
//!
//! ```rust
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! use train_bridge::config::{Config, DeviceConfig};
//! use train_bridge::hal::{MockBus, MockTransport};
//! use train_bridge::{BridgeCommand, BridgeController};
//!
//! let config = Config::default().with_device(DeviceConfig::default().with_address("90:84:2B:00:00:01"));
//! let mut bridge = BridgeController::new(MockTransport::new(), MockBus::new(), &config);
//!
//! bridge.heartbeat().await;
//! assert_eq!(bridge.bus().last_payload("train/status"), Some("online"));
//!
//! bridge.execute(BridgeCommand::AdjustSpeed(30)).await.unwrap();
//! assert_eq!(bridge.speed().get(), 30);
//! # });
//! ```

use core::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::commands::{
    BridgeCommand, STATUS_OFFLINE, STATUS_ONLINE, TOPIC_SPEED, TOPIC_STATUS,
};
use crate::config::{Config, SpeedMode};
use crate::connection::{ConnectOutcome, ConnectionManager, ConnectionState, LinkSettings};
use crate::encoder::{encode_color, encode_sound, encode_speed, PlannedFrame};
use crate::error::{BridgeError, ConnectError, SendError, SubmitError};
use crate::profile::{ColorIndex, DeviceProfile, Speed};
use crate::traits::{BusPublisher, MqttMessage, WirelessTransport};

// ============================================================================
// Controller
// ============================================================================

/// Sequences encoder and connection calls for one hub.
pub struct BridgeController<T: WirelessTransport, B: BusPublisher> {
    connection: ConnectionManager<T>,
    bus: B,
    profile: DeviceProfile,
    link: LinkSettings,
    status_topic: String,
    speed_topic: String,
    heartbeat: Duration,
    speed: Speed,
    color: ColorIndex,
}

impl<T: WirelessTransport, B: BusPublisher> BridgeController<T, B> {
    /// Create a controller for the hub described by `config`.
    ///
    /// Starts `Disconnected`, stopped, on the first palette color.
    pub fn new(transport: T, bus: B, config: &Config) -> Self {
        Self {
            connection: ConnectionManager::new(transport),
            bus,
            profile: DeviceProfile::for_kind(config.device.hub),
            link: LinkSettings::from_config(config),
            status_topic: config.mqtt.topic(TOPIC_STATUS).as_str().to_string(),
            speed_topic: config.mqtt.topic(TOPIC_SPEED).as_str().to_string(),
            heartbeat: Duration::from_millis(u64::from(config.bridge.heartbeat_ms.max(1))),
            speed: Speed::STOP,
            color: ColorIndex::default(),
        }
    }

    /// Committed speed.
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Active palette slot.
    pub fn color_index(&self) -> ColorIndex {
        self.color
    }

    /// Active device profile.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Link state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The connection manager.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// The connection manager, mutably.
    pub fn connection_mut(&mut self) -> &mut ConnectionManager<T> {
        &mut self.connection
    }

    /// The bus publisher.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The bus publisher, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Run one command. Failures are logged and returned; state is only
    /// committed on success.
    pub async fn execute(&mut self, command: BridgeCommand) -> Result<(), BridgeError> {
        debug!(command = command.name(), "executing");
        let result: Result<(), BridgeError> = match command {
            BridgeCommand::AdjustSpeed(delta) => self.adjust_speed(delta).await.map_err(Into::into),
            BridgeCommand::SetSpeed(target) => self.set_speed(target).await.map_err(Into::into),
            BridgeCommand::Connect => self.connect().await.map(|_| ()).map_err(Into::into),
            BridgeCommand::NextColor => self.next_color().await.map_err(Into::into),
            BridgeCommand::Horn => self.horn().await.map_err(Into::into),
        };
        if let Err(e) = &result {
            warn!(command = command.name(), error = %e, "command failed");
        }
        result
    }

    /// Drive the motor at `target` and commit it once the frame is written.
    pub async fn set_speed(&mut self, target: Speed) -> Result<(), SendError> {
        let frame = encode_speed(&self.profile, target);
        self.connection.send_frame(&frame).await?;
        if target != self.speed {
            info!(from = %self.speed, to = %target, "speed changed");
        }
        self.speed = target;
        Ok(())
    }

    /// Add `delta` to the committed speed, clamped to `[-100, 100]`.
    pub async fn adjust_speed(&mut self, delta: i32) -> Result<(), SendError> {
        self.set_speed(self.speed.offset(delta)).await
    }

    /// Advance to the next palette color. The index is committed only if
    /// every frame was written.
    pub async fn next_color(&mut self) -> Result<(), SendError> {
        let next = self.color.next();
        let plan = encode_color(&self.profile, next);
        self.execute_plan(&plan).await?;
        self.color = next;
        info!(index = next.get(), color = ?self.profile.color_at(next), "color changed");
        Ok(())
    }

    /// Play the horn, or flash it on hubs without a speaker.
    ///
    /// Stops at the first failed write.
    pub async fn horn(&mut self) -> Result<(), SendError> {
        let plan = encode_sound(&self.profile, self.color);
        self.execute_plan(plan.frames()).await?;
        debug!(emulated = self.profile.sound_emulated(), "horn played");
        Ok(())
    }

    /// Bring the link up. Publishes a retained `online` when a new session opens.
    pub async fn connect(&mut self) -> Result<ConnectOutcome, ConnectError> {
        let outcome = self.connection.connect(&self.link).await?;
        if outcome == ConnectOutcome::Established {
            self.publish_status();
        }
        Ok(outcome)
    }

    async fn execute_plan(&mut self, plan: &[PlannedFrame]) -> Result<(), SendError> {
        for step in plan {
            self.connection.send_frame(&step.frame).await?;
            if !step.pause_after.is_zero() {
                tokio::time::sleep(step.pause_after).await;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Heartbeat and status
    // ========================================================================

    /// One heartbeat cycle.
    pub async fn heartbeat(&mut self) {
        if !self.connection.is_connected() {
            // failure is logged by the connection manager; next tick retries
            let _ = self.connect().await;
        }
        self.publish_status();
        let speed = self.speed.to_string();
        let topic = self.speed_topic.clone();
        self.publish(&topic, speed.as_bytes(), false);
    }

    /// Controlled shutdown: stop the motor, close the session, report `offline`.
    pub async fn shutdown(&mut self) {
        info!("shutting down bridge");
        if self.connection.is_connected() {
            if let Err(e) = self.set_speed(Speed::STOP).await {
                warn!(error = %e, "failed to stop motor on shutdown");
            }
        }
        self.connection.disconnect().await;
        self.publish_status_value(STATUS_OFFLINE);
    }

    fn publish_status(&mut self) {
        let status = if self.connection.is_connected() {
            STATUS_ONLINE
        } else {
            STATUS_OFFLINE
        };
        self.publish_status_value(status);
    }

    fn publish_status_value(&mut self, status: &str) {
        let topic = self.status_topic.clone();
        self.publish(&topic, status.as_bytes(), true);
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) {
        if let Err(e) = self.bus.publish(topic, payload, retain) {
            warn!(topic, error = %e, "publish failed");
        }
    }

    // ========================================================================
    // Session task
    // ========================================================================

    /// Run until `shutdown` resolves, then perform the shutdown sequence.
    ///
    /// Publishes a retained `offline` first. The first heartbeat fires
    /// immediately. If every [`BridgeHandle`] is dropped the heartbeat keeps
    /// running. Returns the controller for inspection.
    pub async fn run<F>(mut self, mut commands: mpsc::Receiver<BridgeCommand>, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        self.publish_status_value(STATUS_OFFLINE);

        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut accepting = true;
        info!(heartbeat_ms = self.heartbeat.as_millis() as u64, hub = %self.profile.kind, "bridge running");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                _ = ticker.tick() => self.heartbeat().await,

                command = commands.recv(), if accepting => match command {
                    Some(command) => {
                        let _ = self.execute(command).await;
                    }
                    None => {
                        info!("command channel closed");
                        accepting = false;
                    }
                },
            }
        }

        self.shutdown().await;
        self
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable entry point for the bus side.
///
/// Never blocks: commands are queued with `try_send` and dropped when the
/// queue is full.
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    tx: mpsc::Sender<BridgeCommand>,
    prefix: String,
    speed_mode: SpeedMode,
}

impl BridgeHandle {
    /// Create a handle and the receiver to pass to [`BridgeController::run`].
    pub fn channel(config: &Config) -> (Self, mpsc::Receiver<BridgeCommand>) {
        let (tx, rx) = mpsc::channel(config.bridge.queue_depth.max(1));
        let handle = Self {
            tx,
            prefix: config.mqtt.topic_prefix.as_str().to_string(),
            speed_mode: config.bridge.speed_mode,
        };
        (handle, rx)
    }

    /// Queue a command for the session task.
    pub fn submit(&self, command: BridgeCommand) -> Result<(), SubmitError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::QueueFull,
            TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Parse a bus message and queue the resulting command.
    ///
    /// Returns the queued command. Unknown topics, bad payloads and a full
    /// queue are logged and yield `None`.
    pub fn dispatch(&self, msg: &MqttMessage) -> Option<BridgeCommand> {
        let command = match BridgeCommand::from_message(msg, &self.prefix, self.speed_mode) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "ignoring message");
                return None;
            }
        };

        match self.submit(command) {
            Ok(()) => Some(command),
            Err(e) => {
                warn!(topic = %msg.topic, command = command.name(), error = %e, "dropping command");
                None
            }
        }
    }

    /// True once the session task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
