//! # train-bridge
//!
//! Bridges an MQTT control bus to a LEGO train hub over Bluetooth LE:
//! speed, light color and horn commands in, link status and speed out.
//!
//! ## Features
//!
//! - **Device profiles**: Duplo train base, Powered Up city hub and Boost move hub as plain data
//! - **Pure encoding**: intents become LWP3 frames plus inter-frame pauses, no I/O
//! - **One session owner**: a single task sequences every hub write; the bus side only queues
//! - **Heartbeat reconnect**: a fixed-period tick reconnects a lost hub and republishes status
//! - **Typed errors**: transport failures settle the link state and come back as values
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without a hub or broker:
//!
//! - `profile` - Hub variants, palettes, `Speed` and `ColorIndex`
//! - `protocol` / `encoder` - LWP3 frames for speed, color and sound
//! - `connection` - Link state machine over a `WirelessTransport`
//! - `controller` - Command execution, heartbeat, shutdown and the session task
//! - `commands` - Bus topics and payload parsing
//! - `hal` - Transports (mock for testing, btleplug for hardware)
//! - `services` - rumqttc bus adapter
//!
//! ## Example
//!
//! ```rust
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! use train_bridge::hal::{MockBus, MockTransport};
//! use train_bridge::traits::MqttMessage;
//! use train_bridge::{BridgeController, BridgeHandle, Config, DeviceConfig};
//!
//! let config = Config::default().with_device(DeviceConfig::default().with_address("90:84:2B:00:00:01"));
//! let (handle, mut commands) = BridgeHandle::channel(&config);
//! let mut bridge = BridgeController::new(MockTransport::new(), MockBus::new(), &config);
//!
//! // Bus callback side: parse and queue, never wait on the hub
//! handle.dispatch(&MqttMessage::new("train/command", "forward"));
//!
//! // Session side
//! bridge.heartbeat().await;
//! let command = commands.recv().await.unwrap();
//! bridge.execute(command).await.unwrap();
//! assert_eq!(bridge.speed().get(), 50);
//! # });
//! ```

#![warn(missing_docs)]

/// Bus topics, payload parsing and the bridge command set.
pub mod commands;
/// Bridge configuration with environment loading.
pub mod config;
/// Hub link state machine.
pub mod connection;
/// Session task: command execution, heartbeat and shutdown.
pub mod controller;
/// Intent to frame encoding.
pub mod encoder;
/// Error taxonomy.
pub mod error;
/// Transport implementations and test doubles.
pub mod hal;
/// Hub variants and value types.
pub mod profile;
/// LWP3 framing.
pub mod protocol;
/// Seams for the wireless transport and the message bus.
pub mod traits;

/// Network services (feature-gated).
#[cfg(feature = "mqtt")]
pub mod services;

// Re-exports for convenience
pub use commands::BridgeCommand;
pub use config::{BridgeConfig, Config, DeviceConfig, MqttConfig, SpeedMode};
pub use connection::{
    ConnectOutcome, ConnectionManager, ConnectionState, LinkSettings, SessionLossNotifier,
};
pub use controller::{BridgeController, BridgeHandle};
pub use encoder::{FramePlan, PlannedFrame, SoundPlan};
pub use error::{BridgeError, ConfigError, ConnectError, PayloadParseError, SendError, SubmitError};
pub use profile::{ColorIndex, DeviceProfile, HubColor, HubKind, Speed};
pub use protocol::CommandFrame;
pub use traits::{BusPublisher, MqttMessage, WirelessTransport};
