//! Network services.
//!
//! - `mqtt` feature: `rumqttc` bus adapter feeding a [`BridgeHandle`](crate::BridgeHandle)
//!   and publishing controller status through [`MqttPublisher`].

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::*;
