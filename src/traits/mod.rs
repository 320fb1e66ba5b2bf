//! Trait definitions for the two external collaborators.
//!
//! The bridge drives a wireless hub and talks to a message bus, but owns
//! neither client. These traits are the seams:
//!
//! - `transport`: [`WirelessTransport`] discovers a hub, opens a session and
//!   writes frames to its characteristic
//! - `network`: [`BusPublisher`] publishes status and telemetry, and
//!   [`MqttMessage`] carries inbound messages
//!
//! Mock implementations live in [`crate::hal::mock`].

pub mod network;
pub mod transport;

pub use network::*;
pub use transport::*;
