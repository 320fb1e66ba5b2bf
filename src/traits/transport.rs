//! Wireless transport abstraction.
//!
//! A transport knows how to find one hub by hardware address, open a
//! session to it, and write opaque frames to the hub's command
//! characteristic. Timeouts are applied by the caller; a transport may take
//! as long as it likes and will be dropped mid-operation when a bound is hit.
//!
//! # Session loss
//!
//! [`open`](WirelessTransport::open) receives a [`SessionLossNotifier`]. The
//! transport must call [`SessionLossNotifier::notify`] when the link drops
//! outside of an explicit operation (hub switched off, out of range). The
//! notifier is safe to call from any thread and any number of times.

use core::fmt::Display;
use core::future::Future;

use crate::connection::SessionLossNotifier;

/// Point-to-point wireless client for a single hub.
pub trait WirelessTransport: Send {
    /// Error type reported by the radio stack.
    type Error: Display + Send;

    /// Find the device with `address` so it can be opened.
    fn discover(&mut self, address: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Open a session to `address`.
    fn open(
        &mut self,
        address: &str,
        on_lost: SessionLossNotifier,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write one frame to the command characteristic.
    fn write(&mut self, frame: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the session.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
