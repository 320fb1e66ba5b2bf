//! Mock implementations for testing without a hub or broker.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockTransport`] | [`WirelessTransport`] | Records frames, scripted failures, simulated radio loss |
//! | [`MockBus`] | [`BusPublisher`] | Captures publishes |
//!
//! # Example
//!
//! ```rust
//! use train_bridge::hal::{MockBus, MockTransport};
//! use train_bridge::traits::BusPublisher;
//!
//! let mut bus = MockBus::new();
//! bus.publish("train/status", b"online", true).unwrap();
//! assert_eq!(bus.published_to("train/status").len(), 1);
//! assert_eq!(bus.last_payload("train/status"), Some("online"));
//!
//! let transport = MockTransport::new();
//! assert!(transport.writes.is_empty());
//! ```
//!
//! [`WirelessTransport`]: crate::traits::WirelessTransport
//! [`BusPublisher`]: crate::traits::BusPublisher

use crate::connection::SessionLossNotifier;
use crate::traits::{BusPublisher, WirelessTransport};

// ============================================================================
// Transport Mock
// ============================================================================

/// Scripted outcome of a mock transport step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MockStep {
    /// Complete successfully.
    #[default]
    Succeed,
    /// Return an error.
    Fail,
    /// Never complete.
    Hang,
}

/// Error reported by [`MockTransport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("mock transport: {0} failed")]
pub struct MockTransportError(pub &'static str);

/// Mock wireless transport.
///
/// Records every frame written and every call made. Use the public fields to
/// script failures and inspect what happened.
///
/// # Example
///
/// ```rust
/// use train_bridge::hal::{MockStep, MockTransport};
///
/// let mut transport = MockTransport::new();
/// transport.open = MockStep::Hang;   // session open never completes
/// transport.fail_after_writes = Some(2);  // third write fails
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Behaviour of `discover`.
    pub discover: MockStep,
    /// Behaviour of `open`.
    pub open: MockStep,
    /// Every write fails.
    pub fail_writes: bool,
    /// Writes fail once this many frames have been recorded.
    pub fail_after_writes: Option<usize>,
    /// `close` returns an error.
    pub fail_close: bool,
    /// Fire the loss notifier from inside `open`, before it returns.
    pub lose_link_on_open: bool,
    /// Fire the loss notifier from another thread while a write is in flight.
    pub lose_link_on_write: bool,
    /// Frames successfully written, in order.
    pub writes: Vec<Vec<u8>>,
    /// Number of `write` calls, failed ones included.
    pub write_attempts: usize,
    /// Number of `discover` calls.
    pub discover_calls: usize,
    /// Number of `open` calls.
    pub open_calls: usize,
    /// Number of `close` calls.
    pub close_calls: usize,
    /// Address passed to the last `open`.
    pub opened_address: Option<String>,
    notifier: Option<SessionLossNotifier>,
}

impl MockTransport {
    /// Creates a transport where every step succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport whose device is never found.
    pub fn unreachable() -> Self {
        Self {
            discover: MockStep::Fail,
            ..Self::default()
        }
    }

    /// Simulate the radio dropping the link.
    ///
    /// Returns `true` if this changed the connection state.
    pub fn drop_link(&self) -> bool {
        self.notifier.as_ref().is_some_and(|n| n.notify())
    }

    /// Notifier handed over by the last `open`.
    pub fn last_notifier(&self) -> Option<&SessionLossNotifier> {
        self.notifier.as_ref()
    }

    /// Clears recorded frames.
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    async fn step(step: MockStep, name: &'static str) -> Result<(), MockTransportError> {
        match step {
            MockStep::Succeed => Ok(()),
            MockStep::Fail => Err(MockTransportError(name)),
            MockStep::Hang => std::future::pending().await,
        }
    }
}

impl WirelessTransport for MockTransport {
    type Error = MockTransportError;

    async fn discover(&mut self, _address: &str) -> Result<(), MockTransportError> {
        self.discover_calls += 1;
        Self::step(self.discover, "discover").await
    }

    async fn open(
        &mut self,
        address: &str,
        on_lost: SessionLossNotifier,
    ) -> Result<(), MockTransportError> {
        self.open_calls += 1;
        self.opened_address = Some(address.to_string());
        if self.lose_link_on_open {
            on_lost.notify();
        }
        self.notifier = Some(on_lost);
        Self::step(self.open, "open").await
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), MockTransportError> {
        self.write_attempts += 1;
        if self.lose_link_on_write {
            if let Some(notifier) = self.notifier.clone() {
                let _ = std::thread::spawn(move || notifier.notify()).join();
            }
        }
        let budget_spent = self
            .fail_after_writes
            .is_some_and(|limit| self.writes.len() >= limit);
        if self.fail_writes || budget_spent {
            return Err(MockTransportError("write"));
        }
        self.writes.push(frame.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MockTransportError> {
        self.close_calls += 1;
        self.notifier = None;
        if self.fail_close {
            Err(MockTransportError("close"))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Bus Mock
// ============================================================================

/// Mock bus publisher for testing.
///
/// Records every publish as `(topic, payload, retain)`.
#[derive(Debug, Default)]
pub struct MockBus {
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Every publish fails while set.
    pub fail: bool,
}

impl MockBus {
    /// Creates a new mock bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get published messages for a topic
    pub fn published_to(&self, topic: &str) -> Vec<&(String, Vec<u8>, bool)> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .collect()
    }

    /// Payloads published to a topic, as strings
    pub fn payloads(&self, topic: &str) -> Vec<&str> {
        self.published_to(topic)
            .into_iter()
            .filter_map(|(_, payload, _)| core::str::from_utf8(payload).ok())
            .collect()
    }

    /// Most recent payload published to a topic
    pub fn last_payload(&self, topic: &str) -> Option<&str> {
        self.payloads(topic).pop()
    }

    /// Forget everything published so far
    pub fn clear(&mut self) {
        self.published.clear();
    }
}

/// Error reported by [`MockBus`] while `fail` is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("mock bus unavailable")]
pub struct MockBusError;

impl BusPublisher for MockBus {
    type Error = MockBusError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), MockBusError> {
        if self.fail {
            return Err(MockBusError);
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
