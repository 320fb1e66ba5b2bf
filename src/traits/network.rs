//! Message bus abstraction.
//!
//! ```text
//! train/speed/set  - Relative speed delta (numeric string)
//! train/command    - stop | forward | backward | connect | color | horn
//! train/status     - online | offline (retained, published)
//! train/speed      - Committed speed (published)
//! ```

/// Outbound side of the message bus.
///
/// Publishing is synchronous and must not block on the network: the bridge
/// calls it from the session task between wireless operations. Clients with
/// an internal request queue (rumqttc) enqueue and return.
///
/// # Example
///
/// ```rust,ignore
/// use train_bridge::traits::BusPublisher;
///
/// fn report<B: BusPublisher>(bus: &mut B, speed: i32) {
///     let payload = speed.to_string();
///     let _ = bus.publish("train/speed", payload.as_bytes(), false);
/// }
/// ```
pub trait BusPublisher {
    /// Error type for publish operations.
    type Error: core::fmt::Display;

    /// Publish a message to a topic.
    ///
    /// # Arguments
    /// - `topic`: full topic path
    /// - `payload`: message bytes
    /// - `retain`: if true, the broker keeps the message for new subscribers
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;
}

/// A message received from the bus subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Create a new message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}
