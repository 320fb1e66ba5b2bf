//! Connection lifecycle for the single hub session.
//!
//! [`ConnectionManager`] owns the transport and the one [`ConnectionState`]
//! value in the system:
//!
//! ```text
//! Disconnected --connect ok--> Connecting --open ok--> Connected
//!       ^                          |                       |
//!       +------- failure ----------+                       |
//!       +------- session lost / write failure / disconnect-+
//! ```
//!
//! The state lives in an atomic cell shared with the [`SessionLossNotifier`]
//! handed to the transport, so a radio callback on another thread can drop
//! the link without touching anything else. Each open gets a fresh
//! generation; a notifier from an older session cannot disconnect a newer one.
//!
//! # Example
//!
//! ```rust
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! use train_bridge::encoder::encode_speed;
//! use train_bridge::hal::MockTransport;
//! use train_bridge::{ConnectionManager, ConnectionState, DeviceProfile, LinkSettings, SendError, Speed};
//!
//! let mut connection = ConnectionManager::new(MockTransport::new());
//! let frame = encode_speed(&DeviceProfile::CITY_HUB, Speed::clamped(30));
//!
//! assert_eq!(connection.send_frame(&frame).await, Err(SendError::NotConnected));
//!
//! connection.connect(&LinkSettings::new("90:84:2B:00:00:01")).await.unwrap();
//! assert_eq!(connection.state(), ConnectionState::Connected);
//! connection.send_frame(&frame).await.unwrap();
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConnectError, SendError};
use crate::protocol::CommandFrame;
use crate::traits::WirelessTransport;

/// Default bound on device discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on opening a session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// State
// ============================================================================

/// Link state of the hub session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected = 0,
    /// A connect attempt is in progress.
    Connecting = 1,
    /// Session open; frames may be written.
    Connected = 2,
}

impl ConnectionState {
    /// Returns the state as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    const fn from_bits(bits: u64) -> Self {
        match bits & STATE_MASK {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const STATE_MASK: u64 = 0xFF;

/// Generation counter in the upper bits, state in the low byte.
#[derive(Clone, Debug, Default)]
struct LinkCell(Arc<AtomicU64>);

impl LinkCell {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Enters `Connecting` under a new generation and returns it.
    fn begin_connect(&self) -> u64 {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let generation = (bits >> 8).wrapping_add(1);
                Some(pack(generation, ConnectionState::Connecting))
            })
            .unwrap_or_else(|bits| bits);
        (previous >> 8).wrapping_add(1)
    }

    /// `Connecting -> Connected`, only if nothing dropped the link meanwhile.
    fn promote(&self, generation: u64) -> bool {
        self.0
            .compare_exchange(
                pack(generation, ConnectionState::Connecting),
                pack(generation, ConnectionState::Connected),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn set_disconnected(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(pack(bits >> 8, ConnectionState::Disconnected))
            });
    }

    /// Disconnects only if `generation` is still the current session.
    fn drop_generation(&self, generation: u64) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let current = ConnectionState::from_bits(bits);
                if bits >> 8 == generation && current != ConnectionState::Disconnected {
                    Some(pack(generation, ConnectionState::Disconnected))
                } else {
                    None
                }
            })
            .is_ok()
    }
}

const fn pack(generation: u64, state: ConnectionState) -> u64 {
    (generation << 8) | state as u64
}

/// Handle given to the transport to report an unexpected link drop.
///
/// Cloneable, `Send + Sync`, and idempotent: the first call moves the link
/// to `Disconnected`, later calls do nothing.
#[derive(Clone, Debug)]
pub struct SessionLossNotifier {
    link: LinkCell,
    generation: u64,
}

impl SessionLossNotifier {
    /// Reports that the session this notifier was issued for has been lost.
    ///
    /// Returns `true` if this call changed the state.
    pub fn notify(&self) -> bool {
        let dropped = self.link.drop_generation(self.generation);
        if dropped {
            warn!("hub session lost");
        }
        dropped
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Where and how long to try when connecting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSettings {
    /// Hardware address of the hub.
    pub address: String,
    /// Run discovery before opening the session.
    pub discover: bool,
    /// Bound on discovery.
    pub discovery_timeout: Duration,
    /// Bound on opening the session.
    pub session_timeout: Duration,
}

impl LinkSettings {
    /// Settings for `address` with default bounds.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            discover: true,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Settings taken from the device and bridge configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            address: config.device.address.as_str().to_string(),
            discover: config.device.discover,
            discovery_timeout: Duration::from_millis(u64::from(config.bridge.discovery_timeout_ms)),
            session_timeout: Duration::from_millis(u64::from(config.bridge.session_timeout_ms)),
        }
    }

    /// Skip or run discovery.
    pub fn with_discover(mut self, discover: bool) -> Self {
        self.discover = discover;
        self
    }
}

// ============================================================================
// Connection Manager
// ============================================================================

/// Result of a successful [`ConnectionManager::connect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The link was already up; nothing was done.
    AlreadyConnected,
    /// A new session was opened.
    Established,
}

/// Owns the wireless session and its state.
pub struct ConnectionManager<T: WirelessTransport> {
    transport: T,
    link: LinkCell,
    /// A session may exist on the transport and should be closed before reuse.
    session_open: bool,
}

impl<T: WirelessTransport> ConnectionManager<T> {
    /// Create a manager in the `Disconnected` state.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            link: LinkCell::default(),
            session_open: false,
        }
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// True when frames may be written.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Bring the link up.
    ///
    /// No-op when already connected. Otherwise any stale session is closed,
    /// the device is discovered (if enabled) and a session opened, each step
    /// bounded by its timeout. On any failure the state is `Disconnected`.
    pub async fn connect(&mut self, settings: &LinkSettings) -> Result<ConnectOutcome, ConnectError> {
        if self.is_connected() {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        self.release_session().await;
        let generation = self.link.begin_connect();
        info!(address = %settings.address, "connecting to hub");

        match self.establish(settings, generation).await {
            Ok(()) => {
                info!(address = %settings.address, "hub connected");
                Ok(ConnectOutcome::Established)
            }
            Err(e) => {
                self.link.set_disconnected();
                self.release_session().await;
                warn!(address = %settings.address, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    async fn establish(&mut self, settings: &LinkSettings, generation: u64) -> Result<(), ConnectError> {
        if settings.discover {
            let discovery = self.transport.discover(&settings.address);
            match tokio::time::timeout(settings.discovery_timeout, discovery).await {
                Err(_) => return Err(ConnectError::DiscoveryTimeout(settings.discovery_timeout)),
                Ok(Err(e)) => return Err(ConnectError::Transport(e.to_string())),
                Ok(Ok(())) => debug!("hub discovered"),
            }
        }

        let notifier = SessionLossNotifier {
            link: self.link.clone(),
            generation,
        };
        self.session_open = true;
        let open = self.transport.open(&settings.address, notifier);
        match tokio::time::timeout(settings.session_timeout, open).await {
            Err(_) => return Err(ConnectError::SessionTimeout(settings.session_timeout)),
            Ok(Err(e)) => return Err(ConnectError::Transport(e.to_string())),
            Ok(Ok(())) => {}
        }

        if self.link.promote(generation) {
            Ok(())
        } else {
            Err(ConnectError::SessionLost)
        }
    }

    /// Write one frame.
    ///
    /// Fails with [`SendError::NotConnected`] without touching the transport
    /// unless the link is up. A failed write marks the link `Disconnected`.
    pub async fn send_frame(&mut self, frame: &CommandFrame) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }

        match self.transport.write(frame.as_bytes()).await {
            Ok(()) => {
                debug!(?frame, "frame written");
                Ok(())
            }
            Err(e) => {
                self.link.set_disconnected();
                warn!(error = %e, "write failed, link marked down");
                Err(SendError::Transport(e.to_string()))
            }
        }
    }

    /// The link dropped outside any operation.
    ///
    /// Idempotent and safe alongside an in-flight [`send_frame`](Self::send_frame).
    pub fn on_session_lost(&self) {
        if self.state() != ConnectionState::Disconnected {
            warn!("hub session lost");
        }
        self.link.set_disconnected();
    }

    /// Close the session, ignoring transport errors. Always ends `Disconnected`.
    pub async fn disconnect(&mut self) {
        self.release_session().await;
        self.link.set_disconnected();
        info!("hub disconnected");
    }

    async fn release_session(&mut self) {
        if !self.session_open {
            return;
        }
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "ignoring close error");
        }
        self.session_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_speed;
    use crate::hal::{MockStep, MockTransport};
    use crate::profile::{DeviceProfile, Speed};

    const ADDRESS: &str = "90:84:2B:00:00:01";

    fn frame() -> CommandFrame {
        encode_speed(&DeviceProfile::CITY_HUB, Speed::clamped(40))
    }

    fn settings() -> LinkSettings {
        LinkSettings::new(ADDRESS)
    }

    // ========================================================================
    // Connect
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_disconnected() {
        let connection = ConnectionManager::new(MockTransport::new());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success() {
        let mut connection = ConnectionManager::new(MockTransport::new());

        let outcome = connection.connect(&settings()).await;

        assert_eq!(outcome, Ok(ConnectOutcome::Established));
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connection.transport().discover_calls, 1);
        assert_eq!(connection.transport().open_calls, 1);
        assert_eq!(connection.transport().opened_address.as_deref(), Some(ADDRESS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_when_connected_is_noop() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();

        let outcome = connection.connect(&settings()).await;

        assert_eq!(outcome, Ok(ConnectOutcome::AlreadyConnected));
        assert_eq!(connection.transport().open_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_skips_discovery_when_disabled() {
        let mut connection = ConnectionManager::new(MockTransport::new());

        connection
            .connect(&settings().with_discover(false))
            .await
            .unwrap();

        assert_eq!(connection.transport().discover_calls, 0);
        assert!(connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_timeout() {
        let mut transport = MockTransport::new();
        transport.discover = MockStep::Hang;
        let mut connection = ConnectionManager::new(transport);

        let outcome = connection.connect(&settings()).await;

        assert_eq!(
            outcome,
            Err(ConnectError::DiscoveryTimeout(DEFAULT_DISCOVERY_TIMEOUT))
        );
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.transport().open_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_timeout_closes_half_open_session() {
        let mut transport = MockTransport::new();
        transport.open = MockStep::Hang;
        let mut connection = ConnectionManager::new(transport);

        let outcome = connection.connect(&settings()).await;

        assert_eq!(
            outcome,
            Err(ConnectError::SessionTimeout(DEFAULT_SESSION_TIMEOUT))
        );
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.transport().close_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_error() {
        let mut transport = MockTransport::new();
        transport.discover = MockStep::Fail;
        let mut connection = ConnectionManager::new(transport);

        let outcome = connection.connect(&settings()).await;

        assert!(matches!(outcome, Err(ConnectError::Transport(_))));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_error() {
        let mut transport = MockTransport::new();
        transport.open = MockStep::Fail;
        let mut connection = ConnectionManager::new(transport);

        let outcome = connection.connect(&settings()).await;

        assert!(matches!(outcome, Err(ConnectError::Transport(_))));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_during_open_fails_connect() {
        let mut transport = MockTransport::new();
        transport.lose_link_on_open = true;
        let mut connection = ConnectionManager::new(transport);

        let outcome = connection.connect(&settings()).await;

        assert_eq!(outcome, Err(ConnectError::SessionLost));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_closes_stale_session() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();
        connection.on_session_lost();

        connection.connect(&settings()).await.unwrap();

        assert_eq!(connection.transport().close_calls, 1);
        assert_eq!(connection.transport().open_calls, 2);
        assert!(connection.is_connected());
    }

    // ========================================================================
    // Send
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_never_reaches_transport() {
        let mut connection = ConnectionManager::new(MockTransport::new());

        let result = connection.send_frame(&frame()).await;

        assert_eq!(result, Err(SendError::NotConnected));
        assert_eq!(connection.transport().write_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_writes_frame_bytes() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();

        connection.send_frame(&frame()).await.unwrap();

        assert_eq!(connection.transport().writes, vec![frame().as_bytes().to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_drops_link() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();
        connection.transport_mut().fail_writes = true;

        let result = connection.send_frame(&frame()).await;

        assert!(matches!(result, Err(SendError::Transport(_))));
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        let result = connection.send_frame(&frame()).await;
        assert_eq!(result, Err(SendError::NotConnected));
        assert_eq!(connection.transport().write_attempts, 1);
    }

    // ========================================================================
    // Session loss
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_session_loss_blocks_sends_until_reconnect() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();

        assert!(connection.transport().drop_link());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(
            connection.send_frame(&frame()).await,
            Err(SendError::NotConnected)
        );

        connection.connect(&settings()).await.unwrap();
        assert_eq!(connection.send_frame(&frame()).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_loss_is_idempotent() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();

        assert!(connection.transport().drop_link());
        assert!(!connection.transport().drop_link());
        connection.on_session_lost();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_notifier_cannot_drop_new_session() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();
        let stale = connection.transport().last_notifier().cloned().unwrap();

        connection.on_session_lost();
        connection.connect(&settings()).await.unwrap();

        assert!(!stale.notify());
        assert!(connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_from_another_thread() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();
        let notifier = connection.transport().last_notifier().cloned().unwrap();

        std::thread::spawn(move || notifier.notify()).join().unwrap();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_during_successful_write() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();
        connection.transport_mut().lose_link_on_write = true;

        assert_eq!(connection.send_frame(&frame()).await, Ok(()));
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        assert_eq!(
            connection.send_frame(&frame()).await,
            Err(SendError::NotConnected)
        );
        assert_eq!(connection.transport().writes.len(), 1);
        assert_eq!(connection.transport().write_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_during_failing_write() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();
        connection.transport_mut().lose_link_on_write = true;
        connection.transport_mut().fail_writes = true;

        let result = connection.send_frame(&frame()).await;

        assert!(matches!(result, Err(SendError::Transport(_))));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(
            connection.send_frame(&frame()).await,
            Err(SendError::NotConnected)
        );
        assert_eq!(connection.transport().write_attempts, 1);
    }

    // ========================================================================
    // Disconnect
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_swallows_close_error() {
        let mut connection = ConnectionManager::new(MockTransport::new());
        connection.connect(&settings()).await.unwrap();
        connection.transport_mut().fail_close = true;

        connection.disconnect().await;

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.transport().close_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_session() {
        let mut connection = ConnectionManager::new(MockTransport::new());

        connection.disconnect().await;

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.transport().close_calls, 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
    }
}
