//! Bridge configuration.
//!
//! Uses `heapless::String` for the string fields so a config is a plain,
//! fixed-size value that can be cloned into tasks freely.
//!
//! # Example
//!
//! ```rust
//! use train_bridge::config::{BridgeConfig, Config, DeviceConfig, MqttConfig, SpeedMode};
//! use train_bridge::HubKind;
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.mqtt.topic("status").as_str(), "train/status");
//!
//! // Or customize
//! let config = Config::default()
//!     .with_mqtt(MqttConfig::default().with_host("192.168.1.100"))
//!     .with_device(DeviceConfig::default().with_address("90:84:2B:00:00:01").with_hub(HubKind::Duplo))
//!     .with_bridge(BridgeConfig::default().with_speed_mode(SpeedMode::Absolute));
//! ```
//!
//! # Environment
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `TRAIN_ADDRESS` | `device.address` | (empty) |
//! | `TRAIN_HUB` | `device.hub` | `city` |
//! | `TRAIN_DISCOVER` | `device.discover` | `true` |
//! | `MQTT_HOST` | `mqtt.host` | `localhost` |
//! | `MQTT_PORT` | `mqtt.port` | `1883` |
//! | `MQTT_CLIENT_ID` | `mqtt.client_id` | `train-bridge` |
//! | `MQTT_TOPIC_PREFIX` | `mqtt.topic_prefix` | `train` |
//! | `MQTT_USERNAME` / `MQTT_PASSWORD` | `mqtt.username` / `mqtt.password` | (empty) |
//! | `TRAIN_HEARTBEAT_MS` | `bridge.heartbeat_ms` | `3000` |
//! | `TRAIN_SPEED_MODE` | `bridge.speed_mode` | `relative` |

use core::fmt;
use core::str::FromStr;

use heapless::String as HString;

use crate::error::ConfigError;
use crate::profile::HubKind;

/// Maximum length for short config strings (hostnames, client IDs)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (full topics)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let _ = hs.push_str(&s[..utf8_prefix(s, MAX_SHORT_STRING)]);
    hs
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    let mut hs = LongString::new();
    let _ = hs.push_str(&s[..utf8_prefix(s, MAX_LONG_STRING)]);
    hs
}

/// Longest prefix of `s` within `max` bytes ending on a char boundary.
fn utf8_prefix(s: &str, max: usize) -> usize {
    s.char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= max)
        .last()
        .unwrap_or(0)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete bridge configuration
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// MQTT client configuration
    pub mqtt: MqttConfig,
    /// Hub selection
    pub device: DeviceConfig,
    /// Controller timing and behaviour
    pub bridge: BridgeConfig,
}

impl Config {
    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Set bridge configuration
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Load from process environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(v) = lookup("TRAIN_ADDRESS") {
            config.device.address = short_string(v.trim());
        }
        if let Some(v) = lookup("TRAIN_HUB") {
            config.device.hub = parse("TRAIN_HUB", &v)?;
        }
        if let Some(v) = lookup("TRAIN_DISCOVER") {
            config.device.discover = parse_flag("TRAIN_DISCOVER", &v)?;
        }

        if let Some(v) = lookup("MQTT_HOST") {
            config.mqtt.host = short_string(v.trim());
        }
        if let Some(v) = lookup("MQTT_PORT") {
            config.mqtt.port = parse("MQTT_PORT", &v)?;
        }
        if let Some(v) = lookup("MQTT_CLIENT_ID") {
            config.mqtt.client_id = short_string(v.trim());
        }
        if let Some(v) = lookup("MQTT_TOPIC_PREFIX") {
            config.mqtt.topic_prefix = short_string(v.trim().trim_end_matches('/'));
        }
        if let Some(v) = lookup("MQTT_USERNAME") {
            config.mqtt.username = short_string(&v);
        }
        if let Some(v) = lookup("MQTT_PASSWORD") {
            config.mqtt.password = short_string(&v);
        }

        if let Some(v) = lookup("TRAIN_HEARTBEAT_MS") {
            let ms: u32 = parse("TRAIN_HEARTBEAT_MS", &v)?;
            if ms == 0 {
                return Err(invalid("TRAIN_HEARTBEAT_MS", &v));
            }
            config.bridge.heartbeat_ms = ms;
        }
        if let Some(v) = lookup("TRAIN_SPEED_MODE") {
            config.bridge.speed_mode = parse("TRAIN_SPEED_MODE", &v)?;
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub host: ShortString,
    /// Broker port
    pub port: u16,
    /// Client ID (should be unique per bridge)
    pub client_id: ShortString,
    /// Topic prefix for all pub/sub (e.g., "train" -> "train/speed")
    pub topic_prefix: ShortString,
    /// Username for authentication (empty = no auth)
    pub username: ShortString,
    /// Password for authentication
    pub password: ShortString,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: short_string("localhost"),
            port: 1883,
            client_id: short_string("train-bridge"),
            topic_prefix: short_string("train"),
            username: ShortString::new(),
            password: ShortString::new(),
            keep_alive_secs: 30,
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the client ID
    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = short_string(id);
        self
    }

    /// Set the topic prefix
    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = short_string(prefix);
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = short_string(username);
        self.password = short_string(password);
        self
    }

    /// Set the keep-alive interval
    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Build a topic string with the configured prefix
    pub fn topic(&self, suffix: &str) -> LongString {
        let mut topic = LongString::new();
        let _ = topic.push_str(self.topic_prefix.as_str());
        let _ = topic.push('/');
        let _ = topic.push_str(suffix);
        topic
    }

    /// Wildcard filter covering every topic under the prefix
    pub fn subscription(&self) -> LongString {
        self.topic("#")
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Which hub to drive and where to find it
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Hardware address, e.g. `90:84:2B:00:00:01`
    pub address: ShortString,
    /// Hub variant, selects the device profile
    pub hub: HubKind,
    /// Find the device under the discovery bound before opening a session.
    /// When off, a device missing from the adapter cache is scanned for
    /// inside the session-open bound instead.
    pub discover: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: ShortString::new(),
            hub: HubKind::default(),
            discover: true,
        }
    }
}

impl DeviceConfig {
    /// Set the hardware address
    pub fn with_address(mut self, address: &str) -> Self {
        self.address = short_string(address);
        self
    }

    /// Set the hub variant
    pub fn with_hub(mut self, hub: HubKind) -> Self {
        self.hub = hub;
        self
    }

    /// Enable or disable discovery before open
    pub fn with_discover(mut self, discover: bool) -> Self {
        self.discover = discover;
        self
    }

    /// Check if a device address is configured
    pub fn is_configured(&self) -> bool {
        !self.address.is_empty()
    }
}

// ============================================================================
// Bridge Config
// ============================================================================

/// How `speed/set` payloads are applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SpeedMode {
    /// The payload is added to the committed speed.
    #[default]
    Relative,
    /// The payload is the new speed.
    Absolute,
}

impl SpeedMode {
    /// Returns the configuration name of the mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SpeedMode::Relative => "relative",
            SpeedMode::Absolute => "absolute",
        }
    }
}

impl fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relative" | "delta" => Ok(SpeedMode::Relative),
            "absolute" => Ok(SpeedMode::Absolute),
            _ => Err(invalid("TRAIN_SPEED_MODE", s)),
        }
    }
}

/// Controller timing and queueing
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BridgeConfig {
    /// Heartbeat period in milliseconds
    pub heartbeat_ms: u32,
    /// Bound on device discovery in milliseconds
    pub discovery_timeout_ms: u32,
    /// Bound on session open in milliseconds
    pub session_timeout_ms: u32,
    /// Capacity of the bus to controller command queue
    pub queue_depth: usize,
    /// How `speed/set` is interpreted
    pub speed_mode: SpeedMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: 3000,
            discovery_timeout_ms: 5000,
            session_timeout_ms: 10_000,
            queue_depth: 32,
            speed_mode: SpeedMode::Relative,
        }
    }
}

impl BridgeConfig {
    /// Set the heartbeat period
    pub fn with_heartbeat_ms(mut self, ms: u32) -> Self {
        self.heartbeat_ms = ms.max(1);
        self
    }

    /// Set the discovery and session-open bounds
    pub fn with_timeouts_ms(mut self, discovery_ms: u32, session_ms: u32) -> Self {
        self.discovery_timeout_ms = discovery_ms;
        self.session_timeout_ms = session_ms;
        self
    }

    /// Set the command queue capacity
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Set how `speed/set` is interpreted
    pub fn with_speed_mode(mut self, mode: SpeedMode) -> Self {
        self.speed_mode = mode;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.device.hub, HubKind::CityHub);
        assert_eq!(config.bridge.heartbeat_ms, 3000);
        assert_eq!(config.bridge.speed_mode, SpeedMode::Relative);
    }

    #[test]
    fn mqtt_topic_building() {
        let mqtt = MqttConfig::default().with_topic_prefix("trains/loco1");
        assert_eq!(mqtt.topic("speed/set").as_str(), "trains/loco1/speed/set");
        assert_eq!(mqtt.subscription().as_str(), "trains/loco1/#");
    }

    #[test]
    fn mqtt_auth_detection() {
        assert!(!MqttConfig::default().has_auth());
        assert!(MqttConfig::default().with_auth("user", "pass").has_auth());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_mqtt(
                MqttConfig::default()
                    .with_host("broker.local")
                    .with_port(8883)
                    .with_keep_alive_secs(10),
            )
            .with_device(
                DeviceConfig::default()
                    .with_address("90:84:2B:00:00:01")
                    .with_hub(HubKind::MoveHub)
                    .with_discover(false),
            )
            .with_bridge(BridgeConfig::default().with_timeouts_ms(1000, 2000));

        assert_eq!(config.mqtt.host.as_str(), "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.keep_alive_secs, 10);
        assert_eq!(config.device.address.as_str(), "90:84:2B:00:00:01");
        assert_eq!(config.device.hub, HubKind::MoveHub);
        assert!(!config.device.discover);
        assert_eq!(config.bridge.discovery_timeout_ms, 1000);
        assert_eq!(config.bridge.session_timeout_ms, 2000);
    }

    #[test]
    fn bridge_config_floors() {
        let bridge = BridgeConfig::default()
            .with_heartbeat_ms(0)
            .with_queue_depth(0);
        assert_eq!(bridge.heartbeat_ms, 1);
        assert_eq!(bridge.queue_depth, 1);
    }

    #[test]
    fn device_config_is_configured() {
        assert!(!DeviceConfig::default().is_configured());
        assert!(DeviceConfig::default().with_address("AA:BB").is_configured());
    }

    // =========================================================================
    // Environment Tests
    // =========================================================================

    #[test]
    fn from_lookup_empty_keeps_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn from_lookup_reads_all_fields() {
        let config = Config::from_lookup(lookup(&[
            ("TRAIN_ADDRESS", " 90:84:2B:00:00:01 "),
            ("TRAIN_HUB", "duplo"),
            ("TRAIN_DISCOVER", "no"),
            ("MQTT_HOST", "10.0.0.2"),
            ("MQTT_PORT", "1884"),
            ("MQTT_CLIENT_ID", "loco7"),
            ("MQTT_TOPIC_PREFIX", "layout/loco7/"),
            ("MQTT_USERNAME", "u"),
            ("MQTT_PASSWORD", "p"),
            ("TRAIN_HEARTBEAT_MS", "1500"),
            ("TRAIN_SPEED_MODE", "Absolute"),
        ]))
        .unwrap();

        assert_eq!(config.device.address.as_str(), "90:84:2B:00:00:01");
        assert_eq!(config.device.hub, HubKind::Duplo);
        assert!(!config.device.discover);
        assert_eq!(config.mqtt.host.as_str(), "10.0.0.2");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.client_id.as_str(), "loco7");
        assert_eq!(config.mqtt.topic("status").as_str(), "layout/loco7/status");
        assert!(config.mqtt.has_auth());
        assert_eq!(config.bridge.heartbeat_ms, 1500);
        assert_eq!(config.bridge.speed_mode, SpeedMode::Absolute);
    }

    #[test]
    fn from_lookup_rejects_bad_port() {
        let err = Config::from_lookup(lookup(&[("MQTT_PORT", "abc")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "MQTT_PORT",
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn from_lookup_rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("TRAIN_HUB", "steam")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TRAIN_DISCOVER", "maybe")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TRAIN_HEARTBEAT_MS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TRAIN_SPEED_MODE", "turbo")])).is_err());
    }

    #[test]
    fn speed_mode_parse_and_display() {
        assert_eq!("relative".parse::<SpeedMode>().unwrap(), SpeedMode::Relative);
        assert_eq!(" ABSOLUTE ".parse::<SpeedMode>().unwrap(), SpeedMode::Absolute);
        assert_eq!(SpeedMode::Absolute.to_string(), "absolute");
    }

    // =========================================================================
    // String Helper Tests
    // =========================================================================

    #[test]
    fn short_string_truncation() {
        let s = short_string(&"a".repeat(100));
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn long_string_truncation() {
        let s = long_string(&"b".repeat(200));
        assert_eq!(s.len(), MAX_LONG_STRING);
    }

    #[test]
    fn string_helpers_utf8_boundary() {
        // 3 bytes each; 64 is not a multiple of 3
        let input = "\u{2603}".repeat(30);
        let s = short_string(&input);
        assert_eq!(s.len(), 63);
        assert!(core::str::from_utf8(s.as_bytes()).is_ok());
    }
}
