//! Inbound bus messages and the commands they map to.
//!
//! # Topics
//!
//! All topics are relative to the configured prefix (`train` by default).
//!
//! | Topic | Payload | Command |
//! |-------|---------|---------|
//! | `speed/set` | numeric string | [`AdjustSpeed`](BridgeCommand::AdjustSpeed) (or [`SetSpeed`](BridgeCommand::SetSpeed) in absolute mode) |
//! | `command` | `stop` | `SetSpeed(0)` |
//! | `command` | `forward` | `SetSpeed(50)` |
//! | `command` | `backward` | `SetSpeed(-50)` |
//! | `command` | `connect` | [`Connect`](BridgeCommand::Connect) |
//! | `command` | `color` | [`NextColor`](BridgeCommand::NextColor) |
//! | `command` | `horn` | [`Horn`](BridgeCommand::Horn) |
//!
//! Any other topic under the prefix (including the bridge's own `status` and
//! `speed` publications) maps to no command.
//!
//! # Example
//!
//! ```rust
//! use train_bridge::commands::BridgeCommand;
//! use train_bridge::config::SpeedMode;
//! use train_bridge::traits::MqttMessage;
//!
//! let msg = MqttMessage::new("train/speed/set", "20.9");
//! let cmd = BridgeCommand::from_message(&msg, "train", SpeedMode::Relative).unwrap();
//! assert_eq!(cmd, Some(BridgeCommand::AdjustSpeed(20)));
//!
//! let msg = MqttMessage::new("train/command", " Horn\n");
//! let cmd = BridgeCommand::from_message(&msg, "train", SpeedMode::Relative).unwrap();
//! assert_eq!(cmd, Some(BridgeCommand::Horn));
//! ```

use crate::config::SpeedMode;
use crate::error::PayloadParseError;
use crate::profile::Speed;
use crate::traits::MqttMessage;

/// Inbound: speed change.
pub const TOPIC_SPEED_SET: &str = "speed/set";

/// Inbound: named command.
pub const TOPIC_COMMAND: &str = "command";

/// Outbound: connectivity, retained.
pub const TOPIC_STATUS: &str = "status";

/// Outbound: committed speed.
pub const TOPIC_SPEED: &str = "speed";

/// Status payload while the hub link is up.
pub const STATUS_ONLINE: &str = "online";

/// Status payload while the hub link is down.
pub const STATUS_OFFLINE: &str = "offline";

/// Speed applied by `forward`.
pub const FORWARD_SPEED: i32 = 50;

/// Speed applied by `backward`.
pub const BACKWARD_SPEED: i32 = -50;

/// Work item executed by the session task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Add a delta to the committed speed.
    AdjustSpeed(i32),
    /// Set the speed outright.
    SetSpeed(Speed),
    /// Bring the hub link up if it is down.
    Connect,
    /// Advance to the next palette color.
    NextColor,
    /// Play the horn (or flash it).
    Horn,
}

impl BridgeCommand {
    /// `SetSpeed(0)`.
    pub const fn stop() -> Self {
        BridgeCommand::SetSpeed(Speed::STOP)
    }

    /// Map a bus message to a command.
    ///
    /// Returns `Ok(None)` for topics that carry no command and an error for a
    /// command topic with an unusable payload.
    pub fn from_message(
        msg: &MqttMessage,
        prefix: &str,
        mode: SpeedMode,
    ) -> Result<Option<Self>, PayloadParseError> {
        let Some(suffix) = msg
            .topic
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Ok(None);
        };

        match suffix {
            TOPIC_SPEED_SET => Self::parse_speed_set(&msg.payload, mode).map(Some),
            TOPIC_COMMAND => Self::parse_command(&msg.payload).map(Some),
            _ => Ok(None),
        }
    }

    /// Parse a `speed/set` payload.
    ///
    /// The payload is a real number, truncated toward zero.
    pub fn parse_speed_set(payload: &[u8], mode: SpeedMode) -> Result<Self, PayloadParseError> {
        let value = parse_speed_value(payload)?;
        Ok(match mode {
            SpeedMode::Relative => BridgeCommand::AdjustSpeed(value),
            SpeedMode::Absolute => BridgeCommand::SetSpeed(Speed::clamped(value)),
        })
    }

    /// Parse a `command` payload. Case-insensitive, surrounding whitespace ignored.
    pub fn parse_command(payload: &[u8]) -> Result<Self, PayloadParseError> {
        let text = core::str::from_utf8(payload).map_err(|_| PayloadParseError::NotUtf8)?;
        let word = text.trim().to_ascii_lowercase();
        match word.as_str() {
            "stop" => Ok(Self::stop()),
            "forward" => Ok(BridgeCommand::SetSpeed(Speed::clamped(FORWARD_SPEED))),
            "backward" => Ok(BridgeCommand::SetSpeed(Speed::clamped(BACKWARD_SPEED))),
            "connect" => Ok(BridgeCommand::Connect),
            "color" => Ok(BridgeCommand::NextColor),
            "horn" => Ok(BridgeCommand::Horn),
            _ => Err(PayloadParseError::UnknownCommand(word)),
        }
    }

    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            BridgeCommand::AdjustSpeed(_) => "adjust_speed",
            BridgeCommand::SetSpeed(_) => "set_speed",
            BridgeCommand::Connect => "connect",
            BridgeCommand::NextColor => "color",
            BridgeCommand::Horn => "horn",
        }
    }
}

fn parse_speed_value(payload: &[u8]) -> Result<i32, PayloadParseError> {
    let text = core::str::from_utf8(payload).map_err(|_| PayloadParseError::NotUtf8)?;
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        // `as` saturates, and the result is clamped downstream anyway
        Ok(v) if v.is_finite() => Ok(v.trunc() as i32),
        _ => Err(PayloadParseError::InvalidNumber(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(topic: &str, payload: &[u8]) -> Result<Option<BridgeCommand>, PayloadParseError> {
        BridgeCommand::from_message(&MqttMessage::new(topic, payload), "train", SpeedMode::Relative)
    }

    // ========================================================================
    // speed/set
    // ========================================================================

    #[test]
    fn test_speed_set_integer() {
        assert_eq!(parse("train/speed/set", b"20"), Ok(Some(BridgeCommand::AdjustSpeed(20))));
        assert_eq!(parse("train/speed/set", b"-35"), Ok(Some(BridgeCommand::AdjustSpeed(-35))));
    }

    #[test]
    fn test_speed_set_truncates_toward_zero() {
        assert_eq!(parse("train/speed/set", b"12.9"), Ok(Some(BridgeCommand::AdjustSpeed(12))));
        assert_eq!(parse("train/speed/set", b"-12.9"), Ok(Some(BridgeCommand::AdjustSpeed(-12))));
        assert_eq!(parse("train/speed/set", b" 0.4 "), Ok(Some(BridgeCommand::AdjustSpeed(0))));
    }

    #[test]
    fn test_speed_set_huge_value_saturates() {
        assert_eq!(
            parse("train/speed/set", b"1e12"),
            Ok(Some(BridgeCommand::AdjustSpeed(i32::MAX)))
        );
    }

    #[test]
    fn test_speed_set_rejects_garbage() {
        assert_eq!(
            parse("train/speed/set", b"fast"),
            Err(PayloadParseError::InvalidNumber("fast".to_string()))
        );
        assert!(matches!(
            parse("train/speed/set", b"nan"),
            Err(PayloadParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse("train/speed/set", b"inf"),
            Err(PayloadParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse("train/speed/set", b""),
            Err(PayloadParseError::InvalidNumber(_))
        ));
        assert_eq!(
            parse("train/speed/set", &[0xFF, 0x00]),
            Err(PayloadParseError::NotUtf8)
        );
    }

    #[test]
    fn test_speed_set_absolute_mode() {
        let cmd = BridgeCommand::parse_speed_set(b"140", SpeedMode::Absolute);
        assert_eq!(cmd, Ok(BridgeCommand::SetSpeed(Speed::clamped(100))));
    }

    // ========================================================================
    // command
    // ========================================================================

    #[test]
    fn test_named_commands() {
        assert_eq!(parse("train/command", b"stop"), Ok(Some(BridgeCommand::stop())));
        assert_eq!(
            parse("train/command", b"forward"),
            Ok(Some(BridgeCommand::SetSpeed(Speed::clamped(50))))
        );
        assert_eq!(
            parse("train/command", b"backward"),
            Ok(Some(BridgeCommand::SetSpeed(Speed::clamped(-50))))
        );
        assert_eq!(parse("train/command", b"connect"), Ok(Some(BridgeCommand::Connect)));
        assert_eq!(parse("train/command", b"color"), Ok(Some(BridgeCommand::NextColor)));
        assert_eq!(parse("train/command", b"horn"), Ok(Some(BridgeCommand::Horn)));
    }

    #[test]
    fn test_command_normalized() {
        assert_eq!(parse("train/command", b"  STOP\r\n"), Ok(Some(BridgeCommand::stop())));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse("train/command", b"Whistle"),
            Err(PayloadParseError::UnknownCommand("whistle".to_string()))
        );
    }

    // ========================================================================
    // Topics
    // ========================================================================

    #[test]
    fn test_own_publications_ignored() {
        assert_eq!(parse("train/status", b"online"), Ok(None));
        assert_eq!(parse("train/speed", b"50"), Ok(None));
    }

    #[test]
    fn test_foreign_topics_ignored() {
        assert_eq!(parse("other/command", b"stop"), Ok(None));
        assert_eq!(parse("trains/command", b"stop"), Ok(None));
        assert_eq!(parse("train", b"stop"), Ok(None));
    }

    #[test]
    fn test_custom_prefix() {
        let msg = MqttMessage::new("layout/loco7/command", "horn");
        let cmd = BridgeCommand::from_message(&msg, "layout/loco7", SpeedMode::Relative);
        assert_eq!(cmd, Ok(Some(BridgeCommand::Horn)));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(BridgeCommand::Horn.name(), "horn");
        assert_eq!(BridgeCommand::AdjustSpeed(1).name(), "adjust_speed");
    }
}
