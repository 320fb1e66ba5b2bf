//! Error types for the bridge.
//!
//! Transport failures never escape as panics: the [`ConnectionManager`](crate::ConnectionManager)
//! maps them to [`ConnectError`] or [`SendError`] after settling the link state.

use std::time::Duration;

use thiserror::Error;

/// A connect attempt failed. The link is `Disconnected` afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Device was not found within the discovery bound.
    #[error("device not discovered within {0:?}")]
    DiscoveryTimeout(Duration),

    /// Session did not open within the session bound.
    #[error("session not opened within {0:?}")]
    SessionTimeout(Duration),

    /// The link dropped while the session was being opened.
    #[error("session lost while connecting")]
    SessionLost,

    /// Discovery or session open reported an error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A frame could not be written.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SendError {
    /// No session is open; nothing was written.
    #[error("not connected")]
    NotConnected,

    /// The write failed; the link is now `Disconnected`.
    #[error("transport error: {0}")]
    Transport(String),
}

/// An inbound bus message could not be understood.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PayloadParseError {
    /// Payload is not valid UTF-8.
    #[error("payload is not utf-8")]
    NotUtf8,

    /// Speed payload is not a finite number.
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    /// Command payload is not a known command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
}

/// A bridge command failed. Logged by the session task, never fatal.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Bringing the link up failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Writing a frame failed.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// A command could not be queued for the session task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The queue is at capacity; the command was dropped.
    #[error("command queue full")]
    QueueFull,

    /// The session task has stopped.
    #[error("bridge stopped")]
    Closed,
}

/// Configuration could not be loaded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}
