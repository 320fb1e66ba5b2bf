//! LEGO Wireless Protocol 3 framing.
//!
//! Only the two downstream messages the bridge needs are built here:
//!
//! | Message | Type | Layout |
//! |---------|------|--------|
//! | Port output, direct mode data | `0x81` | `len, hub, 0x81, port, startup, 0x51, mode, value` |
//! | Port input format setup | `0x41` | `len, hub, 0x41, port, mode, delta (u32 LE), notify` |
//!
//! All frames are written to a single characteristic, [`LWP3_CHARACTERISTIC_UUID`].

use core::fmt;
use core::ops::Deref;

/// Hub GATT service.
pub const LWP3_SERVICE_UUID: &str = "00001623-1212-efde-1623-785feabcd123";

/// Write characteristic carrying every command frame.
pub const LWP3_CHARACTERISTIC_UUID: &str = "00001624-1212-efde-1623-785feabcd123";

/// Largest frame the bridge ever produces.
pub const MAX_FRAME_LEN: usize = 16;

/// Hub id byte (always 0 for a directly connected hub).
pub const HUB_ID: u8 = 0x00;

/// Message type: port input format setup (single).
pub const MSG_PORT_INPUT_FORMAT_SETUP: u8 = 0x41;

/// Message type: port output command.
pub const MSG_PORT_OUTPUT_COMMAND: u8 = 0x81;

/// Port output sub-command: write direct mode data.
pub const SUBCMD_WRITE_DIRECT_MODE_DATA: u8 = 0x51;

/// Startup byte used for motor power.
pub const STARTUP_MOTOR: u8 = 0x01;

/// Startup byte used for light and sound: execute immediately, request feedback.
pub const STARTUP_IMMEDIATE_FEEDBACK: u8 = 0x11;

/// Mode id for raw motor power.
pub const MODE_MOTOR_POWER: u8 = 0x00;

/// An immutable byte sequence written to the hub characteristic.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl CommandFrame {
    /// Builds a frame from a fixed-size array.
    pub const fn from_array<const N: usize>(src: [u8; N]) -> Self {
        const { assert!(N <= MAX_FRAME_LEN) };
        let mut bytes = [0u8; MAX_FRAME_LEN];
        let mut i = 0;
        while i < N {
            bytes[i] = src[i];
            i += 1;
        }
        Self { bytes, len: N }
    }

    /// The frame bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Message type byte.
    #[inline]
    pub fn message_type(&self) -> u8 {
        self.bytes[2]
    }
}

impl Deref for CommandFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame(")?;
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}

/// Port output command writing one byte of direct mode data.
pub const fn port_output_direct(port: u8, startup: u8, mode: u8, value: u8) -> CommandFrame {
    CommandFrame::from_array([
        0x08,
        HUB_ID,
        MSG_PORT_OUTPUT_COMMAND,
        port,
        startup,
        SUBCMD_WRITE_DIRECT_MODE_DATA,
        mode,
        value,
    ])
}

/// Port input format setup selecting `mode` on `port`, delta 1, notifications off.
pub const fn port_input_format_setup(port: u8, mode: u8) -> CommandFrame {
    CommandFrame::from_array([
        0x0A,
        HUB_ID,
        MSG_PORT_INPUT_FORMAT_SETUP,
        port,
        mode,
        0x01,
        0x00,
        0x00,
        0x00,
        0x00,
    ])
}
