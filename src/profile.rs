//! Device profiles for the supported hub variants.
//!
//! A [`DeviceProfile`] is plain data: which port drives the motor, which port
//! carries the light (and whether it needs a mode handshake first), whether a
//! speaker exists, and the color palette cycled by the `color` command.
//! Everything that differs between hub families lives here so the encoder
//! never branches on the hub model itself.
//!
//! # Example
//!
//! ```rust
//! use train_bridge::{DeviceProfile, HubKind};
//!
//! let profile = DeviceProfile::for_kind(HubKind::Duplo);
//! assert!(profile.light.needs_mode_setup);
//! assert!(!profile.sound_emulated());
//!
//! let city = DeviceProfile::for_kind(HubKind::CityHub);
//! assert!(city.sound_emulated());
//! ```

use core::fmt;
use core::str::FromStr;

/// Number of entries in every palette.
pub const PALETTE_LEN: usize = 7;

// ============================================================================
// Hub colors
// ============================================================================

/// Indexed colors understood by the hub light ports (LEGO color table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum HubColor {
    /// Light off.
    Off = 0,
    /// Pink.
    Pink = 1,
    /// Purple.
    Purple = 2,
    /// Blue.
    Blue = 3,
    /// Light blue.
    LightBlue = 4,
    /// Cyan.
    Cyan = 5,
    /// Green.
    Green = 6,
    /// Yellow.
    Yellow = 7,
    /// Orange.
    Orange = 8,
    /// Red.
    Red = 9,
    /// White.
    White = 10,
}

impl HubColor {
    /// Wire code sent in a color-set frame.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Hub kinds
// ============================================================================

/// The closed set of hub variants the bridge knows how to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HubKind {
    /// Duplo train base: dedicated light and speaker ports, light needs a mode handshake.
    Duplo,
    /// Powered Up city hub: combined RGB port, no speaker.
    #[default]
    CityHub,
    /// Boost move hub: motors on the virtual AB port, combined RGB port, no speaker.
    MoveHub,
}

impl HubKind {
    /// Returns the configuration name of the hub kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            HubKind::Duplo => "duplo",
            HubKind::CityHub => "city",
            HubKind::MoveHub => "move",
        }
    }
}

impl fmt::Display for HubKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a hub kind name is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown hub kind: {0}")]
pub struct UnknownHubKind(pub String);

impl FromStr for HubKind {
    type Err = UnknownHubKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duplo" => Ok(HubKind::Duplo),
            "city" | "cityhub" | "city-hub" | "poweredup" => Ok(HubKind::CityHub),
            "move" | "movehub" | "move-hub" | "boost" => Ok(HubKind::MoveHub),
            other => Err(UnknownHubKind(other.to_string())),
        }
    }
}

// ============================================================================
// Profile
// ============================================================================

/// Light port assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LightPort {
    /// Port id.
    pub port: u8,
    /// Sub-mode id used for indexed color.
    pub mode: u8,
    /// Whether a port input format setup must precede color frames.
    pub needs_mode_setup: bool,
}

/// Speaker port assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeakerPort {
    /// Port id.
    pub port: u8,
    /// Sub-mode id for sound playback.
    pub mode: u8,
    /// Sound id played for the horn.
    pub horn_sound: u8,
}

/// Static description of one hub variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceProfile {
    /// The hub variant this profile describes.
    pub kind: HubKind,
    /// Port driving the train motor.
    pub motor_port: u8,
    /// Port carrying the light.
    pub light: LightPort,
    /// Speaker port, if the hub has one.
    pub speaker: Option<SpeakerPort>,
    /// Colors cycled by the `color` command.
    pub palette: [HubColor; PALETTE_LEN],
    /// Color flashed when the horn is emulated with the light.
    pub alert_color: HubColor,
}

impl DeviceProfile {
    /// Duplo train base.
    pub const DUPLO: Self = Self {
        kind: HubKind::Duplo,
        motor_port: 0x00,
        light: LightPort {
            port: 0x11,
            mode: 0x00,
            needs_mode_setup: true,
        },
        speaker: Some(SpeakerPort {
            port: 0x01,
            mode: 0x01,
            horn_sound: 0x09,
        }),
        palette: [
            HubColor::Red,
            HubColor::Orange,
            HubColor::Yellow,
            HubColor::Green,
            HubColor::Cyan,
            HubColor::Blue,
            HubColor::Purple,
        ],
        alert_color: HubColor::Red,
    };

    /// Powered Up city hub.
    pub const CITY_HUB: Self = Self {
        kind: HubKind::CityHub,
        motor_port: 0x00,
        light: LightPort {
            port: 0x32,
            mode: 0x00,
            needs_mode_setup: false,
        },
        speaker: None,
        palette: [
            HubColor::Blue,
            HubColor::Cyan,
            HubColor::Green,
            HubColor::Yellow,
            HubColor::Orange,
            HubColor::Red,
            HubColor::White,
        ],
        alert_color: HubColor::Red,
    };

    /// Boost move hub.
    pub const MOVE_HUB: Self = Self {
        kind: HubKind::MoveHub,
        motor_port: 0x10,
        light: LightPort {
            port: 0x32,
            mode: 0x00,
            needs_mode_setup: false,
        },
        speaker: None,
        palette: [
            HubColor::White,
            HubColor::Blue,
            HubColor::LightBlue,
            HubColor::Green,
            HubColor::Yellow,
            HubColor::Pink,
            HubColor::Purple,
        ],
        alert_color: HubColor::Red,
    };

    /// Returns the profile for a hub kind.
    pub const fn for_kind(kind: HubKind) -> Self {
        match kind {
            HubKind::Duplo => Self::DUPLO,
            HubKind::CityHub => Self::CITY_HUB,
            HubKind::MoveHub => Self::MOVE_HUB,
        }
    }

    /// True when the hub has no speaker and the horn is played with the light.
    #[inline]
    pub const fn sound_emulated(&self) -> bool {
        self.speaker.is_none()
    }

    /// Palette entry for an index.
    #[inline]
    pub fn color_at(&self, index: ColorIndex) -> HubColor {
        self.palette[index.get() % PALETTE_LEN]
    }
}

// ============================================================================
// Speed and color index
// ============================================================================

/// Lower bound of motor power.
pub const SPEED_MIN: i32 = -100;
/// Upper bound of motor power.
pub const SPEED_MAX: i32 = 100;

/// Motor power in `[-100, 100]`; the sign is the direction.
///
/// A `Speed` can only be built clamped, so every value reaching the encoder
/// is in range.
///
/// ```rust
/// use train_bridge::Speed;
///
/// assert_eq!(Speed::clamped(140).get(), 100);
/// assert_eq!(Speed::clamped(-7).get(), -7);
/// assert_eq!(Speed::clamped(-1).wire_byte(), 255);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Speed(i8);

impl Speed {
    /// Stopped.
    pub const STOP: Self = Self(0);

    /// Builds a speed, clamping to `[-100, 100]`.
    pub fn clamped(value: i32) -> Self {
        // The clamp keeps the value well inside i8.
        Self(value.clamp(SPEED_MIN, SPEED_MAX) as i8)
    }

    /// Signed value.
    #[inline]
    pub const fn get(self) -> i32 {
        self.0 as i32
    }

    /// Two's-complement byte: `256 + speed` for negative speeds.
    #[inline]
    pub const fn wire_byte(self) -> u8 {
        self.0 as u8
    }

    /// Returns `self + delta`, clamped.
    pub fn offset(self, delta: i32) -> Self {
        Self::clamped(self.get().saturating_add(delta))
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in the palette. Always `< PALETTE_LEN`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColorIndex(usize);

impl ColorIndex {
    /// Builds an index, wrapping into the palette.
    pub const fn new(index: usize) -> Self {
        Self(index % PALETTE_LEN)
    }

    /// The index value.
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }

    /// The following palette slot, wrapping at the end.
    pub const fn next(self) -> Self {
        Self::new(self.0 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_kind_matches_constants() {
        assert_eq!(DeviceProfile::for_kind(HubKind::Duplo), DeviceProfile::DUPLO);
        assert_eq!(DeviceProfile::for_kind(HubKind::CityHub), DeviceProfile::CITY_HUB);
        assert_eq!(DeviceProfile::for_kind(HubKind::MoveHub), DeviceProfile::MOVE_HUB);
    }

    #[test]
    fn test_only_duplo_has_speaker_and_handshake() {
        assert!(!DeviceProfile::DUPLO.sound_emulated());
        assert!(DeviceProfile::DUPLO.light.needs_mode_setup);

        for profile in [DeviceProfile::CITY_HUB, DeviceProfile::MOVE_HUB] {
            assert!(profile.sound_emulated());
            assert!(!profile.light.needs_mode_setup);
        }
    }

    #[test]
    fn test_palettes_never_contain_off() {
        for kind in [HubKind::Duplo, HubKind::CityHub, HubKind::MoveHub] {
            let profile = DeviceProfile::for_kind(kind);
            assert!(!profile.palette.contains(&HubColor::Off), "{kind}");
        }
    }

    #[test]
    fn test_hub_kind_from_str() {
        assert_eq!("duplo".parse::<HubKind>(), Ok(HubKind::Duplo));
        assert_eq!(" City ".parse::<HubKind>(), Ok(HubKind::CityHub));
        assert_eq!("boost".parse::<HubKind>(), Ok(HubKind::MoveHub));
        assert_eq!(
            "technic".parse::<HubKind>(),
            Err(UnknownHubKind("technic".to_string()))
        );
    }

    #[test]
    fn test_hub_kind_display_round_trips() {
        for kind in [HubKind::Duplo, HubKind::CityHub, HubKind::MoveHub] {
            assert_eq!(kind.to_string().parse::<HubKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_speed_clamps() {
        assert_eq!(Speed::clamped(0).get(), 0);
        assert_eq!(Speed::clamped(100).get(), 100);
        assert_eq!(Speed::clamped(101).get(), 100);
        assert_eq!(Speed::clamped(-100).get(), -100);
        assert_eq!(Speed::clamped(i32::MIN).get(), -100);
        assert_eq!(Speed::clamped(i32::MAX).get(), 100);
    }

    #[test]
    fn test_speed_offset_saturates() {
        assert_eq!(Speed::clamped(90).offset(50).get(), 100);
        assert_eq!(Speed::clamped(-90).offset(-50).get(), -100);
        assert_eq!(Speed::clamped(30).offset(20).get(), 50);
        assert_eq!(Speed::clamped(100).offset(i32::MAX).get(), 100);
    }

    #[test]
    fn test_speed_wire_byte_twos_complement() {
        assert_eq!(Speed::clamped(0).wire_byte(), 0);
        assert_eq!(Speed::clamped(50).wire_byte(), 50);
        assert_eq!(Speed::clamped(-1).wire_byte(), 255);
        assert_eq!(Speed::clamped(-50).wire_byte(), 206);
        assert_eq!(Speed::clamped(-100).wire_byte(), 156);
    }

    #[test]
    fn test_color_index_wraps() {
        let mut index = ColorIndex::default();
        for _ in 0..PALETTE_LEN {
            index = index.next();
        }
        assert_eq!(index, ColorIndex::default());
        assert_eq!(ColorIndex::new(PALETTE_LEN + 2).get(), 2);
    }

    #[test]
    fn test_color_at() {
        let profile = DeviceProfile::CITY_HUB;
        assert_eq!(profile.color_at(ColorIndex::new(0)), HubColor::Blue);
        assert_eq!(profile.color_at(ColorIndex::new(6)), HubColor::White);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_profile_types_are_serde() {
        fn assert_serde<T: serde::Serialize + serde::de::DeserializeOwned>() {}

        assert_serde::<DeviceProfile>();
        assert_serde::<LightPort>();
        assert_serde::<SpeakerPort>();
        assert_serde::<HubKind>();
        assert_serde::<HubColor>();
    }
}
