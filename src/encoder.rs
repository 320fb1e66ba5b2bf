//! Intent to frame encoding.
//!
//! The functions here are pure: given a [`DeviceProfile`] and an intent they
//! return the frames to write, plus the pause to observe after each one.
//! Pauses are data, not sleeps; the [`BridgeController`](crate::BridgeController)
//! executes a [`FramePlan`] step by step on the session task.
//!
//! ```rust
//! use train_bridge::encoder::{encode_color, encode_sound, encode_speed, SoundPlan};
//! use train_bridge::{ColorIndex, DeviceProfile, Speed};
//!
//! let profile = DeviceProfile::CITY_HUB;
//! let frame = encode_speed(&profile, Speed::clamped(-1));
//! assert_eq!(frame[7], 255);
//!
//! assert_eq!(encode_color(&profile, ColorIndex::new(3)).len(), 1);
//! assert!(matches!(encode_sound(&profile, ColorIndex::new(0)), SoundPlan::Emulated(_)));
//! ```

use std::time::Duration;

use crate::profile::{ColorIndex, DeviceProfile, HubColor, Speed};
use crate::protocol::{
    port_input_format_setup, port_output_direct, CommandFrame, MODE_MOTOR_POWER, STARTUP_MOTOR,
    STARTUP_IMMEDIATE_FEEDBACK,
};

/// Pause after a mode handshake before the port accepts data.
pub const MODE_SETTLE: Duration = Duration::from_millis(100);

/// How long each on/off step of an emulated horn is held.
pub const FLASH_HOLD: Duration = Duration::from_millis(200);

/// Number of flashes in an emulated horn.
pub const FLASH_REPEATS: usize = 3;

/// One frame and the pause to observe after writing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedFrame {
    /// Frame to write.
    pub frame: CommandFrame,
    /// Delay before the next frame may be written.
    pub pause_after: Duration,
}

impl PlannedFrame {
    /// A frame with no trailing pause.
    pub const fn immediate(frame: CommandFrame) -> Self {
        Self {
            frame,
            pause_after: Duration::ZERO,
        }
    }

    /// A frame followed by `pause`.
    pub const fn then_wait(frame: CommandFrame, pause: Duration) -> Self {
        Self {
            frame,
            pause_after: pause,
        }
    }
}

/// Ordered frames, executed in order and aborted on the first failed write.
pub type FramePlan = Vec<PlannedFrame>;

/// How a horn request is carried out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SoundPlan {
    /// Mode setup then a play-sound frame on the speaker port.
    Speaker(FramePlan),
    /// Timed light flashes ending with the active color restored.
    Emulated(FramePlan),
}

impl SoundPlan {
    /// The frames to execute.
    pub fn frames(&self) -> &[PlannedFrame] {
        match self {
            SoundPlan::Speaker(plan) | SoundPlan::Emulated(plan) => plan,
        }
    }

    /// Consumes the plan, returning its frames.
    pub fn into_frames(self) -> FramePlan {
        match self {
            SoundPlan::Speaker(plan) | SoundPlan::Emulated(plan) => plan,
        }
    }
}

/// Motor power frame for `speed` on the profile's motor port.
pub fn encode_speed(profile: &DeviceProfile, speed: Speed) -> CommandFrame {
    port_output_direct(
        profile.motor_port,
        STARTUP_MOTOR,
        MODE_MOTOR_POWER,
        speed.wire_byte(),
    )
}

/// Frames selecting the palette entry at `index` on the light port.
///
/// Profiles whose light port needs a handshake get a mode setup frame first,
/// followed by [`MODE_SETTLE`].
pub fn encode_color(profile: &DeviceProfile, index: ColorIndex) -> FramePlan {
    let light = profile.light;
    let mut plan = Vec::with_capacity(2);
    if light.needs_mode_setup {
        plan.push(PlannedFrame::then_wait(
            port_input_format_setup(light.port, light.mode),
            MODE_SETTLE,
        ));
    }
    plan.push(PlannedFrame::immediate(color_set(
        profile,
        profile.color_at(index),
    )));
    plan
}

/// Frames playing the horn.
///
/// With a speaker this is a mode setup and a play-sound frame. Without one,
/// the light flashes the alert color [`FLASH_REPEATS`] times and then returns
/// to the color at `active`.
pub fn encode_sound(profile: &DeviceProfile, active: ColorIndex) -> SoundPlan {
    match profile.speaker {
        Some(speaker) => SoundPlan::Speaker(vec![
            PlannedFrame::then_wait(
                port_input_format_setup(speaker.port, speaker.mode),
                MODE_SETTLE,
            ),
            PlannedFrame::immediate(port_output_direct(
                speaker.port,
                STARTUP_IMMEDIATE_FEEDBACK,
                speaker.mode,
                speaker.horn_sound,
            )),
        ]),
        None => {
            let alert = color_set(profile, profile.alert_color);
            let off = color_set(profile, HubColor::Off);
            let mut plan = Vec::with_capacity(FLASH_REPEATS * 2 + 1);
            for _ in 0..FLASH_REPEATS {
                plan.push(PlannedFrame::then_wait(alert, FLASH_HOLD));
                plan.push(PlannedFrame::then_wait(off, FLASH_HOLD));
            }
            plan.push(PlannedFrame::immediate(color_set(
                profile,
                profile.color_at(active),
            )));
            SoundPlan::Emulated(plan)
        }
    }
}

fn color_set(profile: &DeviceProfile, color: HubColor) -> CommandFrame {
    port_output_direct(
        profile.light.port,
        STARTUP_IMMEDIATE_FEEDBACK,
        profile.light.mode,
        color.code(),
    )
}
