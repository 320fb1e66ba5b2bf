//! Transport implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: test doubles for the wireless transport and the bus
//! - `ble`: Bluetooth LE transport over `btleplug` (requires `ble` feature)

pub mod mock;

#[cfg(feature = "ble")]
pub mod ble;

pub use mock::*;

#[cfg(feature = "ble")]
pub use ble::*;
