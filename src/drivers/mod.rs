// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Device-Specific Drivers
//!
//! Drivers for the devices on the shared SPI bus. They sit above [`crate::bus`] and report their
//! results through lock-free state, since their completion handlers run in the bus interrupt.
//!
//! ## Existing drivers
//!
//! - [`drv8301`] – TI DRV8301 three-phase gate driver with shunt amplifiers
//! - [`as5047`] – ams AS5047 14-bit absolute magnetic encoder

pub mod as5047;
pub mod drv8301;

pub use as5047::As5047;
pub use drv8301::{Drv8301, FaultLine};
