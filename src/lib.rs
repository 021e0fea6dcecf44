// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # DualDrive Firmware
//!
//! Real-time core of a dual-axis three-phase motor controller, targeting an STM32F777 MCU. Two
//! center-aligned PWM timers drive the bridges, three ADCs sample the phase shunts and a low
//! priority software interrupt runs the control loop once per modulation period.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`timing`] | Timestamp clock, timer start-up synchronization, task timing |
//! | [`sampling`] | ADC sample collection, phase current and bus voltage conversion |
//! | [`control`] | Sampling tick and control tick interrupt handlers |
//! | [`axis`] | Per-axis arming state and fault latching |
//! | [`bus`] | Shared SPI bus arbiter |
//! | [`drivers`] | Device-level drivers (DRV8301, AS5047) |
//! | [`motors`] | Per-axis consumers of the current samples |
//! | [`hw`] | MCU-level wrappers around timers, ADCs, SPI and USART |
//!
//! Everything except [`hw`] is target independent and tested on the host:
//!
//! ```bash
//! cargo test
//! ```
//!
//! Flash the board:
//!
//! ```bash
//! cargo run --release --features board --target thumbv7em-none-eabihf
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

pub mod axis;
pub mod bus;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod motors;
pub mod sampling;
pub mod timing;

#[cfg(target_os = "none")]
pub mod hw;

#[cfg(test)]
mod testing;
