// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Actuator Abstractions
//!
//! Motor-level consumers that sit above the sampling chain in `control`.
//!
//! ## Modules
//!
//! - [`phase_motor`] - Three-phase axis fed by the control tick.

pub mod phase_motor;

pub use phase_motor::PhaseMotor;
