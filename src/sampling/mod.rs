// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Converter sampling and phase current reconstruction.

pub mod adc;
pub mod current;

pub use adc::{AdcBank, AdcFlags, Converter, Fetch, FetchError, WaitTimeout};
pub use current::{idle_override, reconstruct, CurrentSense, PhaseCurrents, VbusSense};
