// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! STM32F777 bindings for the portable traits of the sampling chain.

pub mod adc;
pub mod pins;
pub mod spi;
pub mod timer;
pub mod usart;

pub use adc::HwAdc;
pub use pins::{BoardPins, NFault};
pub use spi::{ChipSelect, Spi3Port};
pub use timer::{AuxTimer, DwtCounter, MotorTimer, SoftIrq};
pub use usart::{Usart, UsartLogger};
