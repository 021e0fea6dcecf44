// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Shared synchronous bus access.

pub mod arbiter;

pub use arbiter::{
    BusError, Completion, DeviceId, SharedArbiter, SpiArbiter, SpiPort, Transfer,
    TransferListener, MAX_FRAMES,
};
