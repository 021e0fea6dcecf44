// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Timer synchronization, cycle timestamp and task-time instrumentation.

pub mod clock;
pub mod sync;
pub mod task_timer;

pub use clock::{CountDirection, CycleClock};
pub use sync::{SyncError, SyncTimer, TimerSynchronizer, UpdateSource};
pub use task_timer::{CycleCounter, TaskTimer, TaskTimes};
