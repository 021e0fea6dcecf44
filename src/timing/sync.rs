// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Phase-locked start of several hardware counters.
//!
//! The counters must already be configured (prescaler, period, centre-aligned mode). The
//! synchronizer halts them, loads the requested initial counts and restarts them back-to-back.
//! Re-synchronizing a running set is refused: the control tick relies on the offsets staying fixed
//! for the whole session.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

/// A counter that can be started with a given phase.
pub trait SyncTimer {
    /// Stop counting.
    fn halt(&self);

    /// Load the counter register.
    fn set_count(&self, count: u32);

    /// Auto-reload value.
    fn period(&self) -> u32;

    /// Start counting.
    fn resume(&self);
}

/// Update-event side of a counter, used by the sampling tick.
pub trait UpdateSource {
    /// Acknowledge the pending update event.
    fn clear_update(&self);

    /// Enable the update interrupt.
    fn listen_update(&self);

    /// Whether the counter is currently counting down.
    fn counting_down(&self) -> bool;
}

impl<T: UpdateSource + ?Sized> UpdateSource for &T {
    fn clear_update(&self) {
        (**self).clear_update()
    }
    fn listen_update(&self) {
        (**self).listen_update()
    }
    fn counting_down(&self) -> bool {
        (**self).counting_down()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncError {
    /// The initial count of timer `index` exceeds its period.
    OffsetOutOfRange { index: usize, count: u32, period: u32 },
    /// The timers were already started.
    AlreadyRunning,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::OffsetOutOfRange {
                index,
                count,
                period,
            } => write!(f, "timer {} count {} exceeds period {}", index, count, period),
            SyncError::AlreadyRunning => f.write_str("timers already synchronized"),
        }
    }
}

pub struct TimerSynchronizer {
    started: AtomicBool,
}

impl TimerSynchronizer {
    pub const fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Start `timers[i]` at `counts[i]`.
    ///
    /// Must be called inside a critical section so no interrupt stretches the gap between the
    /// individual starts.
    pub fn start_synchronously<const N: usize>(
        &self,
        timers: [&dyn SyncTimer; N],
        counts: [u32; N],
    ) -> Result<(), SyncError> {
        if self.started.load(Ordering::Acquire) {
            log::error!("timer resync refused while running");
            return Err(SyncError::AlreadyRunning);
        }

        for (index, (timer, &count)) in timers.iter().zip(counts.iter()).enumerate() {
            let period = timer.period();
            if count > period {
                return Err(SyncError::OffsetOutOfRange {
                    index,
                    count,
                    period,
                });
            }
        }

        for timer in timers.iter() {
            timer.halt();
        }
        for (timer, &count) in timers.iter().zip(counts.iter()) {
            timer.set_count(count);
        }
        for timer in timers.iter() {
            timer.resume();
        }

        self.started.store(true, Ordering::Release);
        Ok(())
    }
}

impl Default for TimerSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
