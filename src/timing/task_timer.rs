// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Execution-time instrumentation for interrupt work, in CPU cycles.

use core::sync::atomic::{AtomicU32, Ordering};

/// Free-running cycle counter (DWT CYCCNT on the target).
pub trait CycleCounter {
    fn now(&self) -> u32;
}

impl<T: CycleCounter + ?Sized> CycleCounter for &T {
    fn now(&self) -> u32 {
        (**self).now()
    }
}

/// Last and worst-case duration of one task.
pub struct TaskTimer {
    last: AtomicU32,
    max: AtomicU32,
}

impl TaskTimer {
    pub const fn new() -> Self {
        Self {
            last: AtomicU32::new(0),
            max: AtomicU32::new(0),
        }
    }

    /// Run `f` and record how long it took.
    #[inline]
    pub fn measure<C: CycleCounter, R>(&self, counter: &C, f: impl FnOnce() -> R) -> R {
        let start = counter.now();
        let out = f();
        self.record(counter.now().wrapping_sub(start));
        out
    }

    pub fn record(&self, cycles: u32) {
        self.last.store(cycles, Ordering::Relaxed);
        self.max.fetch_max(cycles, Ordering::Relaxed);
    }

    #[inline]
    pub fn last(&self) -> u32 {
        self.last.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn max(&self) -> u32 {
        self.max.load(Ordering::Relaxed)
    }

    /// Start a new observation window.
    pub fn reset(&self) {
        self.last.store(0, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

impl Default for TaskTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Timers for the per-cycle tasks.
pub struct TaskTimes {
    pub sampling: TaskTimer,
    pub control_loop: TaskTimer,
    pub dc_calib_wait: TaskTimer,
}

impl TaskTimes {
    pub const fn new() -> Self {
        Self {
            sampling: TaskTimer::new(),
            control_loop: TaskTimer::new(),
            dc_calib_wait: TaskTimer::new(),
        }
    }
}

impl Default for TaskTimes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCycles;

    #[test]
    fn keeps_last_and_max() {
        let cycles = FakeCycles::stepping(0, 0);
        let timer = TaskTimer::new();

        cycles.set_step(120);
        timer.measure(&cycles, || ());
        cycles.set_step(40);
        let v = timer.measure(&cycles, || 7);

        assert_eq!(v, 7);
        assert_eq!(timer.last(), 40);
        assert_eq!(timer.max(), 120);
    }

    #[test]
    fn reset_starts_a_new_window() {
        let cycles = FakeCycles::stepping(0, 500);
        let timer = TaskTimer::new();
        timer.measure(&cycles, || ());
        timer.reset();
        assert_eq!((timer.last(), timer.max()), (0, 0));

        cycles.set_step(30);
        timer.measure(&cycles, || ());
        assert_eq!(timer.max(), 30);
    }

    #[test]
    fn survives_counter_wrap() {
        let timer = TaskTimer::new();
        let cycles = FakeCycles::stepping(u32::MAX - 9, 20);
        timer.measure(&cycles, || ());
        assert_eq!(timer.last(), 20);
    }
}
