// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Cycle timestamp and carrier direction tracking.
//!
//! Written only by the sampling tick (highest priority). The control tick and thread mode read the
//! timestamp; a single aligned `u32` load needs no masking on Cortex-M.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Direction of the centre-aligned carrier at an update event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CountDirection {
    /// Update at the counter underflow; the low-side switches were conducting.
    Up,
    /// Update at the counter overflow.
    Down,
}

impl CountDirection {
    #[inline]
    pub fn from_counting_down(counting_down: bool) -> Self {
        if counting_down {
            CountDirection::Down
        } else {
            CountDirection::Up
        }
    }

    #[inline]
    const fn encode(self) -> u8 {
        match self {
            CountDirection::Up => DIR_UP,
            CountDirection::Down => DIR_DOWN,
        }
    }
}

const DIR_UNKNOWN: u8 = 0;
const DIR_UP: u8 = 1;
const DIR_DOWN: u8 = 2;

/// Two consecutive updates reported the same direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpdateMissed(pub CountDirection);

/// Monotonic tick counter advanced by a fixed increment on every accepted update event.
pub struct CycleClock {
    timestamp: AtomicU32,
    direction: AtomicU8,
    increment: u32,
}

impl CycleClock {
    pub const fn new(increment: u32) -> Self {
        Self {
            timestamp: AtomicU32::new(0),
            direction: AtomicU8::new(DIR_UNKNOWN),
            increment,
        }
    }

    /// Current cycle timestamp in timer clocks. Wraps at `u32::MAX`.
    #[inline]
    pub fn now(&self) -> u32 {
        self.timestamp.load(Ordering::Acquire)
    }

    #[inline]
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Last accepted direction, if any update has been seen.
    pub fn direction(&self) -> Option<CountDirection> {
        match self.direction.load(Ordering::Acquire) {
            DIR_UP => Some(CountDirection::Up),
            DIR_DOWN => Some(CountDirection::Down),
            _ => None,
        }
    }

    /// Record the direction of a new update event.
    ///
    /// The first observation is adopted as-is; afterwards the direction must alternate.
    pub(crate) fn observe(&self, dir: CountDirection) -> Result<(), UpdateMissed> {
        let prev = self.direction.load(Ordering::Relaxed);
        if prev == dir.encode() {
            return Err(UpdateMissed(dir));
        }
        self.direction.store(dir.encode(), Ordering::Release);
        Ok(())
    }

    /// Advance by one increment and return the new timestamp.
    pub(crate) fn advance(&self) -> u32 {
        let next = self.now().wrapping_add(self.increment);
        self.timestamp.store(next, Ordering::Release);
        next
    }
}
