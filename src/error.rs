// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fault taxonomy of the real-time pipeline.
//!
//! Every fault is fatal to the affected axis for the current session. Faults accumulate in a
//! sticky [`ErrorSet`] until the axis is explicitly re-armed from thread mode.

use core::fmt;

/// Fatal per-axis faults detected inside the interrupt chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AxisError {
    /// The auxiliary timer reported the same count direction twice in a row.
    TimerUpdateMissed,
    /// A converter round was incomplete or overran.
    BadTiming,
    /// The sampling tick did not advance the cycle timestamp exactly once during a control tick.
    ControlDeadlineMissed,
}

impl AxisError {
    pub const ALL: [AxisError; 3] = [
        AxisError::TimerUpdateMissed,
        AxisError::BadTiming,
        AxisError::ControlDeadlineMissed,
    ];

    /// Bit used for this fault inside an [`ErrorSet`].
    #[inline]
    pub const fn bit(self) -> u8 {
        match self {
            AxisError::TimerUpdateMissed => 1 << 0,
            AxisError::BadTiming => 1 << 1,
            AxisError::ControlDeadlineMissed => 1 << 2,
        }
    }
}

impl fmt::Display for AxisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisError::TimerUpdateMissed => f.write_str("timer update missed"),
            AxisError::BadTiming => f.write_str("bad ADC timing"),
            AxisError::ControlDeadlineMissed => f.write_str("control deadline missed"),
        }
    }
}

/// Sticky set of [`AxisError`]s.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorSet {
    raw: u8,
}

impl ErrorSet {
    pub const EMPTY: ErrorSet = ErrorSet { raw: 0 };

    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn raw(&self) -> u8 {
        self.raw
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.raw == 0
    }

    #[inline]
    pub const fn contains(&self, error: AxisError) -> bool {
        (self.raw & error.bit()) != 0
    }

    #[inline]
    pub fn insert(&mut self, error: AxisError) {
        self.raw |= error.bit();
    }

    /// Iterate over the faults present in the set.
    pub fn iter(self) -> impl Iterator<Item = AxisError> {
        AxisError::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl From<AxisError> for ErrorSet {
    fn from(e: AxisError) -> Self {
        Self { raw: e.bit() }
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, e) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_set_is_sticky_and_ordered() {
        let mut set = ErrorSet::EMPTY;
        set.insert(AxisError::ControlDeadlineMissed);
        set.insert(AxisError::TimerUpdateMissed);
        set.insert(AxisError::ControlDeadlineMissed);

        assert!(set.contains(AxisError::TimerUpdateMissed));
        assert!(!set.contains(AxisError::BadTiming));

        let listed: std::vec::Vec<_> = set.iter().collect();
        assert_eq!(
            listed,
            [AxisError::TimerUpdateMissed, AxisError::ControlDeadlineMissed]
        );
    }

    #[test]
    fn display_lists_every_fault() {
        let mut set = ErrorSet::from(AxisError::BadTiming);
        set.insert(AxisError::TimerUpdateMissed);
        assert_eq!(
            std::format!("{}", set),
            "timer update missed, bad ADC timing"
        );
        assert_eq!(std::format!("{}", ErrorSet::EMPTY), "none");
    }
}
