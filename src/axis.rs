// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Per-axis runtime state: armed flag and sticky error set.
//!
//! Both fields are atomics so interrupt handlers at different priority tiers can disarm without a
//! lock. Re-arming happens from thread mode inside a critical section, which makes the
//! "no errors pending" check and the transition to armed indivisible with respect to every
//! interrupt that could disarm.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{AxisError, ErrorSet};

/// Power stage of one motor.
pub trait Bridge {
    /// Whether the outputs are actively modulating.
    fn is_switching(&self) -> bool;

    /// Stop modulating and leave every switch open.
    fn force_safe(&self);

    /// Start modulating with the current compare values.
    fn enable(&self);

    /// Write the same compare value to all three phases.
    fn set_all_compares(&self, compare: u16);

    /// Write per-phase compare values.
    fn set_compares(&self, compares: [u16; 3]);
}

impl<T: Bridge + ?Sized> Bridge for &T {
    fn is_switching(&self) -> bool {
        (**self).is_switching()
    }
    fn force_safe(&self) {
        (**self).force_safe()
    }
    fn enable(&self) {
        (**self).enable()
    }
    fn set_all_compares(&self, compare: u16) {
        (**self).set_all_compares(compare)
    }
    fn set_compares(&self, compares: [u16; 3]) {
        (**self).set_compares(compares)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArmError {
    /// Errors are still latched; clear them first.
    Faulted(ErrorSet),
}

impl fmt::Display for ArmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmError::Faulted(set) => write!(f, "axis faulted: {}", set),
        }
    }
}

/// One motor axis and its bridge.
pub struct Axis<B> {
    id: u8,
    bridge: B,
    armed: AtomicBool,
    errors: AtomicU8,
}

impl<B: Bridge> Axis<B> {
    pub const fn new(id: u8, bridge: B) -> Self {
        Self {
            id,
            bridge,
            armed: AtomicBool::new(false),
            errors: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[inline]
    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn errors(&self) -> ErrorSet {
        ErrorSet::from_raw(self.errors.load(Ordering::Acquire))
    }

    /// Fatal stop. Forces the bridge safe first, then latches `error`.
    ///
    /// Idempotent: repeated calls re-force the bridge and only log the first occurrence of each
    /// error.
    pub fn disarm_with_error(&self, error: AxisError) {
        self.bridge.force_safe();
        self.armed.store(false, Ordering::Release);
        let prev = self.errors.fetch_or(error.bit(), Ordering::AcqRel);
        if prev & error.bit() == 0 {
            log::error!("axis {} disarmed: {}", self.id, error);
        }
    }

    /// Request the axis to resume. Fails while any error is latched.
    ///
    /// `idle_compare` is loaded into all phases before the bridge starts switching.
    pub fn arm(&self, idle_compare: u16) -> Result<(), ArmError> {
        critical_section::with(|_| {
            let errors = self.errors();
            if !errors.is_empty() {
                return Err(ArmError::Faulted(errors));
            }
            self.bridge.set_all_compares(idle_compare);
            self.bridge.enable();
            self.armed.store(true, Ordering::Release);
            Ok(())
        })
    }

    /// Disarm without latching an error.
    pub fn disarm(&self) {
        self.bridge.force_safe();
        self.armed.store(false, Ordering::Release);
    }

    /// Acknowledge latched errors. Does not re-arm.
    pub fn clear_errors(&self) -> ErrorSet {
        critical_section::with(|_| ErrorSet::from_raw(self.errors.swap(0, Ordering::AcqRel)))
    }
}

/// Disarm every axis with the same error. Used for faults in shared timing.
pub fn disarm_all<B: Bridge>(axes: &[Axis<B>], error: AxisError) {
    for axis in axes {
        axis.disarm_with_error(error);
    }
}
