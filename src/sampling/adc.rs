// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Collection of the synchronous converter results.
//!
//! Three converters are triggered by the carrier timers:
//!
//! | Converter | Injected            | Regular             |
//! | --------- | ------------------- | ------------------- |
//! | 0         | bus voltage         | unused              |
//! | 1         | axis 0, phase B     | axis 1, phase B     |
//! | 2         | axis 0, phase C     | axis 1, phase C     |
//!
//! A fetch succeeds only when every converter shows its expected completion flags and none has
//! overrun. Flags are cleared on success and left untouched on failure.

use core::fmt;
use core::ops::BitOr;

use crate::config::BusyWaitBudget;
use crate::sampling::current::{reconstruct, CurrentSense, PhaseCurrents};
use crate::timing::CycleCounter;

/// Converter status flags, laid out as in the STM32 `ADC_SR` register.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AdcFlags(u8);

impl AdcFlags {
    pub const NONE: AdcFlags = AdcFlags(0);
    /// Regular end of conversion.
    pub const EOC: AdcFlags = AdcFlags(1 << 1);
    /// Injected end of conversion.
    pub const JEOC: AdcFlags = AdcFlags(1 << 2);
    /// Overrun.
    pub const OVR: AdcFlags = AdcFlags(1 << 5);

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: AdcFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: AdcFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for AdcFlags {
    type Output = AdcFlags;

    fn bitor(self, rhs: AdcFlags) -> AdcFlags {
        AdcFlags(self.0 | rhs.0)
    }
}

/// Status and result access of one converter.
pub trait Converter {
    fn flags(&self) -> AdcFlags;

    /// Clear the given flags, leaving all others untouched.
    fn clear(&self, flags: AdcFlags);

    /// Regular data register.
    fn regular(&self) -> u16;

    /// First injected data register.
    fn injected(&self) -> u16;

    /// Enable or disable timer-triggered conversions.
    fn set_external_triggers(&self, enabled: bool);
}

impl<T: Converter + ?Sized> Converter for &T {
    fn flags(&self) -> AdcFlags {
        (**self).flags()
    }
    fn clear(&self, flags: AdcFlags) {
        (**self).clear(flags)
    }
    fn regular(&self) -> u16 {
        (**self).regular()
    }
    fn injected(&self) -> u16 {
        (**self).injected()
    }
    fn set_external_triggers(&self, enabled: bool) {
        (**self).set_external_triggers(enabled)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Regular,
    Injected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    /// Converter `adc` lacked some of its expected completion flags.
    Incomplete { adc: usize, flags: AdcFlags },
    /// Converter `adc` overran.
    Overrun { adc: usize },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Incomplete { adc, flags } => {
                write!(f, "ADC{} incomplete (SR={:#04x})", adc + 1, flags.bits())
            }
            FetchError::Overrun { adc } => write!(f, "ADC{} overrun", adc + 1),
        }
    }
}

/// The bounded busy-wait ran out of budget.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WaitTimeout {
    pub cycles: u32,
}

/// Result of a successful fetch.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Fetch {
    pub vbus_raw: u16,
    /// Per-axis sample; `None` when the gate driver was not ready or a code was saturated.
    pub currents: [Option<PhaseCurrents>; 2],
}

const VBUS_ADC: usize = 0;
const PHASE_B_ADC: usize = 1;
const PHASE_C_ADC: usize = 2;

const EXPECTED: [AdcFlags; 3] = [
    AdcFlags::JEOC,
    AdcFlags(AdcFlags::EOC.0 | AdcFlags::JEOC.0),
    AdcFlags(AdcFlags::EOC.0 | AdcFlags::JEOC.0),
];

const AXIS_SOURCE: [Source; 2] = [Source::Injected, Source::Regular];

/// The three converters, read and cleared as one unit.
pub struct AdcBank<A> {
    adcs: [A; 3],
}

impl<A: Converter> AdcBank<A> {
    pub const fn new(adcs: [A; 3]) -> Self {
        Self { adcs }
    }

    #[inline]
    pub fn converter(&self, index: usize) -> &A {
        &self.adcs[index]
    }

    /// Validate, read and reset one sampling instant.
    ///
    /// `sense[i]` is `Some` only for axes whose gate driver is ready; other axes get no sample.
    pub fn fetch_and_reset(&self, sense: [Option<&CurrentSense>; 2]) -> Result<Fetch, FetchError> {
        for (adc, (conv, expected)) in self.adcs.iter().zip(EXPECTED.iter()).enumerate() {
            let flags = conv.flags();
            if flags.intersects(AdcFlags::OVR) {
                return Err(FetchError::Overrun { adc });
            }
            if !flags.contains(*expected) {
                return Err(FetchError::Incomplete { adc, flags });
            }
        }

        let vbus_raw = self.adcs[VBUS_ADC].injected();
        let mut currents = [None, None];
        for (axis, slot) in currents.iter_mut().enumerate() {
            if let Some(sense) = sense[axis] {
                let b = sense.phase_current_from_adcval(self.read(PHASE_B_ADC, AXIS_SOURCE[axis]));
                let c = sense.phase_current_from_adcval(self.read(PHASE_C_ADC, AXIS_SOURCE[axis]));
                *slot = reconstruct(b, c);
            }
        }

        for (conv, expected) in self.adcs.iter().zip(EXPECTED.iter()) {
            conv.clear(*expected | AdcFlags::OVR);
        }

        Ok(Fetch { vbus_raw, currents })
    }

    #[inline]
    fn read(&self, adc: usize, source: Source) -> u16 {
        match source {
            Source::Regular => self.adcs[adc].regular(),
            Source::Injected => self.adcs[adc].injected(),
        }
    }

    /// Spin until converter `adc` shows a regular end of conversion.
    ///
    /// Returns the cycles spent waiting.
    pub fn wait_regular_complete<C: CycleCounter>(
        &self,
        adc: usize,
        counter: &C,
        budget: BusyWaitBudget,
    ) -> Result<u32, WaitTimeout> {
        let start = counter.now();
        loop {
            let elapsed = counter.now().wrapping_sub(start);
            if self.adcs[adc].flags().contains(AdcFlags::EOC) {
                return Ok(elapsed);
            }
            if elapsed > budget.max_cycles {
                return Err(WaitTimeout { cycles: elapsed });
            }
            core::hint::spin_loop();
        }
    }

    /// Clear every status flag on every converter.
    pub fn clear_all(&self) {
        for conv in self.adcs.iter() {
            conv.clear(AdcFlags::EOC | AdcFlags::JEOC | AdcFlags::OVR);
        }
    }

    pub fn set_external_triggers(&self, enabled: bool) {
        for conv in self.adcs.iter() {
            conv.set_external_triggers(enabled);
        }
    }
}
