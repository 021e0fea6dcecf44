// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Static configuration of the modulation and sensing chain.
//!
//! Values default to the dual-axis board layout: a 168 MHz timer clock, a 3500-clock carrier
//! half-period and a repetition counter of 2, giving one auxiliary-timer update every three
//! carrier half-periods.

/// Carrier and cycle timing shared by both axes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PwmTiming {
    /// Timer kernel clock in Hz.
    pub timer_clock_hz: u32,
    /// Auto-reload value of the centre-aligned carrier timers.
    pub period_clocks: u32,
    /// Repetition counter of the carrier timers.
    pub repetition: u32,
    /// Initial count of axis 0's carrier timer (phase lead over axis 1).
    pub m0_offset: u32,
}

impl PwmTiming {
    pub const DEFAULT: PwmTiming = PwmTiming {
        timer_clock_hz: 168_000_000,
        period_clocks: 3500,
        repetition: 2,
        m0_offset: 3500 / 2 - 128,
    };

    /// Timestamp increment per auxiliary-timer update, in timer clocks.
    #[inline]
    pub const fn cycle_increment(&self) -> u32 {
        self.period_clocks * (self.repetition + 1)
    }

    /// Interval between two current measurements of the same axis, in seconds.
    #[inline]
    pub fn current_meas_period_s(&self) -> f32 {
        2.0 * self.cycle_increment() as f32 / self.timer_clock_hz as f32
    }

    /// Compare value that yields 50 % duty on a centre-aligned carrier.
    #[inline]
    pub const fn fallback_compare(&self) -> u16 {
        (self.period_clocks / 2) as u16
    }

    /// Initial counts for `[axis 0 carrier, axis 1 carrier, auxiliary]`.
    #[inline]
    pub const fn initial_counts(&self) -> [u32; 3] {
        [self.m0_offset, 0, self.m0_offset / 2]
    }
}

impl Default for PwmTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Analog front-end parameters for phase current and bus voltage sensing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SenseConfig {
    /// Shunt resistance in ohms.
    pub shunt_ohms: f32,
    /// Current sense amplifier gain in V/V.
    pub amp_gain: f32,
    /// Converter reference voltage.
    pub vref: f32,
    /// Largest raw code plus one (4096 for 12 bits).
    pub full_scale: u16,
    /// Codes closer than this to either rail are rejected.
    pub rail_margin: u16,
    /// Bus voltage divider ratio.
    pub vbus_divider: f32,
}

impl SenseConfig {
    pub const DEFAULT: SenseConfig = SenseConfig {
        shunt_ohms: 500e-6,
        amp_gain: 40.0,
        vref: 3.3,
        full_scale: 1 << 12,
        rail_margin: 0,
        vbus_divider: 19.0,
    };

    /// Set the sense amplifier gain.
    pub fn with_amp_gain(mut self, gain: f32) -> Self {
        self.amp_gain = gain;
        self
    }

    /// Set the shunt resistance.
    pub fn with_shunt(mut self, ohms: f32) -> Self {
        self.shunt_ohms = ohms;
        self
    }

    /// Reject codes within `margin` of either converter rail.
    pub fn with_rail_margin(mut self, margin: u16) -> Self {
        self.rail_margin = margin;
        self
    }

    /// Set the bus voltage divider ratio.
    pub fn with_vbus_divider(mut self, ratio: f32) -> Self {
        self.vbus_divider = ratio;
        self
    }
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Upper bound on the DC-calibration busy-wait, in CPU cycles.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusyWaitBudget {
    pub max_cycles: u32,
}

impl BusyWaitBudget {
    /// One carrier half-period at a 216 MHz core clock.
    pub const DEFAULT: BusyWaitBudget = BusyWaitBudget { max_cycles: 4500 };

    pub const fn cycles(max_cycles: u32) -> Self {
        Self { max_cycles }
    }
}

impl Default for BusyWaitBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}
