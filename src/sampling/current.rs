// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Phase current reconstruction and analog scaling.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::SenseConfig;

/// Three-phase current sample in amperes.
///
/// Only B and C are measured. A is stored as `-(b + c)`, so `a == -(b + c)` holds bit for bit;
/// summing the three left to right can still be off by an ulp of `b + c`, and overflows to
/// infinity for inputs near `f32::MAX`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhaseCurrents {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl PhaseCurrents {
    pub const ZERO: PhaseCurrents = PhaseCurrents {
        a: 0.0,
        b: 0.0,
        c: 0.0,
    };

    /// Derive phase A from B and C by Kirchhoff's current law.
    #[inline]
    pub fn from_bc(b: f32, c: f32) -> Self {
        Self { a: -(b + c), b, c }
    }
}

/// Build a sample only when both measured phases are present.
#[inline]
pub fn reconstruct(b: Option<f32>, c: Option<f32>) -> Option<PhaseCurrents> {
    Some(PhaseCurrents::from_bc(b?, c?))
}

/// An idle bridge cannot be measured; report zero current instead of a stale or absent sample.
#[inline]
pub fn idle_override(sample: Option<PhaseCurrents>, switching: bool) -> Option<PhaseCurrents> {
    if switching {
        sample
    } else {
        Some(PhaseCurrents::ZERO)
    }
}

/// Conversion from raw shunt amplifier codes to amperes.
#[derive(Copy, Clone, Debug)]
pub struct CurrentSense {
    amps_per_code: f32,
    midpoint: i32,
    lo: u16,
    hi: u16,
}

impl CurrentSense {
    pub fn new(cfg: &SenseConfig) -> Self {
        let volts_per_code = cfg.vref / cfg.full_scale as f32;
        let full = cfg.full_scale;
        Self {
            amps_per_code: volts_per_code / (cfg.amp_gain * cfg.shunt_ohms),
            midpoint: (full / 2) as i32,
            lo: cfg.rail_margin,
            hi: full.saturating_sub(1).saturating_sub(cfg.rail_margin),
        }
    }

    /// Change the amplifier gain after the gate driver reports the gain it actually applied.
    pub fn set_gain(&mut self, cfg: &SenseConfig, gain: f32) {
        *self = Self::new(&cfg.with_amp_gain(gain));
    }

    /// `None` when the code sits within the rail margin (amplifier saturated).
    pub fn phase_current_from_adcval(&self, code: u16) -> Option<f32> {
        if code < self.lo || code > self.hi {
            return None;
        }
        Some((code as i32 - self.midpoint) as f32 * self.amps_per_code)
    }

    /// Magnitude of the largest current this front end can measure.
    pub fn max_measurable(&self) -> f32 {
        (self.hi as i32 - self.midpoint) as f32 * self.amps_per_code
    }
}

/// Most recent bus voltage, published lock-free from the control tick.
pub struct VbusSense {
    bits: AtomicU32,
}

impl VbusSense {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    pub fn update(&self, cfg: &SenseConfig, code: u16) {
        let volts = code as f32 * cfg.vref / cfg.full_scale as f32 * cfg.vbus_divider;
        self.bits.store(volts.to_bits(), Ordering::Relaxed);
    }

    /// Last measured bus voltage in volts.
    pub fn volts(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for VbusSense {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_a_is_negated_sum_of_b_and_c() {
        let cases = [
            (0.0f32, 0.0f32),
            (-0.0, 0.0),
            (1.5, -2.25),
            (-13.7, -0.001),
            (1e-7, 3.0e4),
            (f32::MAX / 4.0, -f32::MAX / 8.0),
            (0.1, 0.2),
        ];
        for (b, c) in cases {
            let s = reconstruct(Some(b), Some(c)).unwrap();
            assert_eq!(s.b, b);
            assert_eq!(s.c, c);
            assert_eq!(s.a.to_bits(), (-(b + c)).to_bits(), "b={} c={}", b, c);
        }
    }

    #[test]
    fn left_to_right_sum_is_within_rounding() {
        for (b, c) in [(0.1f32, 0.2f32), (-13.7, -0.001), (1.5, -2.25)] {
            let s = PhaseCurrents::from_bc(b, c);
            let residual = s.a + s.b + s.c;
            assert!(residual.abs() <= f32::EPSILON * (b.abs() + c.abs()), "b={} c={}", b, c);
        }
        // no headroom left for the negated sum
        let s = PhaseCurrents::from_bc(f32::MAX, f32::MAX);
        assert_eq!(s.a, f32::NEG_INFINITY);
    }

    #[test]
    fn missing_phase_gives_no_sample() {
        assert_eq!(reconstruct(None, Some(1.0)), None);
        assert_eq!(reconstruct(Some(1.0), None), None);
        assert_eq!(reconstruct(None, None), None);
    }

    #[test]
    fn idle_bridge_reports_zero() {
        let live = Some(PhaseCurrents::from_bc(4.0, -1.0));
        assert_eq!(idle_override(live, false), Some(PhaseCurrents::ZERO));
        assert_eq!(idle_override(None, false), Some(PhaseCurrents::ZERO));
        assert_eq!(idle_override(live, true), live);
        assert_eq!(idle_override(None, true), None);
    }

    #[test]
    fn adc_codes_scale_around_midpoint() {
        let sense = CurrentSense::new(&SenseConfig::DEFAULT);
        assert_eq!(sense.phase_current_from_adcval(2048), Some(0.0));

        // 3.3 V / 4096 / (40 * 0.5 mOhm) per code
        let step = 3.3 / 4096.0 / (40.0 * 500e-6);
        let i = sense.phase_current_from_adcval(2048 + 100).unwrap();
        assert!((i - 100.0 * step).abs() < 1e-4);
        let i = sense.phase_current_from_adcval(2048 - 100).unwrap();
        assert!((i + 100.0 * step).abs() < 1e-4);
    }

    #[test]
    fn saturated_codes_are_rejected() {
        let sense = CurrentSense::new(&SenseConfig::DEFAULT.with_rail_margin(32));
        assert_eq!(sense.phase_current_from_adcval(31), None);
        assert!(sense.phase_current_from_adcval(32).is_some());
        assert!(sense.phase_current_from_adcval(4063).is_some());
        assert_eq!(sense.phase_current_from_adcval(4064), None);
    }

    #[test]
    fn vbus_scales_through_divider() {
        let vbus = VbusSense::new();
        vbus.update(&SenseConfig::DEFAULT, 1000);
        let expected = 1000.0 * 3.3 / 4096.0 * 19.0;
        assert!((vbus.volts() - expected).abs() < 1e-4);

        vbus.update(&SenseConfig::DEFAULT.with_vbus_divider(11.0), 1000);
        assert!((vbus.volts() - 1000.0 * 3.3 / 4096.0 * 11.0).abs() < 1e-4);
    }

    #[test]
    fn larger_shunt_halves_the_range() {
        let base = CurrentSense::new(&SenseConfig::DEFAULT);
        let doubled = CurrentSense::new(&SenseConfig::DEFAULT.with_shunt(1e-3));

        assert_eq!(base.max_measurable(), base.phase_current_from_adcval(4095).unwrap());
        assert!((base.max_measurable() - 2.0 * doubled.max_measurable()).abs() < 1e-3);
        // 2047 codes above midpoint at 40 V/V, 0.5 mOhm
        assert!((base.max_measurable() - 2047.0 * 3.3 / 4096.0 / 0.02).abs() < 1e-2);
    }

    #[test]
    fn gain_change_rescales() {
        let mut sense = CurrentSense::new(&SenseConfig::DEFAULT);
        let at_40 = sense.max_measurable();
        sense.set_gain(&SenseConfig::DEFAULT, 80.0);
        assert!((sense.max_measurable() - at_40 / 2.0).abs() < 1e-3);
    }
}
