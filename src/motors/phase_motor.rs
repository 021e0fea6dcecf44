// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Per-axis consumer of the sampling chain.
//!
//! Holds the latest offset-corrected current sample, tracks the amplifier DC offset from the
//! zero-current samples and applies the compare values staged by the control loop.

use crate::axis::{Axis, Bridge};
use crate::control::AxisConsumer;
use crate::sampling::PhaseCurrents;

/// Time constant of the DC offset filter, in seconds.
const DEFAULT_DC_CALIB_TAU_S: f32 = 0.2;

pub struct PhaseMotor<'a, B> {
    axis: &'a Axis<B>,
    period_clocks: u16,

    current: Option<PhaseCurrents>,
    current_ts: u32,
    missed_samples: u32,

    /// DC offset estimate
    dc_offset: PhaseCurrents,
    /// Filter coefficient per calibration sample
    calib_k: f32,

    staged: Option<[u16; 3]>,
    last_update_ts: u32,
}

impl<'a, B: Bridge> PhaseMotor<'a, B> {
    /// `meas_period_s` is the interval between two calibration samples of this axis.
    pub fn new(axis: &'a Axis<B>, period_clocks: u16, meas_period_s: f32) -> Self {
        Self {
            axis,
            period_clocks,
            current: None,
            current_ts: 0,
            missed_samples: 0,
            dc_offset: PhaseCurrents::ZERO,
            calib_k: filter_k(meas_period_s, DEFAULT_DC_CALIB_TAU_S),
            staged: None,
            last_update_ts: 0,
        }
    }

    /// Set the DC offset filter time constant.
    pub fn with_dc_calib_tau(mut self, meas_period_s: f32, tau_s: f32) -> Self {
        self.calib_k = filter_k(meas_period_s, tau_s);
        self
    }

    #[inline]
    pub fn axis(&self) -> &Axis<B> {
        self.axis
    }

    /// Latest sample, offset-corrected, and its timestamp.
    pub fn current(&self) -> Option<(u32, PhaseCurrents)> {
        self.current.map(|c| (self.current_ts, c))
    }

    pub fn dc_offset(&self) -> PhaseCurrents {
        self.dc_offset
    }

    /// Sampling instants without a usable measurement.
    pub fn missed_samples(&self) -> u32 {
        self.missed_samples
    }

    /// Timestamp at which the last staged compares take effect.
    pub fn last_update(&self) -> u32 {
        self.last_update_ts
    }

    /// Stage raw compare values for the next PWM update.
    pub fn stage_compares(&mut self, compares: [u16; 3]) {
        let max = self.period_clocks;
        self.staged = Some(compares.map(|c| c.min(max)));
    }

    /// Stage per-phase duty cycles in `[0, 1]`.
    pub fn stage_duty(&mut self, duty: [f32; 3]) {
        let period = self.period_clocks as f32;
        self.stage_compares(duty.map(|d| (d.clamp(0.0, 1.0) * period + 0.5) as u16));
    }
}

fn filter_k(period_s: f32, tau_s: f32) -> f32 {
    if tau_s <= 0.0 {
        return 1.0;
    }
    (period_s / tau_s).min(1.0)
}

impl<'a, B: Bridge> AxisConsumer for PhaseMotor<'a, B> {
    fn current_meas_cb(&mut self, timestamp: u32, current: Option<PhaseCurrents>) {
        self.current_ts = timestamp;
        self.current = current.map(|c| PhaseCurrents {
            a: c.a - self.dc_offset.a,
            b: c.b - self.dc_offset.b,
            c: c.c - self.dc_offset.c,
        });
        if self.current.is_none() {
            self.missed_samples = self.missed_samples.wrapping_add(1);
        }
    }

    fn dc_calib_cb(&mut self, _timestamp: u32, current: Option<PhaseCurrents>) {
        let Some(c) = current else {
            return;
        };
        let k = self.calib_k;
        let o = &mut self.dc_offset;
        o.a += (c.a - o.a) * k;
        o.b += (c.b - o.b) * k;
        o.c += (c.c - o.c) * k;
    }

    fn pwm_update_cb(&mut self, timestamp: u32) {
        let Some(compares) = self.staged.take() else {
            return;
        };
        // a disarmed bridge keeps its safe state
        if self.axis.is_armed() {
            self.axis.bridge().set_compares(compares);
            self.last_update_ts = timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBridge;

    #[test]
    fn dc_offset_converges_and_is_subtracted() {
        let axis = Axis::new(0, FakeBridge::switching());
        let mut m = PhaseMotor::new(&axis, 3500, 0.1).with_dc_calib_tau(0.1, 0.4);
        let bias = PhaseCurrents::from_bc(0.5, -0.2);

        for _ in 0..200 {
            m.dc_calib_cb(0, Some(bias));
        }
        let o = m.dc_offset();
        assert!((o.b - 0.5).abs() < 1e-4);
        assert!((o.c + 0.2).abs() < 1e-4);

        m.current_meas_cb(42, Some(PhaseCurrents::from_bc(1.5, -0.2)));
        let (ts, c) = m.current().unwrap();
        assert_eq!(ts, 42);
        assert!((c.b - 1.0).abs() < 1e-3);
        assert!(c.c.abs() < 1e-3);
    }

    #[test]
    fn absent_calibration_sample_keeps_offset() {
        let axis = Axis::new(0, FakeBridge::switching());
        let mut m = PhaseMotor::new(&axis, 3500, 1.0).with_dc_calib_tau(1.0, 1.0);
        m.dc_calib_cb(0, Some(PhaseCurrents::from_bc(2.0, 0.0)));
        m.dc_calib_cb(0, None);
        assert_eq!(m.dc_offset().b, 2.0);
    }

    #[test]
    fn missing_samples_are_counted() {
        let axis = Axis::new(0, FakeBridge::switching());
        let mut m = PhaseMotor::new(&axis, 3500, 125e-6);
        m.current_meas_cb(1, None);
        m.current_meas_cb(2, Some(PhaseCurrents::ZERO));
        m.current_meas_cb(3, None);
        assert_eq!(m.missed_samples(), 2);
        assert_eq!(m.current(), None);
    }

    #[test]
    fn staged_compares_apply_once() {
        let axis = Axis::new(1, FakeBridge::idle());
        axis.arm(1750).unwrap();
        let mut m = PhaseMotor::new(&axis, 3500, 125e-6);

        m.stage_duty([0.0, 0.5, 2.0]);
        m.pwm_update_cb(900);
        assert_eq!(axis.bridge().compares(), [0, 1750, 3500]);
        assert_eq!(m.last_update(), 900);

        // fallback written by the sampling tick survives an empty update
        axis.bridge().set_all_compares(1750);
        m.pwm_update_cb(1900);
        assert_eq!(axis.bridge().compares(), [1750; 3]);
        assert_eq!(m.last_update(), 900);
    }

    #[test]
    fn disarmed_axis_drops_staged_compares() {
        let axis = Axis::new(0, FakeBridge::idle());
        let mut m = PhaseMotor::new(&axis, 3500, 125e-6);
        m.stage_compares([100, 200, 9000]);
        m.pwm_update_cb(5);
        assert_eq!(axis.bridge().compares(), [0; 3]);

        // staged values are consumed even when not applied
        axis.arm(1750).unwrap();
        m.pwm_update_cb(6);
        assert_eq!(axis.bridge().compares(), [1750; 3]);
    }
}
