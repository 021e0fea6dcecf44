// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Bottom half of the sampling chain, run from a software-pended interrupt.
//!
//! Runs below the sampling tick so the next carrier update can preempt it. Per invocation:
//!
//! 1. fetch round 1 (current sample), disarm both axes with `BadTiming` on failure
//! 2. zero the sample of every bridge that is not switching
//! 3. deliver the samples to the axis consumers
//! 4. run the control callback
//! 5. wait (bounded) for the second converter's regular conversion
//! 6. fetch round 2 (DC calibration sample)
//! 7. deliver the calibration samples
//! 8. deliver PWM updates to armed axes
//! 9. check that exactly one update event happened meanwhile, else `ControlDeadlineMissed`
//!
//! A failed round still runs the remaining steps with absent samples.

use crate::axis::{disarm_all, Axis, Bridge};
use crate::config::{BusyWaitBudget, PwmTiming, SenseConfig};
use crate::control::Core;
use crate::error::{AxisError, ErrorSet};
use crate::sampling::{idle_override, Converter, CurrentSense, PhaseCurrents};
use crate::timing::CycleCounter;

/// Converter whose regular conversion closes the DC calibration window.
const DC_CALIB_ADC: usize = 1;

/// Per-axis receiver of the sampled data.
pub trait AxisConsumer {
    fn current_meas_cb(&mut self, timestamp: u32, current: Option<PhaseCurrents>);
    fn dc_calib_cb(&mut self, timestamp: u32, current: Option<PhaseCurrents>);
    fn pwm_update_cb(&mut self, timestamp: u32);
}

/// Output stage supervisor.
pub trait GateDriver {
    /// Output stage configured and not reporting a fault.
    fn is_ready(&self) -> bool;
}

impl<T: GateDriver + ?Sized> GateDriver for &T {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Control computation run once per modulation period.
pub trait ControlLoop<M> {
    fn control_loop_cb(&mut self, timestamp: u32, motors: &mut [M; 2]);
}

impl<M, F: FnMut(u32, &mut [M; 2])> ControlLoop<M> for F {
    fn control_loop_cb(&mut self, timestamp: u32, motors: &mut [M; 2]) {
        self(timestamp, motors)
    }
}

/// Everything the control tick needs to serve one axis.
pub struct AxisPipeline<G> {
    gate: G,
    sense: CurrentSense,
    /// Carrier phase lead of this axis in timer clocks.
    offset: u32,
}

impl<G: GateDriver> AxisPipeline<G> {
    pub fn new(gate: G, sense: CurrentSense, offset: u32) -> Self {
        Self {
            gate,
            sense,
            offset,
        }
    }

    #[inline]
    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn sense_mut(&mut self) -> &mut CurrentSense {
        &mut self.sense
    }

    #[inline]
    fn ready_sense(&self) -> Option<&CurrentSense> {
        self.gate.is_ready().then_some(&self.sense)
    }

    #[inline]
    fn local(&self, timestamp: u32) -> u32 {
        timestamp.wrapping_sub(self.offset)
    }

    fn deliver_current<B: Bridge, M: AxisConsumer>(
        &self,
        axis: &Axis<B>,
        motor: &mut M,
        timestamp: u32,
        sample: Option<PhaseCurrents>,
    ) {
        let sample = idle_override(sample, axis.bridge().is_switching());
        motor.current_meas_cb(self.local(timestamp), sample);
    }

    fn deliver_dc_calib<M: AxisConsumer>(
        &self,
        motor: &mut M,
        timestamp: u32,
        sample: Option<PhaseCurrents>,
    ) {
        motor.dc_calib_cb(self.local(timestamp), sample);
    }

    fn deliver_pwm_update<B: Bridge, M: AxisConsumer>(
        &self,
        axis: &Axis<B>,
        motor: &mut M,
        timestamp: u32,
    ) {
        if axis.is_armed() {
            motor.pwm_update_cb(self.local(timestamp));
        }
    }
}

pub struct ControlTick<'a, A, B, G, M, L, C> {
    core: &'a Core<A, B>,
    pipelines: [AxisPipeline<G>; 2],
    motors: [M; 2],
    control: L,
    counter: C,
    sense_cfg: SenseConfig,
    budget: BusyWaitBudget,
}

impl<'a, A, B, G, M, L, C> ControlTick<'a, A, B, G, M, L, C>
where
    A: Converter,
    B: Bridge,
    G: GateDriver,
    M: AxisConsumer,
    L: ControlLoop<M>,
    C: CycleCounter,
{
    pub fn new(
        core: &'a Core<A, B>,
        timing: &PwmTiming,
        sense_cfg: SenseConfig,
        gates: [G; 2],
        motors: [M; 2],
        control: L,
        counter: C,
    ) -> Self {
        let sense = CurrentSense::new(&sense_cfg);
        let [g0, g1] = gates;
        Self {
            core,
            pipelines: [
                AxisPipeline::new(g0, sense, timing.m0_offset),
                AxisPipeline::new(g1, sense, 0),
            ],
            motors,
            control,
            counter,
            sense_cfg,
            budget: BusyWaitBudget::DEFAULT,
        }
    }

    /// Set the bound on the DC calibration wait.
    pub fn with_busy_wait_budget(mut self, budget: BusyWaitBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn pipeline_mut(&mut self, axis: usize) -> &mut AxisPipeline<G> {
        &mut self.pipelines[axis]
    }

    pub fn motors(&self) -> &[M; 2] {
        &self.motors
    }

    /// Run one control tick. Returns the errors raised during this tick.
    pub fn on_interrupt(&mut self) -> ErrorSet {
        let clock = &self.core.clock;
        let timestamp = clock.now();
        let inc = clock.increment();
        let mut raised = ErrorSet::EMPTY;

        let currents = self.fetch(&mut raised);
        for (i, sample) in currents.into_iter().enumerate() {
            self.pipelines[i].deliver_current(
                &self.core.axes[i],
                &mut self.motors[i],
                timestamp,
                sample,
            );
        }

        let control = &mut self.control;
        let motors = &mut self.motors;
        self.core
            .times
            .control_loop
            .measure(&self.counter, || control.control_loop_cb(timestamp, motors));

        let waited = self
            .core
            .adcs
            .wait_regular_complete(DC_CALIB_ADC, &self.counter, self.budget);
        let calib = match waited {
            Ok(cycles) => {
                self.core.times.dc_calib_wait.record(cycles);
                self.fetch(&mut raised)
            }
            Err(timeout) => {
                self.core.times.dc_calib_wait.record(timeout.cycles);
                self.fault(AxisError::BadTiming, &mut raised);
                [None, None]
            }
        };

        let calib_ts = timestamp.wrapping_add(inc);
        for (i, sample) in calib.into_iter().enumerate() {
            self.pipelines[i].deliver_dc_calib(&mut self.motors[i], calib_ts, sample);
        }

        let pwm_ts = timestamp.wrapping_add(3 * inc);
        for i in 0..2 {
            self.pipelines[i].deliver_pwm_update(&self.core.axes[i], &mut self.motors[i], pwm_ts);
        }

        if clock.now() != timestamp.wrapping_add(inc) {
            self.fault(AxisError::ControlDeadlineMissed, &mut raised);
        }

        raised
    }

    fn fetch(&self, raised: &mut ErrorSet) -> [Option<PhaseCurrents>; 2] {
        let sense = [self.pipelines[0].ready_sense(), self.pipelines[1].ready_sense()];
        match self.core.adcs.fetch_and_reset(sense) {
            Ok(fetch) => {
                self.core.vbus.update(&self.sense_cfg, fetch.vbus_raw);
                fetch.currents
            }
            Err(_) => {
                self.fault(AxisError::BadTiming, raised);
                [None, None]
            }
        }
    }

    fn fault(&self, error: AxisError, raised: &mut ErrorSet) {
        raised.insert(error);
        disarm_all(&self.core.axes, error);
    }
}
