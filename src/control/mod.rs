// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Real-Time Sampling Chain
//!
//! Interrupt-driven pipeline that keeps current sampling phase-locked to the carriers.
//!
//! ## Modules
//!
//! - [`sampling_tick`] - Top half on the carrier update interrupt (highest priority).
//! - [`control_tick`] - Bottom half on a software-pended interrupt (lowest priority).
//!
//! The shared state of both halves lives in a [`Core`], normally a `static`.

pub mod control_tick;
pub mod sampling_tick;

pub use control_tick::{AxisConsumer, AxisPipeline, ControlLoop, ControlTick, GateDriver};
pub use sampling_tick::{SamplingTick, Tick};

use crate::axis::{Axis, Bridge};
use crate::sampling::{AdcBank, Converter, VbusSense};
use crate::timing::{CycleClock, SyncError, SyncTimer, TaskTimes, TimerSynchronizer, UpdateSource};

/// Raises the control tick interrupt.
pub trait ControlTrigger {
    fn pend(&self);
}

impl<T: ControlTrigger + ?Sized> ControlTrigger for &T {
    fn pend(&self) {
        (**self).pend()
    }
}

/// State shared by the sampling and control ticks and observed from thread mode.
pub struct Core<A, B> {
    pub adcs: AdcBank<A>,
    pub axes: [Axis<B>; 2],
    pub clock: CycleClock,
    pub sync: TimerSynchronizer,
    pub times: TaskTimes,
    pub vbus: VbusSense,
}

impl<A: Converter, B: Bridge> Core<A, B> {
    /// `increment` is the cycle timestamp step per update event.
    pub const fn new(adcs: [A; 3], axes: [Axis<B>; 2], increment: u32) -> Self {
        Self {
            adcs: AdcBank::new(adcs),
            axes,
            clock: CycleClock::new(increment),
            sync: TimerSynchronizer::new(),
            times: TaskTimes::new(),
            vbus: VbusSense::new(),
        }
    }
}

/// Start the carriers phase-locked and enable the sampling interrupt.
///
/// Converter triggers are held off while the counters are realigned so no conversion fires on a
/// spurious edge. Status left over from before the start is discarded.
pub fn start_timers<A: Converter, B: Bridge, U: UpdateSource>(
    core: &Core<A, B>,
    timers: [&dyn SyncTimer; 3],
    counts: [u32; 3],
    update: &U,
) -> Result<(), SyncError> {
    critical_section::with(|_| {
        core.adcs.set_external_triggers(false);
        let started = core.sync.start_synchronously(timers, counts);
        core.adcs.set_external_triggers(true);
        core.adcs.clear_all();

        started?;
        update.clear_update();
        update.listen_update();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PwmTiming, SenseConfig};
    use crate::error::{AxisError, ErrorSet};
    use crate::sampling::{AdcFlags, PhaseCurrents};
    use crate::testing::{
        Event, FakeAdc, FakeBridge, FakeCycles, FakeGate, FakeTimer, FakeTrigger, Journal,
        TimerEvent,
    };
    use core::cell::{Cell, RefCell};

    fn core(increment: u32) -> Core<FakeAdc, FakeBridge> {
        Core::new(
            [FakeAdc::new(), FakeAdc::new(), FakeAdc::new()],
            [
                Axis::new(0, FakeBridge::idle()),
                Axis::new(1, FakeBridge::idle()),
            ],
            increment,
        )
    }

    #[derive(Default)]
    struct Counting {
        samples: u32,
        calibs: u32,
        updates: u32,
    }

    impl AxisConsumer for Counting {
        fn current_meas_cb(&mut self, _: u32, current: Option<PhaseCurrents>) {
            if current.is_some() {
                self.samples += 1;
            }
        }
        fn dc_calib_cb(&mut self, _: u32, current: Option<PhaseCurrents>) {
            if current.is_some() {
                self.calibs += 1;
            }
        }
        fn pwm_update_cb(&mut self, _: u32) {
            self.updates += 1;
        }
    }

    #[test]
    fn start_sequence_orders_triggers_and_interrupt() {
        let timing = PwmTiming::DEFAULT;
        let core = core(timing.cycle_increment());
        core.adcs.converter(1).raise(AdcFlags::EOC | AdcFlags::OVR);
        let (t1, t8, t13) = (FakeTimer::new(3500), FakeTimer::new(3500), FakeTimer::new(3500));

        start_timers(&core, [&t1, &t8, &t13], timing.initial_counts(), &t8).unwrap();

        assert_eq!([t1.count(), t8.count(), t13.count()], timing.initial_counts());
        assert!(t1.running() && t8.running() && t13.running());
        assert!(t8.listening());
        assert_eq!(t8.updates_cleared(), 1);
        for i in 0..3 {
            assert!(core.adcs.converter(i).triggers_enabled());
            assert_eq!(core.adcs.converter(i).flags(), AdcFlags::NONE);
        }
    }

    #[test]
    fn triggers_stay_off_while_counters_realign() {
        let timing = PwmTiming::DEFAULT;
        let core = core(timing.cycle_increment());
        let (t1, t8, t13) = (FakeTimer::new(3500), FakeTimer::new(3500), FakeTimer::new(3500));
        let journal = Journal::new();
        for i in 0..3 {
            core.adcs.converter(i).attach(&journal);
        }
        for t in [&t1, &t8, &t13] {
            t.attach(&journal);
        }

        start_timers(&core, [&t1, &t8, &t13], timing.initial_counts(), &t8).unwrap();

        let events = journal.events();
        let pos = |want: Event| events.iter().position(|&e| e == want);
        let rpos = |want: Event| events.iter().rposition(|&e| e == want);
        let last_off = rpos(Event::TriggersOff).unwrap();
        let first_on = pos(Event::TriggersOn).unwrap();
        let first_halt = pos(Event::Timer(TimerEvent::Halt)).unwrap();
        let last_resume = rpos(Event::Timer(TimerEvent::Resume)).unwrap();
        let first_clear = pos(Event::ClearFlags).unwrap();

        assert_eq!(events.iter().filter(|&&e| e == Event::TriggersOff).count(), 3);
        assert_eq!(events.iter().filter(|&&e| e == Event::TriggersOn).count(), 3);
        assert!(last_off < first_halt, "{:?}", events);
        assert!(last_resume < first_on, "{:?}", events);
        assert!(rpos(Event::TriggersOn).unwrap() < first_clear, "{:?}", events);
        assert_eq!(
            events[events.len() - 2..],
            [Event::ClearUpdate, Event::ListenUpdate]
        );
    }

    #[test]
    fn failed_start_leaves_interrupt_off() {
        let core = core(100);
        let (a, b, c) = (FakeTimer::new(10), FakeTimer::new(10), FakeTimer::new(10));

        let err = start_timers(&core, [&a, &b, &c], [0, 0, 11], &b).unwrap_err();

        assert!(matches!(err, SyncError::OffsetOutOfRange { index: 2, .. }));
        assert!(!b.listening());
        assert!(core.adcs.converter(0).triggers_enabled());
    }

    /// Both halves driven by a simulated carrier. The control callback plays the part of the
    /// hardware: the next (count-down) update preempts it and the converters complete again.
    #[test]
    fn thousand_clean_transitions() {
        let timing = PwmTiming::DEFAULT;
        let inc = timing.cycle_increment();
        let core = core(inc);
        for axis in core.axes.iter() {
            axis.arm(timing.fallback_compare()).unwrap();
        }
        let carrier = FakeTimer::new(timing.period_clocks);
        let trigger = FakeTrigger::default();
        let hooks = Cell::new(0u32);
        let raise_round = || {
            core.adcs.converter(0).raise(AdcFlags::JEOC);
            core.adcs.converter(1).raise(AdcFlags::EOC | AdcFlags::JEOC);
            core.adcs.converter(2).raise(AdcFlags::EOC | AdcFlags::JEOC);
        };

        let sampling = RefCell::new(SamplingTick::new(
            &core,
            &carrier,
            &trigger,
            FakeCycles::stepping(0, 1),
            timing.fallback_compare(),
            || hooks.set(hooks.get() + 1),
        ));
        let mut control = ControlTick::new(
            &core,
            &timing,
            SenseConfig::DEFAULT,
            [FakeGate::ready(), FakeGate::ready()],
            [Counting::default(), Counting::default()],
            |_: u32, _: &mut [Counting; 2]| {
                let next = core.clock.now() + inc;
                carrier.set_counting_down(true);
                assert_eq!(sampling.borrow_mut().on_interrupt(), Tick::Fallback(next));
                raise_round();
            },
            FakeCycles::stepping(0, 1),
        );

        let mut controls = 0;
        for _ in 0..500 {
            carrier.set_counting_down(false);
            raise_round();
            let pends = trigger.pends();
            assert!(matches!(sampling.borrow_mut().on_interrupt(), Tick::Sampled(_)));
            if trigger.pends() > pends {
                assert_eq!(control.on_interrupt(), ErrorSet::EMPTY);
                controls += 1;
            }
        }

        assert_eq!(core.clock.now(), 1000 * inc);
        assert_eq!(hooks.get(), 500);
        assert_eq!(controls, 500);
        for (axis, motor) in core.axes.iter().zip(control.motors().iter()) {
            assert!(axis.is_armed());
            assert!(axis.errors().is_empty());
            assert_eq!(motor.samples, 500);
            assert_eq!(motor.calibs, 500);
            assert_eq!(motor.updates, 500);
        }
    }

    #[test]
    fn stuck_converter_fails_every_fetch() {
        let core = core(100);
        for axis in core.axes.iter() {
            axis.arm(1750).unwrap();
        }
        // converter 0 never raises its injected end of conversion
        let partial_round = || {
            core.adcs.converter(1).raise(AdcFlags::EOC | AdcFlags::JEOC);
            core.adcs.converter(2).raise(AdcFlags::EOC | AdcFlags::JEOC);
        };
        partial_round();
        let mut control = ControlTick::new(
            &core,
            &PwmTiming::DEFAULT,
            SenseConfig::DEFAULT,
            [FakeGate::ready(), FakeGate::ready()],
            [Counting::default(), Counting::default()],
            |_: u32, _: &mut [Counting; 2]| {
                core.clock.advance();
                partial_round();
            },
            FakeCycles::stepping(0, 1),
        );

        for _ in 0..3 {
            assert!(core.adcs.fetch_and_reset([None, None]).is_err());
            let raised = control.on_interrupt();
            assert_eq!(raised, ErrorSet::from(AxisError::BadTiming));
        }

        for (axis, motor) in core.axes.iter().zip(control.motors().iter()) {
            assert!(!axis.is_armed());
            assert_eq!(axis.errors(), ErrorSet::from(AxisError::BadTiming));
            assert_eq!(motor.calibs, 0);
            assert_eq!(motor.updates, 0);
        }
    }
}
