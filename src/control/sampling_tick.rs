// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Top half of the sampling chain, bound to the carrier update interrupt.
//!
//! Runs at the highest priority. Each update event must flip the carrier direction. On the
//! count-up update (low-side switches conducting, real current in the shunts) it runs the
//! sampling hook and pends the control tick. On the count-down update it preloads a 50 % duty
//! fallback into every compare register so a late control tick leaves the bridges centred.

use crate::axis::{disarm_all, Bridge};
use crate::control::{ControlTrigger, Core};
use crate::error::AxisError;
use crate::timing::{CountDirection, CycleCounter, UpdateSource};

/// What one update interrupt did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Count-up update: hook ran and the control tick was pended.
    Sampled(u32),
    /// Count-down update: fallback compares written.
    Fallback(u32),
    /// Same direction as the previous update; both axes disarmed.
    Missed,
}

pub struct SamplingTick<'a, A, B, U, T, C, H> {
    core: &'a Core<A, B>,
    source: U,
    trigger: T,
    counter: C,
    fallback: u16,
    hook: H,
}

impl<'a, A, B, U, T, C, H> SamplingTick<'a, A, B, U, T, C, H>
where
    B: Bridge,
    U: UpdateSource,
    T: ControlTrigger,
    C: CycleCounter,
    H: FnMut(),
{
    /// `hook` is called once per modulation period at the count-up update.
    pub fn new(
        core: &'a Core<A, B>,
        source: U,
        trigger: T,
        counter: C,
        fallback: u16,
        hook: H,
    ) -> Self {
        Self {
            core,
            source,
            trigger,
            counter,
            fallback,
            hook,
        }
    }

    pub fn on_interrupt(&mut self) -> Tick {
        self.source.clear_update();

        let dir = CountDirection::from_counting_down(self.source.counting_down());
        if self.core.clock.observe(dir).is_err() {
            disarm_all(&self.core.axes, AxisError::TimerUpdateMissed);
            return Tick::Missed;
        }

        let timestamp = self.core.clock.advance();

        match dir {
            CountDirection::Up => {
                let hook = &mut self.hook;
                self.core.times.sampling.measure(&self.counter, || hook());
                self.trigger.pend();
                Tick::Sampled(timestamp)
            }
            CountDirection::Down => {
                for axis in self.core.axes.iter() {
                    axis.bridge().set_all_compares(self.fallback);
                }
                Tick::Fallback(timestamp)
            }
        }
    }
}
