// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Carrier timers and timebase.
//!
//! TIM1 (M0) and TIM8 (M1) run center-aligned with complementary outputs on channels 1-3 and emit
//! TRGO on update to trigger the converters. TIM13 counts up on the APB1 clock (half the carrier
//! clock) and reloads once per modulation period.

use cortex_m::peripheral::{DWT, NVIC};
use stm32f7xx_hal::pac;

use crate::axis::Bridge;
use crate::config::PwmTiming;
use crate::control::ControlTrigger;
use crate::timing::{CycleCounter, SyncTimer, UpdateSource};

// CR1
const CR1_CMS_CENTER3: u32 = 0b11 << 5;
const CR1_ARPE: u32 = 1 << 7;
// CR2: TRGO on update
const CR2_MMS_UPDATE: u32 = 0b010 << 4;
// CCMRx: PWM mode 2 with preload, for the low and high channel of the register
const CCMR_PWM2_PRELOAD: u32 = (0b111 << 4) | (1 << 3) | (0b111 << 12) | (1 << 11);
// CCER: CCxE | CCxNE for channels 1-3
const CCER_CH123: u32 = 0b0101_0101_0101;
// BDTR
const BDTR_OSSR: u32 = 1 << 11;
const BDTR_OSSI: u32 = 1 << 10;
const DEAD_TIME: u32 = 20;
const SR_UIF: u32 = 1 << 0;
const EGR_UG: u32 = 1 << 0;

/// One of the two advanced-control carrier timers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MotorTimer {
    Tim1,
    Tim8,
}

impl MotorTimer {
    #[inline]
    fn regs(self) -> &'static pac::tim1::RegisterBlock {
        // SAFETY: fixed MMIO addresses; `init` took ownership of the peripherals.
        unsafe {
            match self {
                MotorTimer::Tim1 => &*pac::TIM1::ptr(),
                MotorTimer::Tim8 => &*pac::TIM8::ptr(),
            }
        }
    }

    fn configure(self, timing: &PwmTiming) {
        let tim = self.regs();

        tim.cr1.write(|w| unsafe { w.bits(CR1_CMS_CENTER3 | CR1_ARPE) });
        tim.cr2.write(|w| unsafe { w.bits(CR2_MMS_UPDATE) });
        tim.psc.write(|w| unsafe { w.bits(0) });
        tim.arr.write(|w| unsafe { w.bits(timing.period_clocks) });
        tim.rcr.write(|w| unsafe { w.bits(timing.repetition) });

        tim.ccmr1_output()
            .write(|w| unsafe { w.bits(CCMR_PWM2_PRELOAD) });
        tim.ccmr2_output()
            .write(|w| unsafe { w.bits(CCMR_PWM2_PRELOAD) });
        self.set_all_compares(timing.fallback_compare());
        tim.ccer.write(|w| unsafe { w.bits(CCER_CH123) });

        // Outputs stay off until the axis is armed
        tim.bdtr
            .write(|w| unsafe { w.bits(BDTR_OSSR | BDTR_OSSI | DEAD_TIME) });

        // Load the preloaded registers
        tim.egr.write(|w| unsafe { w.bits(EGR_UG) });
        tim.sr.write(|w| unsafe { w.bits(!SR_UIF) });
    }
}

impl Bridge for MotorTimer {
    #[inline]
    fn is_switching(&self) -> bool {
        self.regs().bdtr.read().moe().bit_is_set()
    }

    #[inline]
    fn force_safe(&self) {
        self.regs().bdtr.modify(|_, w| w.moe().clear_bit());
    }

    fn enable(&self) {
        self.regs().bdtr.modify(|_, w| w.moe().set_bit());
    }

    #[inline]
    fn set_all_compares(&self, compare: u16) {
        self.set_compares([compare; 3]);
    }

    fn set_compares(&self, compares: [u16; 3]) {
        let tim = self.regs();
        tim.ccr1.write(|w| unsafe { w.bits(compares[0] as u32) });
        tim.ccr2.write(|w| unsafe { w.bits(compares[1] as u32) });
        tim.ccr3.write(|w| unsafe { w.bits(compares[2] as u32) });
    }
}

impl SyncTimer for MotorTimer {
    fn halt(&self) {
        self.regs().cr1.modify(|_, w| w.cen().clear_bit());
    }

    fn set_count(&self, count: u32) {
        self.regs().cnt.write(|w| unsafe { w.bits(count) });
    }

    fn period(&self) -> u32 {
        self.regs().arr.read().bits()
    }

    fn resume(&self) {
        self.regs().cr1.modify(|_, w| w.cen().set_bit());
    }
}

impl UpdateSource for MotorTimer {
    #[inline]
    fn clear_update(&self) {
        // rc_w0
        self.regs().sr.write(|w| unsafe { w.bits(!SR_UIF) });
    }

    fn listen_update(&self) {
        self.regs().dier.modify(|_, w| w.uie().set_bit());
    }

    #[inline]
    fn counting_down(&self) -> bool {
        self.regs().cr1.read().dir().bit_is_set()
    }
}

/// TIM13, reloading once per modulation period.
#[derive(Copy, Clone, Debug)]
pub struct AuxTimer;

impl AuxTimer {
    fn configure(timing: &PwmTiming) {
        let tim = unsafe { &*pac::TIM13::ptr() };
        tim.cr1.write(|w| unsafe { w.bits(CR1_ARPE) });
        tim.psc.write(|w| unsafe { w.bits(0) });
        tim.arr
            .write(|w| unsafe { w.bits(timing.cycle_increment() - 1) });
        tim.egr.write(|w| unsafe { w.bits(EGR_UG) });
    }
}

impl SyncTimer for AuxTimer {
    fn halt(&self) {
        let tim = unsafe { &*pac::TIM13::ptr() };
        tim.cr1.modify(|_, w| w.cen().clear_bit());
    }

    fn set_count(&self, count: u32) {
        let tim = unsafe { &*pac::TIM13::ptr() };
        tim.cnt.write(|w| unsafe { w.bits(count) });
    }

    fn period(&self) -> u32 {
        let tim = unsafe { &*pac::TIM13::ptr() };
        tim.arr.read().bits()
    }

    fn resume(&self) {
        let tim = unsafe { &*pac::TIM13::ptr() };
        tim.cr1.modify(|_, w| w.cen().set_bit());
    }
}

/// Enable clocks and configure TIM1, TIM8 and TIM13. Counters stay halted.
pub fn init(
    _tim1: pac::TIM1,
    _tim8: pac::TIM8,
    _tim13: pac::TIM13,
    timing: &PwmTiming,
) -> (MotorTimer, MotorTimer, AuxTimer) {
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb2enr
        .modify(|_, w| w.tim1en().set_bit().tim8en().set_bit());
    rcc.apb1enr.modify(|_, w| w.tim13en().set_bit());

    // Halting the core in a debugger must not leave the bridges switching
    let dbg = unsafe { &*pac::DBGMCU::ptr() };
    dbg.apb2_fz
        .modify(|r, w| unsafe { w.bits(r.bits() | 0b11) });
    dbg.apb1_fz
        .modify(|r, w| unsafe { w.bits(r.bits() | (1 << 7)) });

    MotorTimer::Tim1.configure(timing);
    MotorTimer::Tim8.configure(timing);
    AuxTimer::configure(timing);

    (MotorTimer::Tim1, MotorTimer::Tim8, AuxTimer)
}

/// DWT cycle counter. Must be enabled with `DWT::enable_cycle_counter` at start-up.
#[derive(Copy, Clone, Debug)]
pub struct DwtCounter;

impl CycleCounter for DwtCounter {
    #[inline]
    fn now(&self) -> u32 {
        DWT::cycle_count()
    }
}

/// Pends the otherwise unused OTG_HS vector to run the control tick.
#[derive(Copy, Clone, Debug)]
pub struct SoftIrq;

impl SoftIrq {
    pub const INTERRUPT: pac::Interrupt = pac::Interrupt::OTG_HS;
}

impl ControlTrigger for SoftIrq {
    #[inline]
    fn pend(&self) {
        NVIC::pend(Self::INTERRUPT);
    }
}
