// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! ADC1/ADC2/ADC3 set up for timer-triggered phase current sampling.
//!
//! - ADC1 converts the bus voltage on its injected channel, triggered by TIM1 TRGO.
//! - ADC2/ADC3 convert phases B/C: injected channel for M0 (TIM1 TRGO), regular channel for M1
//!   (TIM8 TRGO).
//!
//! Conversions are never interrupt driven. The control tick polls the status flags through the
//! [`Converter`] impl on [`HwAdc`].

use stm32f7xx_hal::pac;

use crate::sampling::{AdcFlags, Converter};

// CR2 trigger fields
const CR2_ADON: u32 = 1 << 0;
const CR2_EOCS: u32 = 1 << 10;
const CR2_JEXTSEL_SHIFT: u32 = 16;
const CR2_JEXTEN_MASK: u32 = 0b11 << 20;
const CR2_JEXTEN_RISING: u32 = 0b01 << 20;
const CR2_EXTSEL_SHIFT: u32 = 24;
const CR2_EXTEN_MASK: u32 = 0b11 << 28;
const CR2_EXTEN_RISING: u32 = 0b01 << 28;

const JEXTSEL_TIM1_TRGO: u32 = 0b0000;
const EXTSEL_TIM8_TRGO: u32 = 0b1110;

/// 15 ADC clock cycles
const SAMPLE_TIME: u32 = 0b001;

// Analog inputs, see `hw::pins`
const CH_VBUS: u8 = 6; // PA6
const CH_M0_B: u8 = 10; // PC0
const CH_M0_C: u8 = 11; // PC1
const CH_M1_B: u8 = 13; // PC3
const CH_M1_C: u8 = 12; // PC2

/// Handle to one converter. Registers are looked up on use so the handle can live in a `static`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HwAdc {
    Adc1,
    Adc2,
    Adc3,
}

impl HwAdc {
    pub const ALL: [HwAdc; 3] = [HwAdc::Adc1, HwAdc::Adc2, HwAdc::Adc3];

    #[inline]
    fn regs(self) -> &'static pac::adc1::RegisterBlock {
        // SAFETY: fixed MMIO addresses; `init` took ownership of the peripherals.
        unsafe {
            match self {
                HwAdc::Adc1 => &*pac::ADC1::ptr(),
                HwAdc::Adc2 => &*pac::ADC2::ptr(),
                HwAdc::Adc3 => &*pac::ADC3::ptr(),
            }
        }
    }

    /// `(injected channel, regular channel)`
    const fn channels(self) -> (u8, Option<u8>) {
        match self {
            HwAdc::Adc1 => (CH_VBUS, None),
            HwAdc::Adc2 => (CH_M0_B, Some(CH_M1_B)),
            HwAdc::Adc3 => (CH_M0_C, Some(CH_M1_C)),
        }
    }

    /// Trigger-enable bits for this converter's configured sequences.
    const fn trigger_bits(self) -> u32 {
        match self.channels() {
            (_, None) => CR2_JEXTEN_RISING,
            (_, Some(_)) => CR2_JEXTEN_RISING | CR2_EXTEN_RISING,
        }
    }

    fn configure(self) {
        let adc = self.regs();
        let (injected, regular) = self.channels();

        // Power off to configure
        adc.cr2.write(|w| unsafe { w.bits(0) });
        // 12-bit, no scan
        adc.cr1.write(|w| unsafe { w.bits(0) });

        set_sample_time(adc, injected);
        // JL = 0: the single injected conversion is taken from JSQ4
        adc.jsqr
            .write(|w| unsafe { w.bits(((injected & 0x1F) as u32) << 15) });

        if let Some(ch) = regular {
            set_sample_time(adc, ch);
            adc.sqr1.write(|w| unsafe { w.bits(0) });
            adc.sqr3.write(|w| unsafe { w.bits((ch & 0x1F) as u32) });
        }

        // Triggers are selected here but stay disabled until `start_timers`
        adc.cr2.write(|w| unsafe {
            w.bits(
                CR2_ADON
                    | CR2_EOCS
                    | (JEXTSEL_TIM1_TRGO << CR2_JEXTSEL_SHIFT)
                    | (EXTSEL_TIM8_TRGO << CR2_EXTSEL_SHIFT),
            )
        });
    }
}

fn set_sample_time(adc: &pac::adc1::RegisterBlock, channel: u8) {
    let ch = channel as u32;
    if ch < 10 {
        adc.smpr2.modify(|r, w| unsafe {
            w.bits((r.bits() & !(0b111 << (3 * ch))) | (SAMPLE_TIME << (3 * ch)))
        });
    } else {
        let ch = ch - 10;
        adc.smpr1.modify(|r, w| unsafe {
            w.bits((r.bits() & !(0b111 << (3 * ch))) | (SAMPLE_TIME << (3 * ch)))
        });
    }
}

/// Enable clocks and configure all three converters. Triggers start disabled.
pub fn init(_adc1: pac::ADC1, _adc2: pac::ADC2, _adc3: pac::ADC3) -> [HwAdc; 3] {
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb2enr
        .modify(|_, w| w.adc1en().set_bit().adc2en().set_bit().adc3en().set_bit());

    let common = unsafe { &*pac::ADC_COMMON::ptr() };
    // ADC prescaler: PCLK2 / 4
    common.ccr.modify(|_, w| w.adcpre().div4());

    for adc in HwAdc::ALL {
        adc.configure();
    }
    HwAdc::ALL
}

impl Converter for HwAdc {
    #[inline]
    fn flags(&self) -> AdcFlags {
        AdcFlags::from_bits(self.regs().sr.read().bits() as u8)
    }

    #[inline]
    fn clear(&self, flags: AdcFlags) {
        // SR bits are rc_w0: writing ones leaves the other flags untouched
        self.regs()
            .sr
            .write(|w| unsafe { w.bits(!(flags.bits() as u32)) });
    }

    #[inline]
    fn regular(&self) -> u16 {
        self.regs().dr.read().bits() as u16
    }

    #[inline]
    fn injected(&self) -> u16 {
        self.regs().jdr1.read().bits() as u16
    }

    fn set_external_triggers(&self, enabled: bool) {
        let bits = if enabled { self.trigger_bits() } else { 0 };
        self.regs().cr2.modify(|r, w| unsafe {
            w.bits((r.bits() & !(CR2_EXTEN_MASK | CR2_JEXTEN_MASK)) | bits)
        });
    }
}
