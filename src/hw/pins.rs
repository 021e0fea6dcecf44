// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pin definitions for the dual-axis STM32F777 board.

use stm32f7xx_hal::{
    gpio::{gpioa, gpiob, gpioc, gpiod, Alternate, Analog, Floating, Input, Output, PushPull},
    pac,
    prelude::*,
};

use crate::bus::DeviceId;
use crate::drivers::FaultLine;
use crate::hw::spi::{ChipSelect, Port};

/// Devices on SPI3, indexed by [`DeviceId`].
pub const DRV_M0: DeviceId = DeviceId(0);
pub const DRV_M1: DeviceId = DeviceId(1);
pub const ENC_M0: DeviceId = DeviceId(2);
pub const ENC_M1: DeviceId = DeviceId(3);

/// Chip selects in [`DeviceId`] order.
pub const SPI3_CS: [ChipSelect; 4] = [
    ChipSelect::new(Port::C, 13),
    ChipSelect::new(Port::C, 14),
    ChipSelect::new(Port::A, 15),
    ChipSelect::new(Port::B, 3),
];

/// All board pins. Construct this once at startup using:
///
/// ```rust
/// let pins = BoardPins::new(dp.GPIOA, dp.GPIOB, dp.GPIOC, dp.GPIOD);
/// ```
pub struct BoardPins {
    pub usart1: Usart1Pins,
    pub spi3: Spi3Pins,
    pub m0: Motor0Pins,
    pub m1: Motor1Pins,
    pub vbus: gpioa::PA6<Analog>,
    pub en_gate: gpiob::PB12<Output<PushPull>>,
    pub nfault: gpiod::PD2<Input<Floating>>,
}

/// USART1 TX/RX
pub struct Usart1Pins {
    pub tx: gpiob::PB6<Alternate<7>>,
    pub rx: gpiob::PB7<Alternate<7>>,
}

/// SPI3 SCK/MISO/MOSI and chip selects
pub struct Spi3Pins {
    pub sck: gpioc::PC10<Alternate<6>>,
    pub miso: gpioc::PC11<Alternate<6>>,
    pub mosi: gpioc::PC12<Alternate<6>>,
    pub cs_drv_m0: gpioc::PC13<Output<PushPull>>,
    pub cs_drv_m1: gpioc::PC14<Output<PushPull>>,
    pub cs_enc_m0: gpioa::PA15<Output<PushPull>>,
    pub cs_enc_m1: gpiob::PB3<Output<PushPull>>,
}

/// Motor 0 bridge (TIM1) and phase current sense
pub struct Motor0Pins {
    pub ah: gpioa::PA8<Alternate<1>>,  // TIM1_CH1
    pub bh: gpioa::PA9<Alternate<1>>,  // TIM1_CH2
    pub ch: gpioa::PA10<Alternate<1>>, // TIM1_CH3
    pub al: gpiob::PB13<Alternate<1>>, // TIM1_CH1N
    pub bl: gpiob::PB14<Alternate<1>>, // TIM1_CH2N
    pub cl: gpiob::PB15<Alternate<1>>, // TIM1_CH3N
    pub so_b: gpioc::PC0<Analog>,      // ADC2_IN10
    pub so_c: gpioc::PC1<Analog>,      // ADC3_IN11
}

/// Motor 1 bridge (TIM8) and phase current sense
pub struct Motor1Pins {
    pub ah: gpioc::PC6<Alternate<3>>, // TIM8_CH1
    pub bh: gpioc::PC7<Alternate<3>>, // TIM8_CH2
    pub ch: gpioc::PC8<Alternate<3>>, // TIM8_CH3
    pub al: gpioa::PA7<Alternate<3>>, // TIM8_CH1N
    pub bl: gpiob::PB0<Alternate<3>>, // TIM8_CH2N
    pub cl: gpiob::PB1<Alternate<3>>, // TIM8_CH3N
    pub so_b: gpioc::PC3<Analog>,     // ADC2_IN13
    pub so_c: gpioc::PC2<Analog>,     // ADC3_IN12
}

impl BoardPins {
    /// Create all named pins from raw GPIO peripherals.
    pub fn new(gpioa: pac::GPIOA, gpiob: pac::GPIOB, gpioc: pac::GPIOC, gpiod: pac::GPIOD) -> Self {
        let gpioa = gpioa.split();
        let gpiob = gpiob.split();
        let gpioc = gpioc.split();
        let gpiod = gpiod.split();

        let spi3 = Spi3Pins {
            sck: gpioc.pc10.into_alternate::<6>(),
            miso: gpioc.pc11.into_alternate::<6>(),
            mosi: gpioc.pc12.into_alternate::<6>(),
            cs_drv_m0: gpioc.pc13.into_push_pull_output(),
            cs_drv_m1: gpioc.pc14.into_push_pull_output(),
            cs_enc_m0: gpioa.pa15.into_push_pull_output(),
            cs_enc_m1: gpiob.pb3.into_push_pull_output(),
        };
        for cs in SPI3_CS {
            cs.deselect();
        }

        // Gate drivers stay in reset until the firmware brings them up
        let mut en_gate = gpiob.pb12.into_push_pull_output();
        en_gate.set_low();

        Self {
            usart1: Usart1Pins {
                tx: gpiob.pb6.into_alternate::<7>(),
                rx: gpiob.pb7.into_alternate::<7>(),
            },

            spi3,

            m0: Motor0Pins {
                ah: gpioa.pa8.into_alternate::<1>(),
                bh: gpioa.pa9.into_alternate::<1>(),
                ch: gpioa.pa10.into_alternate::<1>(),
                al: gpiob.pb13.into_alternate::<1>(),
                bl: gpiob.pb14.into_alternate::<1>(),
                cl: gpiob.pb15.into_alternate::<1>(),
                so_b: gpioc.pc0.into_analog(),
                so_c: gpioc.pc1.into_analog(),
            },

            m1: Motor1Pins {
                ah: gpioc.pc6.into_alternate::<3>(),
                bh: gpioc.pc7.into_alternate::<3>(),
                ch: gpioc.pc8.into_alternate::<3>(),
                al: gpioa.pa7.into_alternate::<3>(),
                bl: gpiob.pb0.into_alternate::<3>(),
                cl: gpiob.pb1.into_alternate::<3>(),
                so_b: gpioc.pc3.into_analog(),
                so_c: gpioc.pc2.into_analog(),
            },

            vbus: gpioa.pa6.into_analog(),
            en_gate,
            nfault: gpiod.pd2.into_floating_input(),
        }
    }
}

/// Shared active-low nFAULT line of both gate drivers (PD2).
#[derive(Copy, Clone, Debug)]
pub struct NFault;

impl FaultLine for NFault {
    #[inline]
    fn is_faulted(&self) -> bool {
        let gpiod = unsafe { &*pac::GPIOD::ptr() };
        gpiod.idr.read().bits() & (1 << 2) == 0
    }
}
