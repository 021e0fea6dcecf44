// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! SPI3 as an interrupt-driven [`SpiPort`] with 16-bit frames.
//!
//! - `ChipSelect` is an active-low line addressed by port and pin number, so the whole port can
//!   be built in a `const` context and live inside the bus `static`.
//! - `Spi3Port` shifts one transfer at a time; the SPI3 interrupt advances it frame by frame.

use core::ptr;

use stm32f7xx_hal::pac;

use crate::bus::{DeviceId, SpiPort, MAX_FRAMES};

// CR1
const CR1_CPHA: u32 = 1 << 0;
const CR1_MSTR: u32 = 1 << 2;
/// fPCLK / 32
const CR1_BR_DIV32: u32 = 0b100 << 3;
const CR1_SPE: u32 = 1 << 6;
const CR1_SSI: u32 = 1 << 8;
const CR1_SSM: u32 = 1 << 9;
// CR2
const CR2_RXNEIE: u32 = 1 << 6;
const CR2_DS_16BIT: u32 = 0b1111 << 8;
// SR
const SR_RXNE: u32 = 1 << 0;

/// The 32-bit RX FIFO holds at most two 16-bit frames.
const RX_FIFO_FRAMES: usize = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Port {
    A,
    B,
    C,
}

/// Manual chip-select line, active-low.
#[derive(Copy, Clone, Debug)]
pub struct ChipSelect {
    port: Port,
    pin: u8,
}

impl ChipSelect {
    pub const fn new(port: Port, pin: u8) -> Self {
        Self { port, pin }
    }

    fn write_bsrr(&self, bits: u32) {
        // SAFETY: BSRR writes are atomic and only touch the addressed pin
        unsafe {
            match self.port {
                Port::A => (*pac::GPIOA::ptr()).bsrr.write(|w| w.bits(bits)),
                Port::B => (*pac::GPIOB::ptr()).bsrr.write(|w| w.bits(bits)),
                Port::C => (*pac::GPIOC::ptr()).bsrr.write(|w| w.bits(bits)),
            }
        }
    }

    /// Assert the chip select.
    #[inline]
    pub fn select(&self) {
        self.write_bsrr(1 << (self.pin + 16));
    }

    /// Deassert the chip select.
    #[inline]
    pub fn deselect(&self) {
        self.write_bsrr(1 << self.pin);
    }
}

#[inline]
fn spi3() -> &'static pac::spi1::RegisterBlock {
    unsafe { &*pac::SPI3::ptr() }
}

/// 16-bit access to DR; a 32-bit write would queue two frames.
#[inline]
fn write_dr(word: u16) {
    let dr = &spi3().dr as *const _ as *mut u16;
    unsafe { ptr::write_volatile(dr, word) }
}

#[inline]
fn read_dr() -> u16 {
    let dr = &spi3().dr as *const _ as *const u16;
    unsafe { ptr::read_volatile(dr) }
}

/// Mode 1 (CPOL = 0, CPHA = 1) master, as required by both the DRV8301 and the AS5047.
pub fn init(_spi3: pac::SPI3) {
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb1enr.modify(|_, w| w.spi3en().set_bit());

    let spi = spi3();
    spi.cr1.write(|w| unsafe { w.bits(0) });
    spi.cr2.write(|w| unsafe { w.bits(CR2_DS_16BIT) });
    spi.cr1.write(|w| unsafe {
        w.bits(CR1_CPHA | CR1_MSTR | CR1_BR_DIV32 | CR1_SSI | CR1_SSM | CR1_SPE)
    });
}

pub struct Spi3Port<const D: usize> {
    cs: [ChipSelect; D],
    tx: [u16; MAX_FRAMES],
    rx: [u16; MAX_FRAMES],
    len: usize,
    sent: usize,
    received: usize,
}

impl<const D: usize> Spi3Port<D> {
    /// `cs[i]` is the chip select of `DeviceId(i)`.
    pub const fn new(cs: [ChipSelect; D]) -> Self {
        Self {
            cs,
            tx: [0; MAX_FRAMES],
            rx: [0; MAX_FRAMES],
            len: 0,
            sent: 0,
            received: 0,
        }
    }

    fn chip_select(&self, device: DeviceId) -> Option<&ChipSelect> {
        self.cs.get(device.0 as usize)
    }

    fn stop(&mut self, device: DeviceId) {
        spi3()
            .cr2
            .modify(|r, w| unsafe { w.bits(r.bits() & !CR2_RXNEIE) });
        if let Some(cs) = self.chip_select(device) {
            cs.deselect();
        }
        self.len = 0;
    }
}

impl<const D: usize> SpiPort for Spi3Port<D> {
    fn begin(&mut self, device: DeviceId, tx: &[u16]) {
        let len = tx.len().min(MAX_FRAMES);
        self.tx[..len].copy_from_slice(&tx[..len]);
        self.len = len;
        self.sent = 0;
        self.received = 0;
        if len == 0 {
            return;
        }

        // Discard anything left in the receive FIFO
        for _ in 0..RX_FIFO_FRAMES {
            if spi3().sr.read().bits() & SR_RXNE == 0 {
                break;
            }
            let _ = read_dr();
        }

        match self.chip_select(device) {
            Some(cs) => cs.select(),
            None => log::warn!("spi3: no chip select for {:?}", device),
        }
        spi3()
            .cr2
            .modify(|r, w| unsafe { w.bits(r.bits() | CR2_RXNEIE) });
        write_dr(self.tx[0]);
        self.sent = 1;
    }

    fn service(&mut self) -> bool {
        if self.len == 0 || spi3().sr.read().bits() & SR_RXNE == 0 {
            return false;
        }
        self.rx[self.received] = read_dr();
        self.received += 1;
        if self.sent < self.len {
            write_dr(self.tx[self.sent]);
            self.sent += 1;
        }
        self.received == self.len
    }

    fn finish(&mut self, device: DeviceId, rx: &mut [u16]) {
        let n = rx.len().min(self.received);
        rx[..n].copy_from_slice(&self.rx[..n]);
        self.stop(device);
    }

    fn abort(&mut self, device: DeviceId) {
        self.stop(device);
    }
}
