// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! DRV8301 three-phase gate driver on the shared SPI bus.
//!
//! Frames are 16 bits: B15 = R/W (1 = read), B14..B11 = address, B10..B0 = data. The device
//! answers a command during the *next* frame, so every read sequence ends with one extra frame
//! that only clocks out the last response.
//!
//! Configuration is asynchronous: [`Drv8301::config`] queues the whole write/read-back sequence
//! and the driver verifies the read-back in its bus completion handler. The gate driver reports
//! ready once the read-back matched and nFAULT is not asserted.

use core::fmt;
use core::sync::atomic::{AtomicU16, AtomicU8, Ordering};

use crate::bus::{BusError, Completion, DeviceId, SharedArbiter, SpiPort, Transfer, TransferListener};
use crate::control::GateDriver;

// Register addresses
pub mod reg {
    pub const STATUS1: u8 = 0x00;
    pub const STATUS2: u8 = 0x01;
    pub const CTRL1: u8 = 0x02;
    pub const CTRL2: u8 = 0x03;
}

/// Selectable shunt amplifier gains in V/V.
pub const GAINS: [f32; 4] = [10.0, 20.0, 40.0, 80.0];

/// Active-low fault output of the gate driver.
pub trait FaultLine {
    fn is_faulted(&self) -> bool;
}

/// Status Register 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status1 {
    raw: u16,
}

impl Status1 {
    #[inline]
    pub fn raw(&self) -> u16 {
        self.raw
    }

    /// Any fault latched.
    #[inline]
    pub fn fault(&self) -> bool {
        (self.raw & (1 << 10)) != 0
    }

    /// GVDD undervoltage.
    #[inline]
    pub fn gvdd_uv(&self) -> bool {
        (self.raw & (1 << 9)) != 0
    }

    /// PVDD undervoltage.
    #[inline]
    pub fn pvdd_uv(&self) -> bool {
        (self.raw & (1 << 8)) != 0
    }

    /// Overtemperature shutdown.
    #[inline]
    pub fn otsd(&self) -> bool {
        (self.raw & (1 << 7)) != 0
    }

    /// Overtemperature warning.
    #[inline]
    pub fn otw(&self) -> bool {
        (self.raw & (1 << 6)) != 0
    }

    /// Overcurrent on any of the six FETs, as a mask (bit 5 = phase A high side, bit 0 = phase C
    /// low side).
    #[inline]
    pub fn fet_oc(&self) -> u8 {
        (self.raw & 0x3F) as u8
    }
}

/// Status Register 2.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status2 {
    raw: u16,
}

impl Status2 {
    #[inline]
    pub fn raw(&self) -> u16 {
        self.raw
    }

    /// GVDD overvoltage.
    #[inline]
    pub fn gvdd_ov(&self) -> bool {
        (self.raw & (1 << 7)) != 0
    }

    #[inline]
    pub fn device_id(&self) -> u8 {
        (self.raw & 0x0F) as u8
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Bus(BusError),
    /// `config` has not completed successfully.
    NotConfigured,
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Error::Bus(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus: {}", e),
            Error::NotConfigured => f.write_str("gate driver not configured"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Configuring,
    Ready,
    /// Read-back did not match what was written.
    Failed,
}

impl State {
    const fn encode(self) -> u8 {
        match self {
            State::Unconfigured => 0,
            State::Configuring => 1,
            State::Ready => 2,
            State::Failed => 3,
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            1 => State::Configuring,
            2 => State::Ready,
            3 => State::Failed,
            _ => State::Unconfigured,
        }
    }
}

/// Pick the largest available gain not above `requested`, or the smallest gain.
///
/// Returns `(setting, gain)`.
pub fn select_gain(requested: f32) -> (u8, f32) {
    let mut setting = GAINS.len() - 1;
    while setting > 0 && GAINS[setting] > requested {
        setting -= 1;
    }
    (setting as u8, GAINS[setting])
}

/// Control Register 1: OC_ADJ_SET = 21, latched overcurrent shutdown, 6-PWM mode, 1.7 A gate
/// drive.
pub const fn ctrl1_value() -> u16 {
    (21 << 6) | (0b01 << 4)
}

/// Control Register 2: cycle-by-cycle OC off time, no calibration, amplifier gain.
pub const fn ctrl2_value(gain_setting: u8) -> u16 {
    (gain_setting as u16 & 0b11) << 2
}

#[inline]
fn build_word(is_read: bool, addr: u8, data: u16) -> u16 {
    let mut word: u16 = 0;

    // B15 = R/W
    if is_read {
        word |= 1 << 15;
    }

    // B14..B11 = A3..A0
    word |= ((addr as u16) & 0x0F) << 11;

    // B10..B0 = data
    word |= data & 0x07FF;

    word
}

#[inline]
fn response_data(word: u16) -> u16 {
    word & 0x07FF
}

// Transfer tags. A tag names the frame that carries the response, not the command.
const TAG_W_CTRL1: u16 = 0;
const TAG_W_CTRL2: u16 = 1;
const TAG_R_CTRL1: u16 = 2;
const TAG_CTRL1: u16 = 3;
const TAG_CTRL2: u16 = 4;
const TAG_STATUS1: u16 = 5;
const TAG_STATUS2: u16 = 6;
const TAG_POLL: u16 = 0x100;
const TAG_POLL_STATUS1: u16 = 0x101;

pub struct Drv8301<F> {
    device: DeviceId,
    nfault: F,
    state: AtomicU8,
    gain_setting: AtomicU8,
    ctrl1: AtomicU16,
    ctrl2: AtomicU16,
    status1: AtomicU16,
    status2: AtomicU16,
}

impl<F: FaultLine> Drv8301<F> {
    pub const fn new(device: DeviceId, nfault: F) -> Self {
        Self {
            device,
            nfault,
            state: AtomicU8::new(0),
            gain_setting: AtomicU8::new(0),
            ctrl1: AtomicU16::new(0),
            ctrl2: AtomicU16::new(0),
            status1: AtomicU16::new(0),
            status2: AtomicU16::new(0),
        }
    }

    pub fn state(&self) -> State {
        State::decode(self.state.load(Ordering::Acquire))
    }

    /// Gain programmed by the last `config`.
    pub fn gain(&self) -> f32 {
        GAINS[self.gain_setting.load(Ordering::Relaxed) as usize & 0b11]
    }

    pub fn status1(&self) -> Status1 {
        Status1 {
            raw: self.status1.load(Ordering::Relaxed),
        }
    }

    pub fn status2(&self) -> Status2 {
        Status2 {
            raw: self.status2.load(Ordering::Relaxed),
        }
    }

    fn finish_config(&self) {
        let setting = self.gain_setting.load(Ordering::Relaxed);
        let ok = self.ctrl1.load(Ordering::Relaxed) == ctrl1_value()
            && self.ctrl2.load(Ordering::Relaxed) == ctrl2_value(setting);
        let state = if ok { State::Ready } else { State::Failed };
        self.state.store(state.encode(), Ordering::Release);
        if !ok {
            log::warn!(
                "drv8301 {:?}: readback mismatch ctrl1={:#05x} ctrl2={:#05x}",
                self.device,
                self.ctrl1.load(Ordering::Relaxed),
                self.ctrl2.load(Ordering::Relaxed)
            );
            return;
        }
        log::info!("drv8301 {:?}: ready, gain {}", self.device, GAINS[setting as usize & 0b11]);
        if self.status2().gvdd_ov() {
            log::warn!("drv8301 {:?}: GVDD overvoltage", self.device);
        }
    }
}

impl<F: FaultLine + Sync + 'static> Drv8301<F> {
    /// Queue the configuration sequence for `requested_gain` and return the gain that will be
    /// applied. Readiness follows once the bus has drained.
    pub fn config<P: SpiPort, const N: usize>(
        &'static self,
        bus: &SharedArbiter<P, N>,
        requested_gain: f32,
    ) -> Result<f32, Error> {
        let (setting, gain) = select_gain(requested_gain);
        self.gain_setting.store(setting, Ordering::Relaxed);
        self.state.store(State::Configuring.encode(), Ordering::Release);

        let frames = [
            (TAG_W_CTRL1, build_word(false, reg::CTRL1, ctrl1_value())),
            (TAG_W_CTRL2, build_word(false, reg::CTRL2, ctrl2_value(setting))),
            (TAG_R_CTRL1, build_word(true, reg::CTRL1, 0)),
            (TAG_CTRL1, build_word(true, reg::CTRL2, 0)),
            (TAG_CTRL2, build_word(true, reg::STATUS1, 0)),
            (TAG_STATUS1, build_word(true, reg::STATUS2, 0)),
            (TAG_STATUS2, build_word(true, reg::STATUS2, 0)),
        ];
        for (tag, word) in frames {
            if let Err(e) = self.submit(bus, tag, word) {
                self.state.store(State::Failed.encode(), Ordering::Release);
                log::warn!("drv8301 {:?}: config not queued: {}", self.device, e);
                return Err(e.into());
            }
        }
        Ok(gain)
    }

    /// Queue a read of Status Register 1. Result lands in [`status1`](Self::status1).
    pub fn poll_status<P: SpiPort, const N: usize>(
        &'static self,
        bus: &SharedArbiter<P, N>,
    ) -> Result<(), Error> {
        if self.state() != State::Ready {
            return Err(Error::NotConfigured);
        }
        self.submit(bus, TAG_POLL, build_word(true, reg::STATUS1, 0))?;
        self.submit(bus, TAG_POLL_STATUS1, build_word(true, reg::STATUS1, 0))?;
        Ok(())
    }

    fn submit<P: SpiPort, const N: usize>(
        &'static self,
        bus: &SharedArbiter<P, N>,
        tag: u16,
        word: u16,
    ) -> Result<(), BusError> {
        bus.submit(
            Transfer::new(self.device, &[word])?
                .with_tag(tag)
                .with_listener(self),
        )
    }
}

impl<F: FaultLine + Sync> TransferListener for Drv8301<F> {
    fn transfer_done(&self, done: &Completion) {
        let Some(&word) = done.rx().first() else {
            return;
        };
        let data = response_data(word);
        match done.tag {
            TAG_CTRL1 => self.ctrl1.store(data, Ordering::Relaxed),
            TAG_CTRL2 => self.ctrl2.store(data, Ordering::Relaxed),
            TAG_STATUS1 | TAG_POLL_STATUS1 => self.status1.store(data, Ordering::Relaxed),
            TAG_STATUS2 => {
                self.status2.store(data, Ordering::Relaxed);
                self.finish_config();
            }
            _ => {}
        }
    }
}

impl<F: FaultLine> GateDriver for Drv8301<F> {
    fn is_ready(&self) -> bool {
        self.state() == State::Ready && !self.nfault.is_faulted()
    }
}
