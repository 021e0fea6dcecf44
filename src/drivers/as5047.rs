// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! AS5047 14-bit absolute magnetic encoder on the shared SPI bus.
//!
//! The sampling hook calls [`As5047::request`] once per modulation period. Each request reads
//! ANGLECOM with the `0xFFFF` command; since the reply to a command arrives one frame later,
//! every response carries the angle latched by the previous request. Response frames are
//! B15 = even parity, B14 = error flag, B13..B0 = angle.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use crate::bus::{BusError, Completion, DeviceId, SharedArbiter, SpiPort, Transfer, TransferListener};

/// Read ANGLECOM (0x3FFF) with the read bit and parity set.
const READ_ANGLE: u16 = 0xFFFF;

/// Counts per mechanical revolution.
pub const CPR: u16 = 1 << 14;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    Parity,
    /// The device flagged an error on the previous command.
    ErrorFlag,
}

/// Check parity and the error flag; returns the 14-bit payload.
pub fn decode(word: u16) -> Result<u16, FrameError> {
    if word.count_ones() % 2 != 0 {
        return Err(FrameError::Parity);
    }
    if word & (1 << 14) != 0 {
        return Err(FrameError::ErrorFlag);
    }
    Ok(word & 0x3FFF)
}

pub struct As5047 {
    device: DeviceId,
    angle: AtomicU16,
    valid: AtomicBool,
    in_flight: AtomicBool,
    frame_errors: AtomicU32,
    skipped: AtomicU32,
}

impl As5047 {
    pub const fn new(device: DeviceId) -> Self {
        Self {
            device,
            angle: AtomicU16::new(0),
            valid: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            frame_errors: AtomicU32::new(0),
            skipped: AtomicU32::new(0),
        }
    }

    /// Queue an angle read unless the previous one is still outstanding.
    ///
    /// Returns `Ok(false)` when skipped.
    pub fn request<P: SpiPort, const N: usize>(
        &'static self,
        bus: &SharedArbiter<P, N>,
    ) -> Result<bool, BusError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        let transfer = Transfer::new(self.device, &[READ_ANGLE])?.with_listener(self);
        if let Err(e) = bus.submit(transfer) {
            self.in_flight.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(true)
    }

    /// Latest valid raw angle in counts.
    pub fn angle(&self) -> Option<u16> {
        self.valid
            .load(Ordering::Acquire)
            .then(|| self.angle.load(Ordering::Relaxed))
    }

    /// Latest valid angle as a fraction of a revolution in `[0, 1)`.
    pub fn turns(&self) -> Option<f32> {
        self.angle().map(|a| a as f32 / CPR as f32)
    }

    pub fn frame_errors(&self) -> u32 {
        self.frame_errors.load(Ordering::Relaxed)
    }

    /// Requests dropped because the previous one had not completed.
    pub fn skipped(&self) -> u32 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl TransferListener for As5047 {
    fn transfer_done(&self, done: &Completion) {
        self.in_flight.store(false, Ordering::Release);
        let Some(&word) = done.rx().first() else {
            return;
        };
        match decode(word) {
            Ok(angle) => {
                self.angle.store(angle, Ordering::Relaxed);
                self.valid.store(true, Ordering::Release);
            }
            Err(_) => {
                self.valid.store(false, Ordering::Release);
                self.frame_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn transfer_abandoned(&self, _device: DeviceId, _tag: u16) {
        self.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSpi;
    use std::boxed::Box;

    /// Build a response frame with correct parity.
    fn frame(angle: u16, error: bool) -> u16 {
        let mut w = angle & 0x3FFF;
        if error {
            w |= 1 << 14;
        }
        if w.count_ones() % 2 != 0 {
            w |= 1 << 15;
        }
        w
    }

    #[test]
    fn decode_checks_parity_and_flag() {
        assert_eq!(decode(frame(0x1234, false)), Ok(0x1234));
        assert_eq!(decode(frame(0x1234, false) ^ 1), Err(FrameError::Parity));
        assert_eq!(decode(frame(7, true)), Err(FrameError::ErrorFlag));
    }

    #[test]
    fn request_updates_angle_once_per_completion() {
        let spi = FakeSpi::new();
        let bus: SharedArbiter<&FakeSpi, 4> = SharedArbiter::new(&spi);
        let enc: &'static As5047 = Box::leak(Box::new(As5047::new(DeviceId(2))));
        spi.reply(frame(4096, false));

        assert_eq!(enc.angle(), None);
        assert_eq!(enc.request(&bus), Ok(true));
        // still outstanding
        assert_eq!(enc.request(&bus), Ok(false));
        assert_eq!(enc.skipped(), 1);

        assert!(bus.on_interrupt());
        assert_eq!(enc.angle(), Some(4096));
        assert_eq!(enc.turns(), Some(0.25));
        assert!(bus.is_idle());
    }

    #[test]
    fn abandoned_request_allows_the_next_one() {
        let spi = FakeSpi::new();
        let bus: SharedArbiter<&FakeSpi, 4> = SharedArbiter::new(&spi);
        let enc: &'static As5047 = Box::leak(Box::new(As5047::new(DeviceId(3))));

        assert_eq!(enc.request(&bus), Ok(true));
        assert!(bus.abandon_current().is_some());
        assert!(bus.is_idle());
        assert_eq!(enc.angle(), None);

        spi.reply(frame(321, false));
        assert_eq!(enc.request(&bus), Ok(true));
        assert_eq!(enc.skipped(), 0);
        assert!(bus.on_interrupt());
        assert_eq!(enc.angle(), Some(321));
    }

    #[test]
    fn bad_frame_invalidates_angle() {
        let spi = FakeSpi::new();
        let bus: SharedArbiter<&FakeSpi, 4> = SharedArbiter::new(&spi);
        let enc: &'static As5047 = Box::leak(Box::new(As5047::new(DeviceId(2))));
        spi.reply(frame(100, false));
        spi.reply(frame(200, true));

        enc.request(&bus).unwrap();
        bus.on_interrupt();
        assert_eq!(enc.angle(), Some(100));

        enc.request(&bus).unwrap();
        bus.on_interrupt();
        assert_eq!(enc.angle(), None);
        assert_eq!(enc.frame_errors(), 1);
    }
}
