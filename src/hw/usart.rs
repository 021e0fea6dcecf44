// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! USART debug terminal and the `log` sink behind it.
//!
//! Interrupt handlers must never wait on the UART, so [`UsartLogger`] only formats records into a
//! bounded byte queue. Thread mode calls [`UsartLogger::drain`] to push the queued bytes out with
//! blocking writes.
//!
//! To access the terminal on the host machine, connect to the debug USB port and use
//! ```
//! $ screen /dev/tty.usbmodem* <baud_rate>
//! ```
//!
//! To close the debug terminal, press `Ctrl+A` then `Ctrl+\` then `y`.

use core::cell::RefCell;
use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use heapless::{Deque, String};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use nb::block;

use stm32f7xx_hal::{
    prelude::*,
    serial::{Instance, Pins, Serial, Tx},
};

/// Bytes held between two drains.
pub const LOG_CAPACITY: usize = 1024;
/// Longest formatted record, including the CRLF terminator.
const LINE_CAPACITY: usize = 128;

pub struct Usart<U: Instance> {
    tx: Tx<U>,
}

impl<U: Instance> Usart<U> {
    pub fn new<PINS: Pins<U>>(serial: Serial<U, PINS>) -> Self {
        let (tx, _rx) = serial.split();
        Self { tx }
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_byte(b);
        }
    }

    /// Block until the hardware TX FIFO/drain is flushed.
    #[inline]
    pub fn flush(&mut self) {
        let _ = block!(self.tx.flush());
    }
}

impl<U: Instance> fmt::Write for Usart<U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Usart::write_str(self, s);
        Ok(())
    }
}

pub struct UsartLogger {
    queue: Mutex<RefCell<Deque<u8, LOG_CAPACITY>>>,
    level: LevelFilter,
    dropped: AtomicU32,
}

impl UsartLogger {
    pub const fn new(level: LevelFilter) -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Deque::new())),
            level,
            dropped: AtomicU32::new(0),
        }
    }

    /// Register as the global logger.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.level);
        Ok(())
    }

    /// Write out everything queued so far. Thread mode only.
    pub fn drain<U: Instance>(&self, usart: &mut Usart<U>) {
        // One byte per critical section keeps interrupt latency flat
        while let Some(b) = critical_section::with(|cs| self.queue.borrow_ref_mut(cs).pop_front()) {
            usart.write_byte(b);
        }
    }

    /// Records discarded for lack of space.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drop_record(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

impl Log for UsartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line: String<LINE_CAPACITY> = String::new();
        if write!(line, "[{}] {}\r\n", record.level(), record.args()).is_err() {
            self.drop_record();
            return;
        }

        let queued = critical_section::with(|cs| {
            let mut queue = self.queue.borrow_ref_mut(cs);
            if queue.capacity() - queue.len() < line.len() {
                return false;
            }
            for b in line.bytes() {
                let _ = queue.push_back(b);
            }
            true
        });
        if !queued {
            self.drop_record();
        }
    }

    fn flush(&self) {}
}
