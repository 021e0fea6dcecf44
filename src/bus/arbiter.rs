// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! FIFO arbitration of one SPI bus between several chip-selected devices.
//!
//! At most one transfer is on the wire. The head of the queue is the in-flight transfer; later
//! submissions wait behind it regardless of target device. The bus-complete interrupt pops the
//! head, starts the next transfer and only then runs the finished transfer's listener, outside
//! the critical section.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;

/// Longest transfer, in 16-bit frames.
pub const MAX_FRAMES: usize = 4;

/// Chip-select index on the shared bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u8);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusError {
    /// Transfer empty or longer than [`MAX_FRAMES`].
    TransferTooLong,
    /// Queue is full; nothing was submitted.
    QueueFull,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::TransferTooLong => f.write_str("transfer length out of range"),
            BusError::QueueFull => f.write_str("bus queue full"),
        }
    }
}

/// Receives the result of a finished transfer. Runs in the bus interrupt.
pub trait TransferListener: Sync {
    fn transfer_done(&self, done: &Completion);

    /// The transfer was dropped by [`SharedArbiter::abandon_current`] and will never complete.
    /// Runs in the abandoning context.
    fn transfer_abandoned(&self, _device: DeviceId, _tag: u16) {}
}

/// A queued request.
#[derive(Copy, Clone)]
pub struct Transfer {
    device: DeviceId,
    tx: [u16; MAX_FRAMES],
    len: usize,
    tag: u16,
    listener: Option<&'static dyn TransferListener>,
}

impl Transfer {
    pub fn new(device: DeviceId, frames: &[u16]) -> Result<Self, BusError> {
        if frames.is_empty() || frames.len() > MAX_FRAMES {
            return Err(BusError::TransferTooLong);
        }
        let mut tx = [0u16; MAX_FRAMES];
        tx[..frames.len()].copy_from_slice(frames);
        Ok(Self {
            device,
            tx,
            len: frames.len(),
            tag: 0,
            listener: None,
        })
    }

    /// Opaque value handed back in the [`Completion`].
    pub fn with_tag(mut self, tag: u16) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_listener(mut self, listener: &'static dyn TransferListener) -> Self {
        self.listener = Some(listener);
        self
    }

    #[inline]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    #[inline]
    pub fn tag(&self) -> u16 {
        self.tag
    }

    #[inline]
    pub fn frames(&self) -> &[u16] {
        &self.tx[..self.len]
    }

    fn notify_abandoned(&self) {
        if let Some(listener) = self.listener {
            listener.transfer_abandoned(self.device, self.tag);
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("device", &self.device)
            .field("tx", &self.frames())
            .field("tag", &self.tag)
            .finish()
    }
}

/// A finished transfer.
#[derive(Copy, Clone)]
pub struct Completion {
    pub device: DeviceId,
    pub tag: u16,
    rx: [u16; MAX_FRAMES],
    len: usize,
    listener: Option<&'static dyn TransferListener>,
}

impl Completion {
    #[inline]
    pub fn rx(&self) -> &[u16] {
        &self.rx[..self.len]
    }

    /// Run the listener, if any.
    pub fn notify(&self) {
        if let Some(listener) = self.listener {
            listener.transfer_done(self);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("device", &self.device)
            .field("tag", &self.tag)
            .field("rx", &self.rx())
            .finish()
    }
}

/// Frame engine of the bus.
pub trait SpiPort {
    /// Assert `device`'s chip select and start clocking out `tx`.
    fn begin(&mut self, device: DeviceId, tx: &[u16]);

    /// Service the bus interrupt. `true` once every frame of the transfer has been exchanged.
    fn service(&mut self) -> bool;

    /// Release the chip select and hand over the received frames.
    fn finish(&mut self, device: DeviceId, rx: &mut [u16]);

    /// Release the chip select and drop whatever was received.
    fn abort(&mut self, device: DeviceId);
}

/// Queue and port, without locking. Wrap in a [`SharedArbiter`] when shared with an interrupt.
pub struct SpiArbiter<P, const N: usize> {
    port: P,
    queue: Deque<Transfer, N>,
}

impl<P: SpiPort, const N: usize> SpiArbiter<P, N> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            queue: Deque::new(),
        }
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Enqueue; start immediately if the bus is idle.
    pub fn submit(&mut self, transfer: Transfer) -> Result<(), BusError> {
        let idle = self.queue.is_empty();
        if self.queue.push_back(transfer).is_err() {
            log::warn!("spi queue full, dropping transfer to {:?}", transfer.device);
            return Err(BusError::QueueFull);
        }
        if idle {
            self.start_head();
        }
        Ok(())
    }

    /// The in-flight transfer finished. Pops it, starts the next one and returns the completion.
    pub fn on_complete(&mut self) -> Option<Completion> {
        let done = self.queue.pop_front()?;
        let mut rx = [0u16; MAX_FRAMES];
        self.port.finish(done.device, &mut rx[..done.len]);
        self.start_head();
        Some(Completion {
            device: done.device,
            tag: done.tag,
            rx,
            len: done.len,
            listener: done.listener,
        })
    }

    /// Service the port interrupt, completing the head transfer when it is done.
    pub fn on_interrupt(&mut self) -> Option<Completion> {
        if !self.port.service() {
            return None;
        }
        self.on_complete()
    }

    /// Drop the in-flight transfer without notifying its listener and move on.
    pub fn abandon_current(&mut self) -> Option<Transfer> {
        let dropped = self.queue.pop_front()?;
        self.port.abort(dropped.device);
        self.start_head();
        Some(dropped)
    }

    fn start_head(&mut self) {
        if let Some(next) = self.queue.front() {
            self.port.begin(next.device, next.frames());
        }
    }
}

/// [`SpiArbiter`] behind a critical section, shareable between thread mode and interrupts.
///
/// The lock masks every interrupt: transfers are submitted from the highest-priority sampling
/// hook as well as from thread mode, so masking the bus interrupt alone would let the sampling
/// hook re-enter the queue. The locked region covers queue bookkeeping and starting the next
/// transfer; listeners run after it is released.
pub struct SharedArbiter<P, const N: usize> {
    inner: Mutex<RefCell<SpiArbiter<P, N>>>,
}

impl<P: SpiPort, const N: usize> SharedArbiter<P, N> {
    pub const fn new(port: P) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(SpiArbiter::new(port))),
        }
    }

    pub fn submit(&self, transfer: Transfer) -> Result<(), BusError> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).submit(transfer))
    }

    /// Call from the bus-complete interrupt. Returns whether a transfer finished.
    pub fn on_interrupt(&self) -> bool {
        let done = critical_section::with(|cs| self.inner.borrow_ref_mut(cs).on_interrupt());
        match done {
            Some(done) => {
                done.notify();
                true
            }
            None => false,
        }
    }

    /// Give up on a transfer that never completed. Its listener hears
    /// [`transfer_abandoned`](TransferListener::transfer_abandoned), never `transfer_done`.
    pub fn abandon_current(&self) -> Option<Transfer> {
        let dropped = critical_section::with(|cs| self.inner.borrow_ref_mut(cs).abandon_current())?;
        dropped.notify_abandoned();
        Some(dropped)
    }

    pub fn is_idle(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).is_idle())
    }

    /// Run `f` on the arbiter inside a critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut SpiArbiter<P, N>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
