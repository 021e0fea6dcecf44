// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Simulated peripherals for host tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::axis::Bridge;
use crate::bus::{DeviceId, SpiPort};
use crate::control::{ControlTrigger, GateDriver};
use crate::drivers::FaultLine;
use crate::sampling::{AdcFlags, Converter};
use crate::timing::{CycleCounter, SyncTimer, UpdateSource};

pub struct FakeBridge {
    switching: Cell<bool>,
    safe_calls: Cell<u32>,
    compares: Cell<[u16; 3]>,
}

impl FakeBridge {
    pub fn switching() -> Self {
        Self {
            switching: Cell::new(true),
            safe_calls: Cell::new(0),
            compares: Cell::new([0; 3]),
        }
    }

    pub fn idle() -> Self {
        let b = Self::switching();
        b.switching.set(false);
        b
    }

    pub fn set_switching(&self, on: bool) {
        self.switching.set(on);
    }

    pub fn safe_calls(&self) -> u32 {
        self.safe_calls.get()
    }

    pub fn compares(&self) -> [u16; 3] {
        self.compares.get()
    }
}

impl Bridge for FakeBridge {
    fn is_switching(&self) -> bool {
        self.switching.get()
    }
    fn force_safe(&self) {
        self.switching.set(false);
        self.safe_calls.set(self.safe_calls.get() + 1);
    }
    fn enable(&self) {
        self.switching.set(true);
    }
    fn set_all_compares(&self, compare: u16) {
        self.compares.set([compare; 3]);
    }
    fn set_compares(&self, compares: [u16; 3]) {
        self.compares.set(compares);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    Halt,
    Load(u32),
    Resume,
}

/// Calls seen by the fakes attached to a [`Journal`], in order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    TriggersOff,
    TriggersOn,
    ClearFlags,
    Timer(TimerEvent),
    ClearUpdate,
    ListenUpdate,
}

/// Ordered call log shared between several fakes.
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Event>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    fn record(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }
}

fn record(journal: &RefCell<Option<Journal>>, event: Event) {
    if let Some(j) = journal.borrow().as_ref() {
        j.record(event);
    }
}

pub struct FakeTimer {
    period: u32,
    count: Cell<u32>,
    running: Cell<bool>,
    down: Cell<bool>,
    listening: Cell<bool>,
    cleared: Cell<u32>,
    log: RefCell<Vec<TimerEvent>>,
    journal: RefCell<Option<Journal>>,
}

impl FakeTimer {
    pub fn new(period: u32) -> Self {
        Self {
            period,
            count: Cell::new(0),
            running: Cell::new(false),
            down: Cell::new(false),
            listening: Cell::new(false),
            cleared: Cell::new(0),
            log: RefCell::new(Vec::new()),
            journal: RefCell::new(None),
        }
    }

    pub fn attach(&self, journal: &Journal) {
        self.journal.replace(Some(journal.clone()));
    }

    fn push(&self, event: TimerEvent) {
        self.log.borrow_mut().push(event);
        record(&self.journal, Event::Timer(event));
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    pub fn running(&self) -> bool {
        self.running.get()
    }

    pub fn listening(&self) -> bool {
        self.listening.get()
    }

    pub fn updates_cleared(&self) -> u32 {
        self.cleared.get()
    }

    pub fn set_counting_down(&self, down: bool) {
        self.down.set(down);
    }

    pub fn log(&self) -> Vec<TimerEvent> {
        self.log.borrow().clone()
    }
}

impl SyncTimer for FakeTimer {
    fn halt(&self) {
        self.running.set(false);
        self.push(TimerEvent::Halt);
    }
    fn set_count(&self, count: u32) {
        self.count.set(count);
        self.push(TimerEvent::Load(count));
    }
    fn period(&self) -> u32 {
        self.period
    }
    fn resume(&self) {
        self.running.set(true);
        self.push(TimerEvent::Resume);
    }
}

impl UpdateSource for FakeTimer {
    fn clear_update(&self) {
        self.cleared.set(self.cleared.get() + 1);
        record(&self.journal, Event::ClearUpdate);
    }
    fn listen_update(&self) {
        self.listening.set(true);
        record(&self.journal, Event::ListenUpdate);
    }
    fn counting_down(&self) -> bool {
        self.down.get()
    }
}

/// Cycle counter that advances by `step` on every read.
pub struct FakeCycles {
    now: Cell<u32>,
    step: Cell<u32>,
}

impl FakeCycles {
    pub fn stepping(start: u32, step: u32) -> Self {
        Self {
            now: Cell::new(start),
            step: Cell::new(step),
        }
    }

    pub fn set_step(&self, step: u32) {
        self.step.set(step);
    }
}

impl CycleCounter for FakeCycles {
    fn now(&self) -> u32 {
        let t = self.now.get();
        self.now.set(t.wrapping_add(self.step.get()));
        t
    }
}

pub struct FakeAdc {
    flags: Cell<u8>,
    regular: Cell<u16>,
    injected: Cell<u16>,
    triggers: Cell<bool>,
    clear_calls: Cell<u32>,
    eoc_after: Cell<Option<u32>>,
    journal: RefCell<Option<Journal>>,
}

impl FakeAdc {
    pub fn new() -> Self {
        Self {
            flags: Cell::new(0),
            regular: Cell::new(2048),
            injected: Cell::new(2048),
            triggers: Cell::new(true),
            clear_calls: Cell::new(0),
            eoc_after: Cell::new(None),
            journal: RefCell::new(None),
        }
    }

    pub fn attach(&self, journal: &Journal) {
        self.journal.replace(Some(journal.clone()));
    }

    pub fn raise(&self, flags: AdcFlags) {
        self.flags.set(self.flags.get() | flags.bits());
    }

    pub fn set_codes(&self, regular: u16, injected: u16) {
        self.regular.set(regular);
        self.injected.set(injected);
    }

    /// Raise EOC after `polls` further reads of the status flags.
    pub fn raise_eoc_after(&self, polls: u32) {
        self.eoc_after.set(Some(polls));
    }

    pub fn clear_calls(&self) -> u32 {
        self.clear_calls.get()
    }

    pub fn triggers_enabled(&self) -> bool {
        self.triggers.get()
    }
}

impl Converter for FakeAdc {
    fn flags(&self) -> AdcFlags {
        match self.eoc_after.get() {
            Some(0) => {
                self.raise(AdcFlags::EOC);
                self.eoc_after.set(None);
            }
            Some(n) => self.eoc_after.set(Some(n - 1)),
            None => {}
        }
        AdcFlags::from_bits(self.flags.get())
    }
    fn clear(&self, flags: AdcFlags) {
        self.clear_calls.set(self.clear_calls.get() + 1);
        self.flags.set(self.flags.get() & !flags.bits());
        record(&self.journal, Event::ClearFlags);
    }
    fn regular(&self) -> u16 {
        self.regular.get()
    }
    fn injected(&self) -> u16 {
        self.injected.get()
    }
    fn set_external_triggers(&self, enabled: bool) {
        self.triggers.set(enabled);
        let event = if enabled { Event::TriggersOn } else { Event::TriggersOff };
        record(&self.journal, event);
    }
}

#[derive(Default)]
pub struct FakeTrigger {
    pends: Cell<u32>,
}

impl FakeTrigger {
    pub fn pends(&self) -> u32 {
        self.pends.get()
    }
}

impl ControlTrigger for FakeTrigger {
    fn pend(&self) {
        self.pends.set(self.pends.get() + 1);
    }
}

pub struct FakeGate(pub Cell<bool>);

impl FakeGate {
    pub fn ready() -> Self {
        Self(Cell::new(true))
    }
}

impl GateDriver for FakeGate {
    fn is_ready(&self) -> bool {
        self.0.get()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpiEvent {
    Begin(DeviceId, Vec<u16>),
    Finish(DeviceId),
    Abort(DeviceId),
}

/// SPI port that answers every frame from a reply queue (zero when empty).
#[derive(Default)]
pub struct FakeSpi {
    log: RefCell<Vec<SpiEvent>>,
    replies: RefCell<VecDeque<u16>>,
    in_flight: Cell<usize>,
}

impl FakeSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, word: u16) {
        self.replies.borrow_mut().push_back(word);
    }

    pub fn log(&self) -> Vec<SpiEvent> {
        self.log.borrow().clone()
    }

    pub fn take_log(&self) -> Vec<SpiEvent> {
        self.log.borrow_mut().drain(..).collect()
    }
}

impl SpiPort for &FakeSpi {
    fn begin(&mut self, device: DeviceId, tx: &[u16]) {
        self.in_flight.set(tx.len());
        self.log.borrow_mut().push(SpiEvent::Begin(device, tx.to_vec()));
    }
    fn service(&mut self) -> bool {
        self.in_flight.get() != 0
    }
    fn finish(&mut self, device: DeviceId, rx: &mut [u16]) {
        for w in rx.iter_mut() {
            *w = self.replies.borrow_mut().pop_front().unwrap_or(0);
        }
        self.in_flight.set(0);
        self.log.borrow_mut().push(SpiEvent::Finish(device));
    }
    fn abort(&mut self, device: DeviceId) {
        self.in_flight.set(0);
        self.log.borrow_mut().push(SpiEvent::Abort(device));
    }
}

/// nFAULT line shared between tests; an atomic so drivers holding it stay `Sync`.
#[derive(Default)]
pub struct FakeFault(pub std::sync::atomic::AtomicBool);

impl FaultLine for FakeFault {
    fn is_faulted(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}
