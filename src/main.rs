// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Firmware entry point.
//!
//! Interrupt layout:
//!
//! | Vector | Priority | Work |
//! | ------ | -------- | ---- |
//! | `TIM8_UP_TIM13` | 0 | sampling tick |
//! | `SPI3` | 1 | bus arbiter |
//! | `OTG_HS` | 5 | control tick, pended by the sampling tick |
//!
//! Thread mode brings up the gate drivers, starts the carriers and then drains the log and polls
//! driver status.

#![no_main]
#![no_std]

use core::cell::RefCell;

use cortex_m::peripheral::{DWT, NVIC};
use cortex_m_rt::entry;
use critical_section::Mutex;
use log::LevelFilter;
use panic_halt as _;

use hal::{
    pac::{self, interrupt, Interrupt},
    prelude::*,
    serial::{Config, Serial},
};
use stm32f7xx_hal as hal;

use dualdrive::axis::Axis;
use dualdrive::bus::SharedArbiter;
use dualdrive::config::{PwmTiming, SenseConfig};
use dualdrive::control::{start_timers, ControlTick, Core, GateDriver, SamplingTick};
use dualdrive::drivers::drv8301::State;
use dualdrive::drivers::{As5047, Drv8301};
use dualdrive::hw::{
    self, pins, DwtCounter, HwAdc, MotorTimer, NFault, SoftIrq, Spi3Port, Usart, UsartLogger,
};
use dualdrive::motors::PhaseMotor;
use dualdrive::timing::{SyncTimer, UpdateSource};

const TIMING: PwmTiming = PwmTiming::DEFAULT;
const SENSE: SenseConfig = SenseConfig::DEFAULT;

/// Requested shunt amplifier gain in V/V.
const REQUESTED_GAIN: f32 = 40.0;

const SYSCLK_HZ: u32 = 168_000_000;
/// Gate driver status poll interval, in CPU cycles (100 ms).
const STATUS_POLL_CYCLES: u32 = SYSCLK_HZ / 10;

// NVIC priorities, upper nibble
const PRIO_SAMPLING: u8 = 0 << 4;
const PRIO_BUS: u8 = 1 << 4;
const PRIO_CONTROL: u8 = 5 << 4;

type Board = Core<HwAdc, MotorTimer>;
type Bus = SharedArbiter<Spi3Port<4>, 16>;
type GateDrv = Drv8301<NFault>;
type Motor = PhaseMotor<'static, MotorTimer>;
type ControlFn = fn(u32, &mut [Motor; 2]);
type Sampling = SamplingTick<'static, HwAdc, MotorTimer, MotorTimer, SoftIrq, DwtCounter, fn()>;
type Control = ControlTick<'static, HwAdc, MotorTimer, &'static GateDrv, Motor, ControlFn, DwtCounter>;

static CORE: Board = Core::new(
    HwAdc::ALL,
    [
        Axis::new(0, MotorTimer::Tim1),
        Axis::new(1, MotorTimer::Tim8),
    ],
    TIMING.cycle_increment(),
);
static BUS: Bus = SharedArbiter::new(Spi3Port::new(pins::SPI3_CS));
static GATE_M0: GateDrv = Drv8301::new(pins::DRV_M0, NFault);
static GATE_M1: GateDrv = Drv8301::new(pins::DRV_M1, NFault);
static ENC_M0: As5047 = As5047::new(pins::ENC_M0);
static ENC_M1: As5047 = As5047::new(pins::ENC_M1);
static LOGGER: UsartLogger = UsartLogger::new(LevelFilter::Info);

// Handlers built in `main`, taken once by their interrupt
static SAMPLING: Mutex<RefCell<Option<Sampling>>> = Mutex::new(RefCell::new(None));
static CONTROL: Mutex<RefCell<Option<Control>>> = Mutex::new(RefCell::new(None));

/// Runs at every count-up update, ahead of the control tick.
fn sampling_hook() {
    // A request still in flight is skipped, not queued twice
    let _ = ENC_M0.request(&BUS);
    let _ = ENC_M1.request(&BUS);
}

/// Holds both bridges at zero average voltage.
fn control_loop(_timestamp: u32, motors: &mut [Motor; 2]) {
    for motor in motors.iter_mut() {
        motor.stage_duty([0.5; 3]);
    }
}

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

#[entry]
fn main() -> ! {
    // Peripherals
    let (Some(dp), Some(mut cp)) = (pac::Peripherals::take(), cortex_m::Peripherals::take())
    else {
        halt()
    };

    // Clocks: 168 MHz on the APB2 timers, 84 MHz on the APB1 timers
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.sysclk(SYSCLK_HZ.Hz()).freeze();

    cp.DCB.enable_trace();
    cp.DWT.enable_cycle_counter();

    let mut pins = hw::BoardPins::new(dp.GPIOA, dp.GPIOB, dp.GPIOC, dp.GPIOD);

    // USART1 (DBG)
    let usart_cfg = Config {
        baud_rate: 115_200.bps(),
        ..Default::default()
    };
    let serial = Serial::new(dp.USART1, (pins.usart1.tx, pins.usart1.rx), &clocks, usart_cfg);
    let mut usart = Usart::new(serial);
    if LOGGER.install().is_err() {
        usart.write_str("logger already installed\r\n");
    }
    log::info!("dualdrive starting");

    // Sampling chain
    hw::adc::init(dp.ADC1, dp.ADC2, dp.ADC3);
    let (tim1, tim8, aux) = hw::timer::init(dp.TIM1, dp.TIM8, dp.TIM13, &TIMING);

    // Gate drivers: pulse EN_GATE for a full reset, then program over SPI3
    hw::spi::init(dp.SPI3);
    unsafe {
        cp.NVIC.set_priority(Interrupt::SPI3, PRIO_BUS);
        NVIC::unmask(Interrupt::SPI3);
    }
    pins.en_gate.set_low();
    cortex_m::asm::delay(SYSCLK_HZ / 1_000_000 * 40);
    pins.en_gate.set_high();
    cortex_m::asm::delay(SYSCLK_HZ / 50);

    let gains = [
        bring_up(&GATE_M0, "m0"),
        bring_up(&GATE_M1, "m1"),
    ];

    let motors = [
        Motor::new(&CORE.axes[0], TIMING.period_clocks as u16, TIMING.current_meas_period_s()),
        Motor::new(&CORE.axes[1], TIMING.period_clocks as u16, TIMING.current_meas_period_s()),
    ];
    let mut control: Control = ControlTick::new(
        &CORE,
        &TIMING,
        SENSE,
        [&GATE_M0, &GATE_M1],
        motors,
        control_loop as ControlFn,
        DwtCounter,
    );
    for (i, gain) in gains.into_iter().enumerate() {
        if let Some(gain) = gain {
            let sense = control.pipeline_mut(i).sense_mut();
            sense.set_gain(&SENSE, gain);
            log::info!("axis {}: current range +/-{} A", i, sense.max_measurable());
        }
    }
    let sampling: Sampling = SamplingTick::new(
        &CORE,
        tim8,
        SoftIrq,
        DwtCounter,
        TIMING.fallback_compare(),
        sampling_hook as fn(),
    );
    critical_section::with(|cs| {
        SAMPLING.borrow_ref_mut(cs).replace(sampling);
        CONTROL.borrow_ref_mut(cs).replace(control);
    });

    unsafe {
        cp.NVIC.set_priority(Interrupt::TIM8_UP_TIM13, PRIO_SAMPLING);
        cp.NVIC.set_priority(SoftIrq::INTERRUPT, PRIO_CONTROL);
        NVIC::unmask(Interrupt::TIM8_UP_TIM13);
        NVIC::unmask(SoftIrq::INTERRUPT);
    }

    let timers: [&dyn SyncTimer; 3] = [&tim1, &tim8, &aux];
    if let Err(e) = start_timers(&CORE, timers, TIMING.initial_counts(), &tim8) {
        log::error!("carrier start failed: {}", e);
    }

    for (axis, gate) in CORE.axes.iter().zip([&GATE_M0, &GATE_M1]) {
        if !gate.is_ready() {
            continue;
        }
        match axis.arm(TIMING.fallback_compare()) {
            Ok(()) => log::info!("axis {} armed", axis.id()),
            Err(e) => log::warn!("axis {}: {}", axis.id(), e),
        }
    }

    let mut last_poll = DWT::cycle_count();
    loop {
        LOGGER.drain(&mut usart);

        let now = DWT::cycle_count();
        if now.wrapping_sub(last_poll) >= STATUS_POLL_CYCLES {
            last_poll = now;
            poll_gate(&GATE_M0, &CORE.axes[0]);
            poll_gate(&GATE_M1, &CORE.axes[1]);
            report_encoder(&ENC_M0, "m0");
            report_encoder(&ENC_M1, "m1");
            report_task_times();
        }

        cortex_m::asm::wfi();
    }
}

/// Configure one gate driver and wait for the readback. Returns the programmed gain.
fn bring_up(gate: &'static GateDrv, name: &str) -> Option<f32> {
    let gain = match gate.config(&BUS, REQUESTED_GAIN) {
        Ok(gain) => gain,
        Err(e) => {
            log::warn!("gate {}: {}", name, e);
            return None;
        }
    };

    // 7 frames at ~1.3 MHz take well under a millisecond
    for _ in 0..100 {
        if BUS.is_idle() {
            break;
        }
        cortex_m::asm::delay(SYSCLK_HZ / 10_000);
    }
    if !BUS.is_idle() {
        log::warn!("gate {}: bus stalled during config", name);
        while BUS.abandon_current().is_some() {}
    }

    (gate.state() == State::Ready).then_some(gain)
}

/// Read back the last status and queue the next poll. A latched fault stops the axis.
fn poll_gate(gate: &'static GateDrv, axis: &Axis<MotorTimer>) {
    let status = gate.status1();
    if status.fault() && axis.is_armed() {
        log::warn!("axis {}: gate fault, status1={:#05x}", axis.id(), status.raw());
        axis.disarm();
    }
    let _ = gate.poll_status(&BUS);
}

fn report_encoder(enc: &As5047, name: &str) {
    log::debug!(
        "enc {}: turns {:?}, {} bad frames, {} skipped",
        name,
        enc.turns(),
        enc.frame_errors(),
        enc.skipped()
    );
}

/// Worst-case interrupt work since the last report, in CPU cycles.
fn report_task_times() {
    let times = &CORE.times;
    log::debug!(
        "cycles: sampling {} control {} dc wait {}",
        times.sampling.max(),
        times.control_loop.max(),
        times.dc_calib_wait.max()
    );
    times.sampling.reset();
    times.control_loop.reset();
    times.dc_calib_wait.reset();
}

#[interrupt]
fn TIM8_UP_TIM13() {
    static mut TICK: Option<Sampling> = None;

    if TICK.is_none() {
        *TICK = critical_section::with(|cs| SAMPLING.borrow_ref_mut(cs).take());
    }
    match TICK {
        Some(tick) => {
            tick.on_interrupt();
        }
        // Not handed off yet
        None => MotorTimer::Tim8.clear_update(),
    }
}

#[interrupt]
fn OTG_HS() {
    static mut TICK: Option<Control> = None;

    if TICK.is_none() {
        *TICK = critical_section::with(|cs| CONTROL.borrow_ref_mut(cs).take());
    }
    if let Some(tick) = TICK {
        tick.on_interrupt();
    }
}

#[interrupt]
fn SPI3() {
    BUS.on_interrupt();
}
