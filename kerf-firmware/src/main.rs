//! Kerf - CNC / Laser Motion Controller Firmware
//!
//! Main firmware binary for RP2040-based controller boards. Accepts
//! Grbl-compatible G-code over the UART and turns it into step pulses.
//!
//! The protocol loop runs in thread mode and blocks while motion commands
//! wait for the planner. Step generation, limit polling and the serial link
//! run on a higher-priority interrupt executor so they preempt it.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt::{self, InterruptExt, Priority};
use embassy_rp::peripherals::UART0;
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use kerf_core::config::Settings;
use kerf_core::gcode::Parser;
use kerf_core::motion::MotionControl;
use kerf_core::planner::BlockQueue;
use kerf_core::stepper::{SegmentPreparer, StepInterrupt, StepperQueues};
use kerf_core::system::MachineState;
use kerf_core::traits::{Cartesian, MachineIo, SwitchHoming};
use kerf_drivers::coolant::GpioCoolant;
use kerf_drivers::inputs::{DoorInput, LimitInputs, SwitchProbe};
use kerf_drivers::spindle::PwmSpindle;
use kerf_drivers::stepper::{GpioSteppers, StepPolarity};
use kerf_drivers::user_io::GpioUserIo;

use crate::board::{BoardUserIo, EnableGroup, DOOR, PROBE, SPINDLE, SPINDLE_PWM_DIVIDER, SPINDLE_PWM_TOP};
use crate::channels::SYS;
use crate::config::ConfigPersistence;
use crate::flash::FlashStorage;
use crate::protocol::SerialExecutor;
use crate::report::SerialReporter;
use crate::tasks::{PolledLimits, TaskTimer, TimedOutput};

/// Embedded default configuration (compiled into firmware)
/// Edit machine.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../machine.toml");

/// Planner block buffer depth
const PLANNER_BLOCKS: usize = 32;

/// Host baud rate
const BAUD_RATE: u32 = 115_200;

mod board;
mod channels;
mod config;
mod flash;
mod protocol;
mod report;
mod shared;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

/// Runs the step, limit and serial tasks above the protocol loop
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

// Shared with the step task for the life of the program
static SETTINGS: StaticCell<Settings> = StaticCell::new();
static QUEUES: StaticCell<StepperQueues> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Kerf firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Settings from flash, or the embedded machine.toml when it changed
    let mut persistence = ConfigPersistence::new(FlashStorage::new(p.FLASH, p.DMA_CH0));
    let settings = match persistence.load_settings(EMBEDDED_CONFIG).await {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration unusable: {:?}", e);
            error!("Using built-in defaults");
            Settings::default()
        }
    };
    let settings: &'static Settings = SETTINGS.init(settings);
    let coords = persistence.load_coordinates().await;
    info!(
        "Configuration loaded: {} axes, homing {}",
        settings.n_axis,
        settings.homing.enabled
    );

    // Host UART
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = BAUD_RATE;
    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);
    let uart = BufferedUart::new(p.UART0, p.PIN_0, p.PIN_1, Irqs, tx_buf, rx_buf, uart_config);
    let (tx, rx) = uart.split();
    info!("UART initialized at {} baud", BAUD_RATE);

    // Stepper outputs
    let motors = GpioSteppers::new(
        [
            Output::new(p.PIN_11, Level::Low),
            Output::new(p.PIN_6, Level::Low),
            Output::new(p.PIN_19, Level::Low),
        ],
        [
            Output::new(p.PIN_10, Level::Low),
            Output::new(p.PIN_5, Level::Low),
            Output::new(p.PIN_28, Level::Low),
        ],
        EnableGroup([
            Output::new(p.PIN_12, Level::High),
            Output::new(p.PIN_7, Level::High),
            Output::new(p.PIN_2, Level::High),
        ]),
        StepPolarity::from(&settings.stepper),
    );
    let output = TimedOutput::new(motors, &settings.stepper);

    // Switch inputs
    let limits = LimitInputs::new(
        [
            Input::new(p.PIN_4, Pull::Up),
            Input::new(p.PIN_3, Pull::Up),
            Input::new(p.PIN_25, Pull::Up),
        ],
        settings.limit_invert,
    );
    PROBE.init(SwitchProbe::new(Input::new(p.PIN_22, Pull::Up), settings.probe_invert));
    DOOR.init(DoorInput::new(Input::new(p.PIN_16, Pull::Up), false));

    // Spindle / laser PWM on slice 0 channel B
    let mut pwm_config = PwmConfig::default();
    pwm_config.top = SPINDLE_PWM_TOP;
    pwm_config.divider = SPINDLE_PWM_DIVIDER.into();
    let (_, pwm_b) = Pwm::new_output_b(p.PWM_SLICE0, p.PIN_17, pwm_config).split();
    let pwm_b = unwrap!(pwm_b);
    SPINDLE.init(PwmSpindle::new(
        pwm_b,
        Output::new(p.PIN_18, Level::Low),
        Output::new(p.PIN_20, Level::Low),
        &settings.spindle,
    ));

    let mut coolant = GpioCoolant::new(
        Output::new(p.PIN_21, Level::Low),
        Output::new(p.PIN_23, Level::Low),
        false,
    );
    let mut user_io: BoardUserIo = GpioUserIo::new(
        [Output::new(p.PIN_26, Level::Low), Output::new(p.PIN_27, Level::Low)],
        [],
    );
    info!("Machine I/O initialized");

    // Segment queues between the preparer and the step task
    let (producer, consumer) = QUEUES.init(StepperQueues::new()).split();
    let step_interrupt = StepInterrupt::new(consumer, settings);
    let preparer = SegmentPreparer::new(producer, settings);

    // High-priority executor for the realtime tasks
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let spawner = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    spawner
        .spawn(tasks::step_task(step_interrupt, output, &settings.stepper))
        .unwrap();
    spawner.spawn(tasks::limit_task(limits)).unwrap();
    spawner.spawn(tasks::serial_rx_task(rx)).unwrap();
    spawner.spawn(tasks::serial_tx_task(tx)).unwrap();
    info!("Realtime tasks spawned");

    let mut spindle = &SPINDLE;
    let mut probe = &PROBE;
    let mut door = &DOOR;
    let mut limits = PolledLimits;
    let mut kinematics = Cartesian;
    let mut homing = SwitchHoming;
    let mut timer = TaskTimer;
    let mut executor = SerialExecutor::default();
    let mut reporter = SerialReporter::new(settings);

    let io = MachineIo {
        spindle: &mut spindle,
        coolant: &mut coolant,
        user_io: &mut user_io,
        probe: &mut probe,
        limits: &mut limits,
        door: &mut door,
        kinematics: &mut kinematics,
        homing: &mut homing,
        timer: &mut timer,
        executor: &mut executor,
        reporter: &mut reporter,
    };
    let planner = BlockQueue::<PLANNER_BLOCKS>::new(settings);
    let mut mc = MotionControl::new(&SYS, settings, planner, preparer, io);
    let mut parser = Parser::new(coords);

    // Position is unknown until the machine homes
    if settings.homing.enabled {
        SYS.set_state(MachineState::Alarm);
    }
    protocol::start(&mut mc, &mut parser);
    info!("Firmware running");

    protocol::run(&mut mc, &mut parser, &mut persistence)
}
