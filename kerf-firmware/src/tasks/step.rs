//! Step pulse task
//!
//! Stands in for the hardware step timer. While the timer is running the
//! task calls [`StepInterrupt::on_tick`] at absolute deadlines, so executor
//! latency can delay a single pulse but never stretches the step rate.
//! While stopped it services queue flushes and releases the drivers once
//! the idle lock time has passed.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_time::{block_for, Duration, Instant, Timer};
use portable_atomic::Ordering;

use kerf_core::config::{StepperSettings, IDLE_LOCK_FOREVER};
use kerf_core::motion::position::AxisMask;
use kerf_core::stepper::{StepInterrupt, Tick};
use kerf_core::system::SquaringMode;
use kerf_core::traits::{StepOutput, StepTimer};

use crate::board::{BoardMotors, PROBE, SPINDLE};
use crate::channels::{STEP_TIMER_RUNNING, STEP_WAKE, SYS};

/// Step timer control handed to the motion layer
pub struct TaskTimer;

impl StepTimer for TaskTimer {
    fn start(&mut self) {
        STEP_TIMER_RUNNING.store(true, Ordering::Release);
        STEP_WAKE.signal(());
    }

    fn stop(&mut self) {
        STEP_TIMER_RUNNING.store(false, Ordering::Release);
    }
}

/// Step outputs that hold the pulse width and the direction setup time
pub struct TimedOutput<M> {
    motors: M,
    pulse: Duration,
    direction_delay: Duration,
    pulse_start: Option<Instant>,
}

impl<M: StepOutput> TimedOutput<M> {
    pub fn new(motors: M, settings: &StepperSettings) -> Self {
        Self {
            motors,
            pulse: Duration::from_micros(settings.pulse_us.into()),
            direction_delay: Duration::from_micros(settings.direction_delay_us.into()),
            pulse_start: None,
        }
    }
}

impl<M: StepOutput> StepOutput for TimedOutput<M> {
    fn step(&mut self, mask: AxisMask, mode: SquaringMode) {
        self.motors.step(mask, mode);
        self.pulse_start = (!mask.is_empty()).then(Instant::now);
    }

    fn unstep(&mut self) {
        if let Some(start) = self.pulse_start.take() {
            let end = start + self.pulse;
            let now = Instant::now();
            if end > now {
                block_for(end - now);
            }
        }
        self.motors.unstep();
    }

    fn set_direction(&mut self, negative: AxisMask) -> bool {
        let changed = self.motors.set_direction(negative);
        if changed && self.direction_delay.as_ticks() > 0 {
            block_for(self.direction_delay);
        }
        changed
    }

    fn set_enable(&mut self, enabled: bool) {
        self.motors.set_enable(enabled);
    }
}

/// Step timer period in timer ticks as wall time
fn period_duration(period: u16, timer_hz: u32) -> Duration {
    Duration::from_micros(u64::from(period) * 1_000_000 / u64::from(timer_hz.max(1)))
}

#[embassy_executor::task]
pub async fn step_task(
    mut interrupt: StepInterrupt<'static>,
    mut output: TimedOutput<BoardMotors>,
    settings: &'static StepperSettings,
) {
    info!("Step task started");

    let mut spindle = &SPINDLE;
    let mut probe = &PROBE;
    let idle_lock = (settings.idle_lock_ms != IDLE_LOCK_FOREVER)
        .then(|| Duration::from_millis(settings.idle_lock_ms.into()));

    loop {
        if !STEP_TIMER_RUNNING.load(Ordering::Acquire) {
            interrupt.service_flush(&SYS);

            match idle_lock {
                Some(lock) if interrupt.drivers_enabled() && SYS.stepper_idle() => {
                    if let Either::Second(()) = select(STEP_WAKE.wait(), Timer::after(lock)).await {
                        trace!("Idle lock expired, releasing drivers");
                        interrupt.release_drivers(&SYS, &mut output);
                    }
                }
                _ => STEP_WAKE.wait().await,
            }
            continue;
        }

        let mut deadline = Instant::now();
        while STEP_TIMER_RUNNING.load(Ordering::Acquire) {
            match interrupt.on_tick(&SYS, &mut output, &mut spindle, &mut probe) {
                Tick::Continue { period } => {
                    deadline += period_duration(period, settings.timer_hz);
                    Timer::at(deadline).await;
                }
                Tick::Idle | Tick::Busy => {
                    STEP_TIMER_RUNNING.store(false, Ordering::Release);
                }
            }
        }
    }
}
