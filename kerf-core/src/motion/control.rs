//! Motion control
//!
//! [`MotionControl`] is the gateway between parsed intent and the planner.
//! Every motion command enters the planner through it, and every wait it
//! performs keeps the realtime protocol running, so holds, overrides and
//! resets are honored while the background context is blocked.

use crate::config::Settings;
use crate::motion::position::{steps_to_mpos, Position};
use crate::planner::{PlanLineData, Planner};
use crate::stepper::SegmentPreparer;
use crate::system::{Alarm, ExecFlag, MachineState, SquaringMode, StepControl, SystemContext};
use crate::traits::{CoolantState, MachineIo, SpindleState};

/// Longest uninterrupted wait inside a dwell (ms)
pub const DWELL_TIME_STEP_MS: u32 = 50;

/// Motion gateway owned by the background context
pub struct MotionControl<'a, P: Planner> {
    pub(crate) sys: &'a SystemContext,
    pub(crate) settings: &'a Settings,
    pub(crate) planner: P,
    pub(crate) preparer: SegmentPreparer<'a>,
    pub(crate) io: MachineIo<'a>,
    /// Line waiting for planner room: `Some(is_jog)`. A jog cancel clears it.
    pub(crate) inflight: Option<bool>,
    /// Spindle and coolant as last programmed, restored after a door or sleep
    pub(crate) spindle: SpindleState,
    pub(crate) spindle_speed: f32,
    pub(crate) coolant: CoolantState,
}

impl<'a, P: Planner> MotionControl<'a, P> {
    pub fn new(
        sys: &'a SystemContext,
        settings: &'a Settings,
        planner: P,
        preparer: SegmentPreparer<'a>,
        io: MachineIo<'a>,
    ) -> Self {
        Self {
            sys,
            settings,
            planner,
            preparer,
            io,
            inflight: None,
            spindle: SpindleState::Disable,
            spindle_speed: 0.0,
            coolant: CoolantState::OFF,
        }
    }

    pub fn sys(&self) -> &'a SystemContext {
        self.sys
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn planner_mut(&mut self) -> &mut P {
        &mut self.planner
    }

    pub fn io(&mut self) -> &mut MachineIo<'a> {
        &mut self.io
    }

    pub fn laser_mode(&self) -> bool {
        self.io.spindle.is_laser_mode()
    }

    /// Machine position in cartesian millimeters
    pub fn machine_position(&self) -> Position {
        let motors = steps_to_mpos(&self.sys.machine_position(), self.settings);
        self.io.kinematics.to_cartesian(&motors)
    }

    /// Plan a line to `target` (cartesian mm).
    ///
    /// Blocks while the planner is full, starting the cycle so it drains.
    /// Returns true if the line was handed to the planner; false in check
    /// mode, on abort, or when a jog cancel dropped it.
    pub fn submit_linear_move(&mut self, target: &Position, data: &PlanLineData) -> bool {
        if self.settings.soft_limits && self.sys.state() != MachineState::Jog {
            self.soft_limit_check(target);
        }
        if self.sys.state() == MachineState::CheckMode {
            return false;
        }

        self.inflight = Some(data.is_jog);
        loop {
            self.execute_realtime();
            if self.sys.is_aborted() {
                self.inflight = None;
                return false;
            }
            if self.planner.is_full() {
                self.auto_cycle_start();
            } else {
                break;
            }
        }

        // A zero-length line is dropped by the planner but still counts as submitted
        let submitted = self.inflight.is_some();
        if submitted {
            let motors = self.io.kinematics.to_motors(target);
            self.planner.buffer_line(&motors, data);
        }
        self.inflight = None;
        submitted
    }

    /// Wait until every queued motion has executed
    pub fn buffer_synchronize(&mut self) {
        self.auto_cycle_start();
        loop {
            self.execute_realtime();
            if self.sys.is_aborted() {
                return;
            }
            if self.planner.current_block().is_none() && self.sys.state() != MachineState::Cycle {
                return;
            }
        }
    }

    /// Request a cycle start if anything is queued
    pub fn auto_cycle_start(&mut self) {
        if self.planner.current_block().is_some() {
            self.sys.request_cycle_start();
        }
    }

    /// Fill the segment ring from the planner
    pub fn prepare_segments(&mut self) {
        self.await_stepper_flush();
        let laser_mode = self.laser_mode();
        self.preparer.prepare(&mut self.planner, self.sys, laser_mode);
    }

    /// Start the step interrupt
    pub fn wake_up(&mut self) {
        self.sys.set_stepper_idle(false);
        self.io.timer.start();
    }

    /// Stop the step interrupt and let the drivers go idle
    pub fn go_idle(&mut self) {
        self.io.timer.stop();
        self.sys.set_stepper_idle(true);
    }

    /// Stop stepping and discard every prepared segment.
    ///
    /// The queues are drained on the interrupt side; preparation waits for it.
    pub fn reset_stepper(&mut self) {
        self.go_idle();
        self.sys.request_stepper_flush();
        self.preparer.reset();
    }

    fn await_stepper_flush(&mut self) {
        while self.sys.stepper_flush_pending() {
            self.io.executor.service_pending_commands(self.sys);
        }
    }

    /// Apply a programmed spindle change once queued motion has finished
    pub fn spindle_sync(&mut self, state: SpindleState, rpm: f32) {
        self.spindle = state;
        self.spindle_speed = rpm;
        if self.sys.state() == MachineState::CheckMode {
            return;
        }
        self.buffer_synchronize();
        self.io.spindle.sync(state, rpm);
    }

    /// Track a programmed spindle speed that takes effect with the motion
    pub fn set_programmed_spindle_speed(&mut self, rpm: f32) {
        self.spindle_speed = rpm;
    }

    /// Apply a programmed coolant change once queued motion has finished
    pub fn coolant_sync(&mut self, state: CoolantState) {
        self.coolant = state;
        if self.sys.state() == MachineState::CheckMode {
            return;
        }
        self.buffer_synchronize();
        self.io.coolant.set_state(state);
    }

    /// Stop spindle and coolant now and forget the programmed state
    pub fn stop_spindle_and_coolant(&mut self) {
        self.spindle = SpindleState::Disable;
        self.coolant = CoolantState::OFF;
        self.io.spindle.stop();
        self.io.coolant.stop();
    }

    /// Switch a digital user output. Returns false if it does not exist.
    pub fn set_digital(&mut self, index: u8, on: bool, synchronized: bool) -> bool {
        if self.sys.state() == MachineState::CheckMode {
            return true;
        }
        if synchronized {
            self.buffer_synchronize();
        }
        self.io.user_io.set_digital(index, on)
    }

    /// Set an analog user output in percent. Returns false if it does not exist.
    pub fn set_analog(&mut self, index: u8, percent: f32, synchronized: bool) -> bool {
        if self.sys.state() == MachineState::CheckMode {
            return true;
        }
        if synchronized {
            self.buffer_synchronize();
        }
        self.io.user_io.set_analog(index, percent.clamp(0.0, 100.0))
    }

    /// Pause for `seconds` after queued motion finishes.
    ///
    /// Returns false in check mode, for a non-positive time, or when an
    /// abort ended the wait.
    pub fn dwell(&mut self, seconds: f32) -> bool {
        let mut remaining = libm::roundf(seconds * 1000.0) as i32;
        if remaining <= 0 || self.sys.state() == MachineState::CheckMode {
            return false;
        }
        self.buffer_synchronize();
        while remaining > 0 {
            self.execute_realtime();
            if self.sys.is_aborted() {
                return false;
            }
            let step = (remaining as u32).min(DWELL_TIME_STEP_MS);
            self.io.executor.wait_ms(step);
            remaining -= step as i32;
        }
        true
    }

    /// Kill motion and outputs; the protocol turns this into an abort.
    ///
    /// Only the first call takes effect until the abort is handled.
    pub fn reset(&mut self) {
        if self.sys.exec.contains(ExecFlag::Reset) {
            return;
        }
        self.sys.exec.set(ExecFlag::Reset);

        self.io.spindle.stop();
        self.io.coolant.stop();
        self.io.user_io.all_off();

        let state = self.sys.state();
        if matches!(
            state,
            MachineState::Cycle | MachineState::Homing | MachineState::Jog
        ) || self.sys.step_control.contains(StepControl::ExecuteHold)
            || self.sys.step_control.contains(StepControl::ExecuteSysMotion)
        {
            if state == MachineState::Homing {
                self.sys.raise_alarm_if_clear(Alarm::HomingFailReset);
            } else {
                self.sys.raise_alarm_if_clear(Alarm::AbortCycle);
            }
            self.go_idle();
        }
        self.sys.set_ganged_mode(SquaringMode::Dual);
    }
}
