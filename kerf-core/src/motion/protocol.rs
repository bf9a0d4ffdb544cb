//! Realtime protocol
//!
//! The state machine behind every busy-wait in the motion layer. Realtime
//! input lands in [`SystemContext`] as request flags; [`MotionControl::execute_realtime`]
//! turns them into state transitions: alarms, resets, feed holds and
//! cancels, cycle start and stop, overrides, and the suspend loop that
//! holds the background context while a hold, door or sleep is active.

use super::control::MotionControl;
use crate::planner::Planner;
use crate::system::{
    feed_override, rapid_override, spindle_override, ExecFlag, FlagSet, MachineState, ProbeState,
    StepControl, SuspendFlag, SystemContext,
};
use crate::traits::{Feedback, SpindleState};

/// Single-byte commands acted on as soon as they arrive, outside the line stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RealtimeCommand {
    /// 0x18 (ctrl-x)
    Reset,
    /// `?`
    StatusReport,
    /// `~`
    CycleStart,
    /// `!`
    FeedHold,
    /// 0x84
    SafetyDoor,
    /// 0x85
    JogCancel,
    /// 0x90
    FeedOverrideReset,
    /// 0x91
    FeedOverrideCoarsePlus,
    /// 0x92
    FeedOverrideCoarseMinus,
    /// 0x93
    FeedOverrideFinePlus,
    /// 0x94
    FeedOverrideFineMinus,
    /// 0x95
    RapidOverrideReset,
    /// 0x96
    RapidOverrideMedium,
    /// 0x97
    RapidOverrideLow,
    /// 0x98
    RapidOverrideExtraLow,
    /// 0x99
    SpindleOverrideReset,
    /// 0x9A
    SpindleOverrideCoarsePlus,
    /// 0x9B
    SpindleOverrideCoarseMinus,
    /// 0x9C
    SpindleOverrideFinePlus,
    /// 0x9D
    SpindleOverrideFineMinus,
}

impl RealtimeCommand {
    /// Decode a realtime byte; any other byte belongs to the line stream
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x18 => RealtimeCommand::Reset,
            b'?' => RealtimeCommand::StatusReport,
            b'~' => RealtimeCommand::CycleStart,
            b'!' => RealtimeCommand::FeedHold,
            0x84 => RealtimeCommand::SafetyDoor,
            0x85 => RealtimeCommand::JogCancel,
            0x90 => RealtimeCommand::FeedOverrideReset,
            0x91 => RealtimeCommand::FeedOverrideCoarsePlus,
            0x92 => RealtimeCommand::FeedOverrideCoarseMinus,
            0x93 => RealtimeCommand::FeedOverrideFinePlus,
            0x94 => RealtimeCommand::FeedOverrideFineMinus,
            0x95 => RealtimeCommand::RapidOverrideReset,
            0x96 => RealtimeCommand::RapidOverrideMedium,
            0x97 => RealtimeCommand::RapidOverrideLow,
            0x98 => RealtimeCommand::RapidOverrideExtraLow,
            0x99 => RealtimeCommand::SpindleOverrideReset,
            0x9A => RealtimeCommand::SpindleOverrideCoarsePlus,
            0x9B => RealtimeCommand::SpindleOverrideCoarseMinus,
            0x9C => RealtimeCommand::SpindleOverrideFinePlus,
            0x9D => RealtimeCommand::SpindleOverrideFineMinus,
            _ => return None,
        })
    }

    /// Raise the matching request. Safe to call from any context.
    pub fn apply(self, sys: &SystemContext) {
        let feed_coarse = feed_override::COARSE as i16;
        let feed_fine = feed_override::FINE as i16;
        let spindle_coarse = spindle_override::COARSE as i16;
        let spindle_fine = spindle_override::FINE as i16;
        match self {
            RealtimeCommand::Reset => sys.request_reset(),
            RealtimeCommand::StatusReport => sys.request_status_report(),
            RealtimeCommand::CycleStart => sys.request_cycle_start(),
            RealtimeCommand::FeedHold => sys.request_feed_hold(),
            RealtimeCommand::SafetyDoor => sys.request_safety_door(),
            RealtimeCommand::JogCancel => sys.request_jog_cancel(),
            RealtimeCommand::FeedOverrideReset => sys.request_feed_override(feed_override::DEFAULT),
            RealtimeCommand::FeedOverrideCoarsePlus => sys.adjust_feed_override(feed_coarse),
            RealtimeCommand::FeedOverrideCoarseMinus => sys.adjust_feed_override(-feed_coarse),
            RealtimeCommand::FeedOverrideFinePlus => sys.adjust_feed_override(feed_fine),
            RealtimeCommand::FeedOverrideFineMinus => sys.adjust_feed_override(-feed_fine),
            RealtimeCommand::RapidOverrideReset => {
                sys.request_rapid_override(rapid_override::DEFAULT)
            }
            RealtimeCommand::RapidOverrideMedium => sys.request_rapid_override(rapid_override::MEDIUM),
            RealtimeCommand::RapidOverrideLow => sys.request_rapid_override(rapid_override::LOW),
            RealtimeCommand::RapidOverrideExtraLow => {
                sys.request_rapid_override(rapid_override::EXTRA_LOW)
            }
            RealtimeCommand::SpindleOverrideReset => {
                sys.request_spindle_override(spindle_override::DEFAULT)
            }
            RealtimeCommand::SpindleOverrideCoarsePlus => sys.adjust_spindle_override(spindle_coarse),
            RealtimeCommand::SpindleOverrideCoarseMinus => {
                sys.adjust_spindle_override(-spindle_coarse)
            }
            RealtimeCommand::SpindleOverrideFinePlus => sys.adjust_spindle_override(spindle_fine),
            RealtimeCommand::SpindleOverrideFineMinus => sys.adjust_spindle_override(-spindle_fine),
        }
    }
}

impl<P: Planner> MotionControl<'_, P> {
    /// Realtime checkpoint: gather input, run the state machine, and stay
    /// in the suspend loop while a hold, door or sleep is active.
    pub fn execute_realtime(&mut self) {
        self.poll_realtime_input();
        self.exec_rt_system();
        if !self.sys.suspend.is_empty() {
            self.exec_rt_suspend();
        }
    }

    /// Pull pending realtime input and run a requested reset
    fn poll_realtime_input(&mut self) {
        self.io.executor.service_pending_commands(self.sys);
        if self.sys.take_reset_request() {
            self.reset();
        }
    }

    fn exec_rt_system(&mut self) {
        let sys = self.sys;

        if let Some(alarm) = sys.alarm() {
            sys.set_state(MachineState::Alarm);
            self.io.reporter.alarm(alarm);
            if alarm.is_critical() {
                // Locked until the host resets; status reports still answered
                self.io.reporter.feedback(Feedback::CriticalEvent);
                sys.exec.clear(ExecFlag::Reset);
                loop {
                    self.io.executor.service_pending_commands(sys);
                    if sys.exec.take(ExecFlag::StatusReport) {
                        self.io.reporter.status(sys);
                    }
                    if sys.take_reset_request() {
                        self.reset();
                        break;
                    }
                }
            }
            sys.take_alarm();
        }

        let exec = sys.exec.load();
        if !exec.is_empty() || sys.cycle_stop() {
            if exec.contains(ExecFlag::Reset) {
                sys.set_abort(true);
                return;
            }

            if sys.exec.take(ExecFlag::StatusReport) {
                self.io.reporter.status(sys);
            }

            if exec.contains(ExecFlag::MotionCancel)
                || exec.contains(ExecFlag::FeedHold)
                || exec.contains(ExecFlag::SafetyDoor)
                || exec.contains(ExecFlag::Sleep)
            {
                self.begin_hold(exec);
            }

            if exec.contains(ExecFlag::CycleStart) {
                self.cycle_start(exec);
                sys.exec.clear(ExecFlag::CycleStart);
            }

            if sys.cycle_stop() {
                self.cycle_stop();
                sys.clear_cycle_stop();
            }
        }

        self.update_overrides();

        if sys.state().prepares_segments() {
            self.prepare_segments();
        }
    }

    /// Feed hold, motion cancel, safety door and sleep requests
    fn begin_hold(&mut self, exec: FlagSet<ExecFlag>) {
        let sys = self.sys;
        let state = sys.state();

        if !matches!(state, MachineState::Alarm | MachineState::CheckMode) {
            if matches!(state, MachineState::Cycle | MachineState::Jog)
                && !sys.suspend.contains(SuspendFlag::MotionCancel)
                && !sys.suspend.contains(SuspendFlag::JogCancel)
            {
                // Decelerate to a stop from the speed already prepared
                self.preparer.update_plan_block_parameters(&mut self.planner);
                sys.step_control
                    .store(FlagSet::empty().with(StepControl::ExecuteHold));
                if state == MachineState::Jog && !exec.contains(ExecFlag::Sleep) {
                    sys.suspend.set(SuspendFlag::JogCancel);
                }
            }

            if sys.state() == MachineState::Idle {
                sys.suspend
                    .store(FlagSet::empty().with(SuspendFlag::HoldComplete));
            }

            if exec.contains(ExecFlag::MotionCancel) {
                // A jog cancel already covers every queued jog block
                if sys.state() != MachineState::Jog {
                    sys.suspend.set(SuspendFlag::MotionCancel);
                }
                sys.exec.clear(ExecFlag::MotionCancel);
            }

            if exec.contains(ExecFlag::FeedHold) {
                if !matches!(
                    sys.state(),
                    MachineState::SafetyDoor | MachineState::Jog | MachineState::Sleep
                ) {
                    sys.set_state(MachineState::Hold);
                }
                sys.exec.clear(ExecFlag::FeedHold);
            }

            if exec.contains(ExecFlag::SafetyDoor) {
                self.io.reporter.feedback(Feedback::SafetyDoorAjar);
                // A jog finishes its cancel before the door takes over
                if !sys.suspend.contains(SuspendFlag::JogCancel) {
                    if sys.state() == MachineState::SafetyDoor
                        && sys.suspend.contains(SuspendFlag::InitiateRestore)
                    {
                        sys.suspend.clear(SuspendFlag::RetractComplete);
                        sys.suspend.clear(SuspendFlag::InitiateRestore);
                        sys.suspend.clear(SuspendFlag::RestoreComplete);
                    }
                    if sys.state() != MachineState::Sleep {
                        sys.set_state(MachineState::SafetyDoor);
                    }
                    sys.exec.clear(ExecFlag::SafetyDoor);
                }
                sys.suspend.set(SuspendFlag::SafetyDoorAjar);
            }
        }

        if exec.contains(ExecFlag::Sleep) {
            if sys.state() == MachineState::Alarm {
                sys.suspend.set(SuspendFlag::RetractComplete);
                sys.suspend.set(SuspendFlag::HoldComplete);
            }
            sys.set_state(MachineState::Sleep);
            sys.exec.clear(ExecFlag::Sleep);
        }
    }

    fn cycle_start(&mut self, exec: FlagSet<ExecFlag>) {
        let sys = self.sys;
        // Never resume in the same pass as a new hold
        if exec.contains(ExecFlag::FeedHold)
            || exec.contains(ExecFlag::MotionCancel)
            || exec.contains(ExecFlag::SafetyDoor)
        {
            return;
        }

        if sys.state() == MachineState::SafetyDoor
            && !sys.suspend.contains(SuspendFlag::SafetyDoorAjar)
        {
            if sys.suspend.contains(SuspendFlag::RestoreComplete) {
                sys.set_state(MachineState::Idle);
            } else if sys.suspend.contains(SuspendFlag::RetractComplete) {
                sys.suspend.set(SuspendFlag::InitiateRestore);
            }
        }

        let state = sys.state();
        if state == MachineState::Idle
            || (state == MachineState::Hold && sys.suspend.contains(SuspendFlag::HoldComplete))
        {
            sys.step_control.clear_all();
            if self.planner.current_block().is_some()
                && !sys.suspend.contains(SuspendFlag::MotionCancel)
            {
                sys.suspend.clear_all();
                sys.set_state(MachineState::Cycle);
                self.prepare_segments();
                self.wake_up();
            } else {
                sys.suspend.clear_all();
                sys.set_state(MachineState::Idle);
            }
        }
    }

    /// The step interrupt ran out of segments
    fn cycle_stop(&mut self) {
        let sys = self.sys;
        let state = sys.state();
        if matches!(
            state,
            MachineState::Hold | MachineState::SafetyDoor | MachineState::Sleep
        ) && !sys.soft_limit()
            && !sys.suspend.contains(SuspendFlag::JogCancel)
        {
            // Hold complete; stay suspended until resumed
            self.replan_cycle();
            if sys.step_control.contains(StepControl::ExecuteHold) {
                sys.suspend.set(SuspendFlag::HoldComplete);
            }
            sys.step_control.clear(StepControl::ExecuteHold);
            sys.step_control.clear(StepControl::ExecuteSysMotion);
            return;
        }

        if sys.suspend.contains(SuspendFlag::JogCancel) {
            sys.step_control.clear_all();
            self.planner.reset();
            self.reset_stepper();
            if self.inflight == Some(true) {
                self.inflight = None;
            }
            sys.request_parser_resync();
            self.planner.sync_position(&sys.machine_position());
        }
        if sys.suspend.contains(SuspendFlag::SafetyDoorAjar) {
            // Door opened during a jog
            sys.suspend.clear(SuspendFlag::JogCancel);
            sys.suspend.set(SuspendFlag::HoldComplete);
            sys.set_state(MachineState::SafetyDoor);
        } else {
            sys.suspend.clear_all();
            sys.set_state(MachineState::Idle);
        }
    }

    /// Re-profile the executing block from the speed already prepared, so a
    /// resume or a new override applies inside the block
    fn replan_cycle(&mut self) {
        self.preparer.update_plan_block_parameters(&mut self.planner);
        self.planner.cycle_reinitialize();
    }

    fn update_overrides(&mut self) {
        let sys = self.sys;
        let feed = sys.requested_feed_override();
        let rapid = sys.requested_rapid_override();
        if feed != sys.feed_override() || rapid != sys.rapid_override() {
            sys.apply_motion_overrides(feed, rapid);
            self.planner.apply_overrides(feed, rapid);
            self.replan_cycle();
        }

        let spindle = sys.requested_spindle_override();
        if spindle != sys.spindle_override() {
            sys.step_control.set(StepControl::UpdateSpindleRpm);
            sys.apply_spindle_override(spindle);
            if self.spindle != SpindleState::Disable {
                let rpm = self.overridden_rpm(self.spindle_speed);
                self.io.spindle.set_rpm(rpm);
            }
        }
    }

    fn overridden_rpm(&self, rpm: f32) -> f32 {
        rpm * 0.01 * self.sys.spindle_override() as f32
    }

    /// Hold the background context while suspended.
    ///
    /// Doors and sleep de-energize the spindle and coolant once motion has
    /// stopped; a door resume restores them before the cycle continues.
    fn exec_rt_suspend(&mut self) {
        let sys = self.sys;
        let (restore_spindle, restore_speed, restore_coolant) = match self.planner.current_block()
        {
            Some(block) => (block.spindle, block.spindle_speed, block.coolant),
            None => (self.spindle, self.spindle_speed, self.coolant),
        };

        while !sys.suspend.is_empty() {
            if sys.is_aborted() {
                return;
            }

            if sys.suspend.contains(SuspendFlag::HoldComplete) {
                let state = sys.state();
                if matches!(state, MachineState::SafetyDoor | MachineState::Sleep) {
                    if !sys.suspend.contains(SuspendFlag::RetractComplete) {
                        self.io.spindle.stop();
                        self.io.coolant.stop();
                        sys.suspend.set(SuspendFlag::RetractComplete);
                    } else {
                        if state == MachineState::Sleep {
                            self.io.reporter.feedback(Feedback::SleepMode);
                            self.io.spindle.stop();
                            self.io.coolant.stop();
                            self.go_idle();
                            while !sys.is_aborted() {
                                self.poll_realtime_input();
                                self.exec_rt_system();
                            }
                            return;
                        }

                        if state == MachineState::SafetyDoor && !self.io.door.is_ajar() {
                            sys.suspend.clear(SuspendFlag::SafetyDoorAjar);
                        }

                        if sys.suspend.contains(SuspendFlag::InitiateRestore) {
                            if self.spindle != SpindleState::Disable {
                                if self.laser_mode() {
                                    sys.step_control.set(StepControl::UpdateSpindleRpm);
                                } else {
                                    let rpm = self.overridden_rpm(restore_speed);
                                    self.io.spindle.set_state(restore_spindle, rpm);
                                }
                            }
                            if !self.coolant.is_off() {
                                self.io.coolant.set_state(restore_coolant);
                            }
                            sys.suspend.set(SuspendFlag::RestoreComplete);
                            sys.request_cycle_start();
                        }
                    }
                } else if sys.step_control.take(StepControl::UpdateSpindleRpm) {
                    let rpm = self.overridden_rpm(restore_speed);
                    self.io.spindle.set_state(restore_spindle, rpm);
                }
            }

            self.poll_realtime_input();
            self.exec_rt_system();
        }
    }

    /// Bring the motion layer back to a known state after an abort.
    ///
    /// Queues are emptied, the planner is synced to the machine position and
    /// the parser is asked to resync. A machine that aborted from an alarm or
    /// from sleep stays locked in the alarm state.
    pub fn reinitialize(&mut self) {
        let sys = self.sys;
        sys.set_abort(false);
        sys.exec.clear_all();
        sys.suspend.clear_all();
        sys.step_control.clear_all();
        sys.clear_cycle_stop();
        sys.set_soft_limit(false);
        sys.set_probe_state(ProbeState::Off);
        sys.reset_overrides();
        sys.apply_motion_overrides(feed_override::DEFAULT, rapid_override::DEFAULT);
        sys.apply_spindle_override(spindle_override::DEFAULT);

        self.inflight = None;
        self.stop_spindle_and_coolant();
        self.planner.reset();
        self.reset_stepper();
        self.planner.sync_position(&sys.machine_position());
        sys.request_parser_resync();

        if matches!(sys.state(), MachineState::Alarm | MachineState::Sleep) {
            self.io.reporter.feedback(Feedback::AlarmLock);
            sys.set_state(MachineState::Alarm);
        } else {
            sys.set_state(MachineState::Idle);
            if self.io.door.is_ajar() {
                sys.request_safety_door();
                self.execute_realtime();
            }
        }
        sys.set_hard_limits_armed(self.settings.hard_limits);
    }
}
