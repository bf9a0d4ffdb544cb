//! Shared system context
//!
//! One [`SystemContext`] lives for the whole program (a `static` on the
//! firmware). The background context and the step interrupt communicate only
//! through its atomics and the two segment queues.

use portable_atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use super::flags::{AtomicFlags, ExecFlag, StepControl, SuspendFlag};
use super::state::{Alarm, MachineState, ProbeState, SquaringMode};
use crate::motion::position::{AxisMask, StepPosition, MAX_N_AXIS};

/// Feed override limits and increments (percent)
pub mod feed_override {
    pub const DEFAULT: u8 = 100;
    pub const MAX: u8 = 200;
    pub const MIN: u8 = 10;
    pub const COARSE: u8 = 10;
    pub const FINE: u8 = 1;
}

/// Rapid override presets (percent)
pub mod rapid_override {
    pub const DEFAULT: u8 = 100;
    pub const MEDIUM: u8 = 50;
    pub const LOW: u8 = 25;
    pub const EXTRA_LOW: u8 = 5;
}

/// Spindle speed override limits and increments (percent)
pub mod spindle_override {
    pub const DEFAULT: u8 = 100;
    pub const MAX: u8 = 200;
    pub const MIN: u8 = 10;
    pub const COARSE: u8 = 10;
    pub const FINE: u8 = 1;
}

const NO_ALARM: u8 = 0;

/// Override values requested by realtime commands and the values in effect
struct Overrides {
    feed_requested: AtomicU8,
    rapid_requested: AtomicU8,
    spindle_requested: AtomicU8,
    feed: AtomicU8,
    rapid: AtomicU8,
    spindle: AtomicU8,
}

/// Machine-wide state shared by every context
pub struct SystemContext {
    state: AtomicU8,
    abort: AtomicBool,
    alarm: AtomicU8,
    reset_request: AtomicBool,
    /// Realtime execution requests
    pub exec: AtomicFlags<ExecFlag>,
    /// Suspend bookkeeping
    pub suspend: AtomicFlags<SuspendFlag>,
    /// Segment preparer control
    pub step_control: AtomicFlags<StepControl>,
    cycle_stop: AtomicBool,
    stepper_flush: AtomicBool,
    stepper_idle: AtomicBool,
    stepper_busy: AtomicBool,
    probe_state: AtomicU8,
    probe_away: AtomicBool,
    probe_succeeded: AtomicBool,
    probe_position: [AtomicI32; MAX_N_AXIS],
    homing_axis_lock: AtomicU8,
    ganged_mode: AtomicU8,
    soft_limit: AtomicBool,
    hard_limits_armed: AtomicBool,
    parser_resync: AtomicBool,
    overrides: Overrides,
    position: [AtomicI32; MAX_N_AXIS],
}

impl SystemContext {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(MachineState::Idle as u8),
            abort: AtomicBool::new(false),
            alarm: AtomicU8::new(NO_ALARM),
            reset_request: AtomicBool::new(false),
            exec: AtomicFlags::new(),
            suspend: AtomicFlags::new(),
            step_control: AtomicFlags::new(),
            cycle_stop: AtomicBool::new(false),
            stepper_flush: AtomicBool::new(false),
            stepper_idle: AtomicBool::new(true),
            stepper_busy: AtomicBool::new(false),
            probe_state: AtomicU8::new(ProbeState::Off as u8),
            probe_away: AtomicBool::new(false),
            probe_succeeded: AtomicBool::new(false),
            probe_position: [
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
            ],
            homing_axis_lock: AtomicU8::new(AxisMask::ALL.bits()),
            ganged_mode: AtomicU8::new(SquaringMode::Dual as u8),
            soft_limit: AtomicBool::new(false),
            hard_limits_armed: AtomicBool::new(false),
            parser_resync: AtomicBool::new(false),
            overrides: Overrides {
                feed_requested: AtomicU8::new(feed_override::DEFAULT),
                rapid_requested: AtomicU8::new(rapid_override::DEFAULT),
                spindle_requested: AtomicU8::new(spindle_override::DEFAULT),
                feed: AtomicU8::new(feed_override::DEFAULT),
                rapid: AtomicU8::new(rapid_override::DEFAULT),
                spindle: AtomicU8::new(spindle_override::DEFAULT),
            },
            position: [
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
            ],
        }
    }

    // ---- state and alarms ----

    pub fn state(&self) -> MachineState {
        MachineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: MachineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Pending alarm, if any
    pub fn alarm(&self) -> Option<Alarm> {
        Alarm::from_code(self.alarm.load(Ordering::Acquire))
    }

    /// Latch an alarm, replacing any pending one
    pub fn raise_alarm(&self, alarm: Alarm) {
        self.alarm.store(alarm.code(), Ordering::Release);
    }

    /// Latch an alarm only if none is pending
    pub fn raise_alarm_if_clear(&self, alarm: Alarm) {
        let _ = self.alarm.compare_exchange(
            NO_ALARM,
            alarm.code(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn take_alarm(&self) -> Option<Alarm> {
        Alarm::from_code(self.alarm.swap(NO_ALARM, Ordering::AcqRel))
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub fn set_abort(&self, abort: bool) {
        self.abort.store(abort, Ordering::Release);
    }

    // ---- realtime requests ----

    /// Ask the motion layer to run its reset routine at the next realtime check
    pub fn request_reset(&self) {
        self.reset_request.store(true, Ordering::Release);
    }

    /// Reset requested or already in progress
    pub(crate) fn reset_requested(&self) -> bool {
        self.reset_request.load(Ordering::Acquire) || self.exec.contains(ExecFlag::Reset)
    }

    pub(crate) fn take_reset_request(&self) -> bool {
        self.reset_request.swap(false, Ordering::AcqRel)
    }

    pub fn request_cycle_start(&self) {
        self.exec.set(ExecFlag::CycleStart);
    }

    pub fn request_feed_hold(&self) {
        self.exec.set(ExecFlag::FeedHold);
    }

    pub fn request_motion_cancel(&self) {
        self.exec.set(ExecFlag::MotionCancel);
    }

    pub fn request_safety_door(&self) {
        self.exec.set(ExecFlag::SafetyDoor);
    }

    pub fn request_sleep(&self) {
        self.exec.set(ExecFlag::Sleep);
    }

    pub fn request_status_report(&self) {
        self.exec.set(ExecFlag::StatusReport);
    }

    /// Cancel a jog in flight; ignored outside the Jog state
    pub fn request_jog_cancel(&self) {
        if self.state() == MachineState::Jog {
            self.exec.set(ExecFlag::MotionCancel);
        }
    }

    // ---- step interrupt handshake ----

    /// Raised by the step interrupt when the segment ring runs dry
    pub fn signal_cycle_stop(&self) {
        self.cycle_stop.store(true, Ordering::Release);
    }

    pub fn cycle_stop(&self) -> bool {
        self.cycle_stop.load(Ordering::Acquire)
    }

    pub fn clear_cycle_stop(&self) {
        self.cycle_stop.store(false, Ordering::Release);
    }

    /// Ask the consumer side to drop every queued segment and block
    pub fn request_stepper_flush(&self) {
        self.stepper_flush.store(true, Ordering::Release);
    }

    pub fn stepper_flush_pending(&self) -> bool {
        self.stepper_flush.load(Ordering::Acquire)
    }

    pub(crate) fn complete_stepper_flush(&self) {
        self.stepper_flush.store(false, Ordering::Release);
    }

    /// Drivers went idle and may be disabled after the idle lock time
    pub fn stepper_idle(&self) -> bool {
        self.stepper_idle.load(Ordering::Acquire)
    }

    pub(crate) fn set_stepper_idle(&self, idle: bool) {
        self.stepper_idle.store(idle, Ordering::Release);
    }

    /// Enter the step interrupt body. Returns false if it is already running.
    pub(crate) fn try_enter_step_isr(&self) -> bool {
        self.stepper_busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn exit_step_isr(&self) {
        self.stepper_busy.store(false, Ordering::Release);
    }

    // ---- probing ----

    pub fn probe_state(&self) -> ProbeState {
        match self.probe_state.load(Ordering::Acquire) {
            1 => ProbeState::Active,
            _ => ProbeState::Off,
        }
    }

    pub fn set_probe_state(&self, state: ProbeState) {
        self.probe_state.store(state as u8, Ordering::Release);
    }

    /// Probing away from the workpiece: contact means the probe opened
    pub fn probe_away(&self) -> bool {
        self.probe_away.load(Ordering::Acquire)
    }

    pub fn set_probe_away(&self, away: bool) {
        self.probe_away.store(away, Ordering::Release);
    }

    pub fn probe_succeeded(&self) -> bool {
        self.probe_succeeded.load(Ordering::Acquire)
    }

    pub fn set_probe_succeeded(&self, succeeded: bool) {
        self.probe_succeeded.store(succeeded, Ordering::Release);
    }

    /// Machine position latched at the last probe contact
    pub fn probe_position(&self) -> StepPosition {
        let mut steps = [0; MAX_N_AXIS];
        for (value, atomic) in steps.iter_mut().zip(self.probe_position.iter()) {
            *value = atomic.load(Ordering::Acquire);
        }
        steps
    }

    /// Latch the current machine position as the probe position
    pub fn latch_probe_position(&self) {
        for (probe, pos) in self.probe_position.iter().zip(self.position.iter()) {
            probe.store(pos.load(Ordering::Acquire), Ordering::Release);
        }
    }

    // ---- homing ----

    /// Axes still allowed to step during homing
    pub fn homing_axis_lock(&self) -> AxisMask {
        AxisMask::from_bits(self.homing_axis_lock.load(Ordering::Acquire))
    }

    pub fn set_homing_axis_lock(&self, mask: AxisMask) {
        self.homing_axis_lock.store(mask.bits(), Ordering::Release);
    }

    pub fn ganged_mode(&self) -> SquaringMode {
        SquaringMode::from_u8(self.ganged_mode.load(Ordering::Acquire))
    }

    pub fn set_ganged_mode(&self, mode: SquaringMode) {
        self.ganged_mode.store(mode as u8, Ordering::Release);
    }

    // ---- limits ----

    /// A soft limit violation is being handled
    pub fn soft_limit(&self) -> bool {
        self.soft_limit.load(Ordering::Acquire)
    }

    pub fn set_soft_limit(&self, active: bool) {
        self.soft_limit.store(active, Ordering::Release);
    }

    /// Hard limit monitoring is active (off for the duration of homing)
    pub fn hard_limits_armed(&self) -> bool {
        self.hard_limits_armed.load(Ordering::Acquire)
    }

    pub fn set_hard_limits_armed(&self, armed: bool) {
        self.hard_limits_armed.store(armed, Ordering::Release);
    }

    /// Hard limit switch closed: latch the alarm and reset
    pub fn trip_hard_limit(&self) {
        let state = self.state();
        if self.hard_limits_armed()
            && state != MachineState::Alarm
            && state != MachineState::Homing
            && self.alarm().is_none()
        {
            self.raise_alarm(Alarm::HardLimit);
            self.request_reset();
        }
    }

    // ---- parser position sync ----

    /// Ask the parser to reload its position from the machine position
    pub fn request_parser_resync(&self) {
        self.parser_resync.store(true, Ordering::Release);
    }

    pub fn take_parser_resync(&self) -> bool {
        self.parser_resync.swap(false, Ordering::AcqRel)
    }

    // ---- overrides ----

    /// Feed override in effect (percent)
    pub fn feed_override(&self) -> u8 {
        self.overrides.feed.load(Ordering::Acquire)
    }

    /// Rapid override in effect (percent)
    pub fn rapid_override(&self) -> u8 {
        self.overrides.rapid.load(Ordering::Acquire)
    }

    /// Spindle speed override in effect (percent)
    pub fn spindle_override(&self) -> u8 {
        self.overrides.spindle.load(Ordering::Acquire)
    }

    pub fn requested_feed_override(&self) -> u8 {
        self.overrides.feed_requested.load(Ordering::Acquire)
    }

    pub fn requested_rapid_override(&self) -> u8 {
        self.overrides.rapid_requested.load(Ordering::Acquire)
    }

    pub fn requested_spindle_override(&self) -> u8 {
        self.overrides.spindle_requested.load(Ordering::Acquire)
    }

    pub fn request_feed_override(&self, percent: u8) {
        let value = percent.clamp(feed_override::MIN, feed_override::MAX);
        self.overrides.feed_requested.store(value, Ordering::Release);
    }

    /// Step the requested feed override up or down, saturating at the limits
    pub fn adjust_feed_override(&self, delta: i16) {
        let value = (self.requested_feed_override() as i16 + delta)
            .clamp(feed_override::MIN as i16, feed_override::MAX as i16);
        self.overrides
            .feed_requested
            .store(value as u8, Ordering::Release);
    }

    pub fn request_rapid_override(&self, percent: u8) {
        self.overrides
            .rapid_requested
            .store(percent.min(rapid_override::DEFAULT), Ordering::Release);
    }

    pub fn request_spindle_override(&self, percent: u8) {
        let value = percent.clamp(spindle_override::MIN, spindle_override::MAX);
        self.overrides
            .spindle_requested
            .store(value, Ordering::Release);
    }

    pub fn adjust_spindle_override(&self, delta: i16) {
        let value = (self.requested_spindle_override() as i16 + delta).clamp(
            spindle_override::MIN as i16,
            spindle_override::MAX as i16,
        );
        self.overrides
            .spindle_requested
            .store(value as u8, Ordering::Release);
    }

    pub(crate) fn apply_motion_overrides(&self, feed: u8, rapid: u8) {
        self.overrides.feed.store(feed, Ordering::Release);
        self.overrides.rapid.store(rapid, Ordering::Release);
    }

    pub(crate) fn apply_spindle_override(&self, spindle: u8) {
        self.overrides.spindle.store(spindle, Ordering::Release);
    }

    /// Restore every override to 100%
    pub fn reset_overrides(&self) {
        self.request_feed_override(feed_override::DEFAULT);
        self.request_rapid_override(rapid_override::DEFAULT);
        self.request_spindle_override(spindle_override::DEFAULT);
    }

    // ---- machine position ----

    /// Machine position in steps
    pub fn machine_position(&self) -> StepPosition {
        let mut steps = [0; MAX_N_AXIS];
        for (value, atomic) in steps.iter_mut().zip(self.position.iter()) {
            *value = atomic.load(Ordering::Acquire);
        }
        steps
    }

    /// Overwrite the machine position. Only valid while the step interrupt is idle.
    pub fn set_machine_position(&self, steps: &StepPosition) {
        for (atomic, value) in self.position.iter().zip(steps.iter()) {
            atomic.store(*value, Ordering::Release);
        }
    }

    /// Overwrite one axis. Only valid while the step interrupt is idle.
    pub fn set_axis_position(&self, axis: usize, steps: i32) {
        if let Some(atomic) = self.position.get(axis) {
            atomic.store(steps, Ordering::Release);
        }
    }

    /// Count one step event; called only by the step interrupt
    #[inline]
    pub(crate) fn count_step(&self, axis: usize, negative: bool) {
        if negative {
            self.position[axis].fetch_sub(1, Ordering::Relaxed);
        } else {
            self.position[axis].fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_alarm_wins_when_conditional() {
        let sys = SystemContext::new();
        sys.raise_alarm_if_clear(Alarm::HomingFailApproach);
        sys.raise_alarm_if_clear(Alarm::HomingFailReset);
        assert_eq!(sys.alarm(), Some(Alarm::HomingFailApproach));
        sys.raise_alarm(Alarm::SoftLimit);
        assert_eq!(sys.take_alarm(), Some(Alarm::SoftLimit));
        assert_eq!(sys.alarm(), None);
    }

    #[test]
    fn test_feed_override_saturates() {
        let sys = SystemContext::new();
        for _ in 0..20 {
            sys.adjust_feed_override(feed_override::COARSE as i16);
        }
        assert_eq!(sys.requested_feed_override(), feed_override::MAX);
        for _ in 0..40 {
            sys.adjust_feed_override(-(feed_override::COARSE as i16));
        }
        assert_eq!(sys.requested_feed_override(), feed_override::MIN);
    }

    #[test]
    fn test_jog_cancel_only_while_jogging() {
        let sys = SystemContext::new();
        sys.request_jog_cancel();
        assert!(!sys.exec.contains(ExecFlag::MotionCancel));
        sys.set_state(MachineState::Jog);
        sys.request_jog_cancel();
        assert!(sys.exec.contains(ExecFlag::MotionCancel));
    }

    #[test]
    fn test_step_counting() {
        let sys = SystemContext::new();
        sys.count_step(0, false);
        sys.count_step(0, false);
        sys.count_step(1, true);
        assert_eq!(sys.machine_position(), [2, -1, 0, 0, 0, 0]);
        sys.latch_probe_position();
        assert_eq!(sys.probe_position(), [2, -1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_hard_limit_ignored_while_homing() {
        let sys = SystemContext::new();
        sys.set_hard_limits_armed(true);
        sys.set_state(MachineState::Homing);
        sys.trip_hard_limit();
        assert_eq!(sys.alarm(), None);
        sys.set_state(MachineState::Cycle);
        sys.trip_hard_limit();
        assert_eq!(sys.alarm(), Some(Alarm::HardLimit));
        assert!(sys.take_reset_request());
    }
}
