//! Homing cycle
//!
//! Each pass plans a single system motion toward (or away from) the limit
//! switches and runs it with the axis lock: an axis stops stepping the
//! moment its switch closes. A seek pass is followed by `locate_cycles`
//! pull-off and slow approach pairs and a final pull-off, after which the
//! homed axes are assigned their machine positions.

use super::control::MotionControl;
use super::position::{steps_to_mpos, AxisMask};
use crate::gcode::GcodeError;
use crate::planner::{PlanLineData, Planner};
use crate::system::{Alarm, ExecFlag, FlagSet, SquaringMode, StepControl};
use crate::traits::ClientId;

/// Seek distance as a multiple of the largest max travel
pub const HOMING_AXIS_SEARCH_SCALAR: f32 = 1.1;

/// Locate distance as a multiple of the pull-off
pub const HOMING_AXIS_LOCATE_SCALAR: f32 = 5.0;

impl<P: Planner> MotionControl<'_, P> {
    /// Home the axes in `mask`, or every configured homing cycle when empty.
    ///
    /// Hard limits are disarmed for the duration. On success the parser and
    /// planner positions are resynchronized to the new machine position.
    pub fn run_homing_cycle(&mut self, mask: AxisMask) {
        if self.io.kinematics.custom_homing(mask) {
            return;
        }
        if self.io.kinematics.pre_homing(mask) {
            return;
        }

        self.sys.set_hard_limits_armed(false);

        let settings = self.settings;
        if !mask.is_empty() {
            self.home_group(mask);
        } else {
            let cycles = settings.homing.cycles;
            let mut any = false;
            for cycle in cycles.iter().filter(|cycle| !cycle.is_empty()) {
                any = true;
                self.home_group(*cycle);
            }
            if !any {
                self.io
                    .reporter
                    .error(ClientId::SERIAL, GcodeError::HomingNoCycles);
            }
        }

        self.execute_realtime();
        if self.sys.is_aborted() {
            return;
        }

        self.sys.request_parser_resync();
        self.planner.sync_position(&self.sys.machine_position());
        self.io.kinematics.post_homing();

        if self.settings.hard_limits {
            self.sys.set_hard_limits_armed(true);
        }
    }

    /// Home one group. A lone squared axis is homed with both motors, then
    /// each motor alone to square it, then both again.
    fn home_group(&mut self, mask: AxisMask) {
        let homing = &self.settings.homing;
        let locate_cycles = homing.locate_cycles;
        if mask.is_single_axis() && mask.intersects(homing.squared_axes) {
            self.sys.set_ganged_mode(SquaringMode::Dual);
            self.go_home(mask, 0);
            self.sys.set_ganged_mode(SquaringMode::A);
            self.go_home(mask, locate_cycles);
            self.sys.set_ganged_mode(SquaringMode::B);
            self.go_home(mask, locate_cycles);
            self.sys.set_ganged_mode(SquaringMode::Dual);
        } else {
            self.go_home(mask, locate_cycles);
        }
    }

    /// Run the seek, locate and pull-off passes for `mask`
    pub(crate) fn go_home(&mut self, mask: AxisMask, locate_cycles: u8) {
        if self.sys.is_aborted() {
            return;
        }
        let mask = self.io.homing.set_homing_mode(mask, true);
        if mask.is_empty() {
            return;
        }

        let settings = self.settings;
        let homing = &settings.homing;
        let n_axis = settings.n_axis();

        let mut n_cycle = 2 * u32::from(locate_cycles) + 1;
        let mut max_travel: f32 = 0.0;
        for axis in mask.iter().filter(|axis| axis.index() < n_axis) {
            max_travel =
                max_travel.max(HOMING_AXIS_SEARCH_SCALAR * settings.axes[axis.index()].max_travel);
        }

        let mut approach = true;
        let mut rate = homing.seek_rate;

        loop {
            let mut target = steps_to_mpos(&self.sys.machine_position(), settings);
            let mut axislock = AxisMask::NONE;
            let mut n_active = 0u32;
            for idx in (0..n_axis).filter(|&idx| mask.contains_index(idx)) {
                n_active += 1;
                self.sys.set_axis_position(idx, 0);
                let toward_negative = homing.direction_invert.contains_index(idx) == approach;
                target[idx] = if toward_negative {
                    -max_travel
                } else {
                    max_travel
                };
                axislock.insert_index(idx);
            }
            rate *= libm::sqrtf(n_active as f32);
            self.sys.set_homing_axis_lock(axislock);

            self.planner.sync_position(&self.sys.machine_position());
            self.planner
                .buffer_line(&target, &PlanLineData::system_motion(rate));
            self.sys
                .step_control
                .store(FlagSet::empty().with(StepControl::ExecuteSysMotion));
            self.sys.clear_cycle_stop();
            self.prepare_segments();
            self.wake_up();

            loop {
                if approach {
                    axislock = axislock & !self.io.limits.triggered();
                    self.sys.set_homing_axis_lock(axislock);
                }

                self.io.executor.service_pending_commands(self.sys);
                self.prepare_segments();

                let door = self.sys.exec.contains(ExecFlag::SafetyDoor);
                let reset = self.sys.reset_requested();
                let cycle_stop = self.sys.cycle_stop();
                if door || reset || cycle_stop {
                    if reset {
                        self.sys.raise_alarm(Alarm::HomingFailReset);
                    }
                    if door {
                        self.sys.raise_alarm(Alarm::HomingFailDoor);
                    }
                    if !approach && self.io.limits.triggered().intersects(mask) {
                        self.sys.raise_alarm(Alarm::HomingFailPulloff);
                    }
                    if approach && cycle_stop {
                        self.sys.raise_alarm(Alarm::HomingFailApproach);
                    }

                    if self.sys.alarm().is_some() {
                        self.io.homing.set_homing_mode(mask, false);
                        self.reset();
                        self.execute_realtime();
                        return;
                    }
                    // Pull-off complete
                    self.sys.clear_cycle_stop();
                    break;
                }

                if axislock.is_empty() {
                    break;
                }
            }

            self.reset_stepper();
            self.planner.reset();
            self.io.executor.wait_ms(homing.debounce_ms);

            approach = !approach;
            if approach {
                max_travel = homing.pulloff * HOMING_AXIS_LOCATE_SCALAR;
                rate = homing.feed_rate;
            } else {
                max_travel = homing.pulloff;
                rate = homing.seek_rate;
            }

            if n_cycle == 0 {
                break;
            }
            n_cycle -= 1;
        }

        for idx in (0..n_axis).filter(|&idx| mask.contains_index(idx)) {
            let axis = &settings.axes[idx];
            let mpos = if homing.direction_invert.contains_index(idx) {
                axis.home_mpos + homing.pulloff
            } else {
                axis.home_mpos - homing.pulloff
            };
            self.sys
                .set_axis_position(idx, (mpos * axis.steps_per_mm) as i32);
        }
        self.sys.step_control.clear_all();
        self.io.homing.set_homing_mode(mask, false);
    }
}
