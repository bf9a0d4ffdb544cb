//! Soft limits

use super::control::MotionControl;
use super::position::Position;
use crate::config::Settings;
use crate::planner::Planner;
use crate::system::{Alarm, MachineState};

/// True if `target` lies outside the travel of any axis with a travel limit
pub fn exceeds_travel(target: &Position, settings: &Settings) -> bool {
    (0..settings.n_axis()).any(|axis| {
        settings.axes[axis].max_travel > 0.0
            && (target[axis] < settings.min_position(axis)
                || target[axis] > settings.max_position(axis))
    })
}

impl<P: Planner> MotionControl<'_, P> {
    /// Stop everything and raise a soft limit alarm if `target` is out of travel.
    ///
    /// A running cycle is brought to a controlled stop first so the machine
    /// position stays valid. Returns with the abort set.
    pub fn soft_limit_check(&mut self, target: &Position) {
        if !exceeds_travel(target, self.settings) {
            return;
        }
        self.sys.set_soft_limit(true);
        if self.sys.state() == MachineState::Cycle {
            self.sys.request_feed_hold();
            loop {
                self.execute_realtime();
                if self.sys.is_aborted() {
                    return;
                }
                if self.sys.state() == MachineState::Idle {
                    break;
                }
            }
        }
        self.reset();
        self.sys.raise_alarm(Alarm::SoftLimit);
        self.execute_realtime();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_travel_check() {
        let mut settings = Settings::default();
        settings.axes[0].max_travel = 100.0;
        settings.axes[0].home_mpos = 0.0;
        // Default homing direction: machine space is negative
        let mut target = [0.0; 6];
        target[0] = -50.0;
        assert!(!exceeds_travel(&target, &settings));
        target[0] = 1.0;
        assert!(exceeds_travel(&target, &settings));
        target[0] = -100.5;
        assert!(exceeds_travel(&target, &settings));
    }

    #[test]
    fn test_zero_travel_is_unlimited() {
        let mut settings = Settings::default();
        settings.axes[1].max_travel = 0.0;
        let mut target = [0.0; 6];
        target[1] = 5000.0;
        assert!(!exceeds_travel(&target, &settings));
    }
}
