//! Jogging

use super::control::MotionControl;
use super::limits::exceeds_travel;
use super::position::Position;
use crate::gcode::GcodeError;
use crate::planner::{PlanLineData, Planner};
use crate::system::MachineState;

impl<P: Planner> MotionControl<'_, P> {
    /// Queue a jog move and start it if the machine is idle.
    ///
    /// Jogs are checked against the travel limits up front instead of
    /// raising a soft limit alarm. A jog cancelled while waiting for planner
    /// room returns [`GcodeError::JogCancelled`].
    pub fn jog(
        &mut self,
        target: &Position,
        feed_rate: f32,
        data: &PlanLineData,
    ) -> Result<(), GcodeError> {
        let mut data = *data;
        data.feed_rate = feed_rate;
        data.condition.no_feed_override = true;
        data.is_jog = true;

        if self.settings.soft_limits && exceeds_travel(target, self.settings) {
            return Err(GcodeError::TravelExceeded);
        }

        if !self.submit_linear_move(target, &data) {
            return Err(GcodeError::JogCancelled);
        }

        if self.sys.state() == MachineState::Idle && self.planner.current_block().is_some() {
            self.sys.set_state(MachineState::Jog);
            self.prepare_segments();
            self.wake_up();
        }
        Ok(())
    }
}
