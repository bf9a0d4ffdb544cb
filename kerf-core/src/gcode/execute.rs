//! Block execution
//!
//! Runs a validated block in the fixed order of the G-code execution
//! sequence. Validation has already rejected anything that could fail, so
//! the parser state is committed as execution proceeds; only a missing user
//! I/O port can still reject the line part way through.

use super::block::{AxisCommand, ParserBlock};
use super::modal::{CoordIndex, Distance, FeedMode, Motion, NonModal, Plane, ProgramFlow, ToolLength};
use super::parser::Parser;
use super::state::TOOL_LENGTH_OFFSET_AXIS;
use super::GcodeError;
use crate::motion::{MotionControl, ProbeFlags, ProbeOutcome};
use crate::planner::{PlanLineData, Planner};
use crate::system::MachineState;
use crate::traits::{CoolantState, Feedback, SpindleState};

impl Parser {
    pub(super) fn execute_block<P: Planner>(
        &mut self,
        mut block: ParserBlock,
        line_number: Option<u32>,
        mc: &mut MotionControl<'_, P>,
    ) -> Result<(), GcodeError> {
        let flags = block.flags;
        let mut data = PlanLineData::default();

        self.state.line_number = line_number;
        data.line_number = line_number;

        self.state.modal.feed_mode = block.modal.feed_mode;
        data.condition.inverse_time = block.modal.feed_mode == FeedMode::InverseTime;

        self.state.feed_rate = block.values.f;
        data.feed_rate = self.state.feed_rate;

        if self.state.spindle_speed != block.values.s || flags.laser_force_sync {
            if self.state.modal.spindle != SpindleState::Disable && !flags.laser_is_motion {
                let rpm = if flags.laser_disable {
                    0.0
                } else {
                    block.values.s
                };
                mc.spindle_sync(self.state.modal.spindle, rpm);
            }
            self.state.spindle_speed = block.values.s;
            mc.set_programmed_spindle_speed(block.values.s);
        }
        // Restricted laser motions run with the laser off
        if !flags.laser_disable {
            data.spindle_speed = self.state.spindle_speed;
        }

        if self.state.modal.spindle != block.modal.spindle {
            mc.spindle_sync(block.modal.spindle, data.spindle_speed);
            mc.set_programmed_spindle_speed(self.state.spindle_speed);
            self.state.modal.spindle = block.modal.spindle;
        }
        data.spindle = self.state.modal.spindle;

        if !block.coolant.is_empty() {
            self.state.modal.coolant = block.coolant.apply(self.state.modal.coolant);
            mc.coolant_sync(self.state.modal.coolant);
        }
        data.coolant = self.state.modal.coolant;

        if let Some(io) = block.io_control {
            let applied = if io.is_digital() {
                port_index(block.values.p)
                    .is_some_and(|port| mc.set_digital(port, io.turns_on(), io.is_synchronized()))
            } else {
                u8::try_from(block.values.e).is_ok_and(|port| {
                    mc.set_analog(port, block.values.q, io.is_synchronized())
                })
            };
            if !applied {
                return Err(GcodeError::PParamMaxExceeded);
            }
        }

        self.state.modal.override_control = block.modal.override_control;

        if block.non_modal == NonModal::Dwell {
            mc.dwell(block.values.p);
        }

        self.state.modal.plane = block.modal.plane;
        self.state.modal.units = block.modal.units;

        if block.axis_command == AxisCommand::ToolLengthOffset {
            self.state.modal.tool_length = block.modal.tool_length;
            if self.state.modal.tool_length == ToolLength::Cancel {
                block.values.xyz[TOOL_LENGTH_OFFSET_AXIS] = 0.0;
            }
            self.state.tool_length_offset = block.values.xyz[TOOL_LENGTH_OFFSET_AXIS];
        }

        if self.state.modal.coord_select != block.modal.coord_select {
            self.state.modal.coord_select = block.modal.coord_select;
            self.state.coord_system = block.coord_system;
        }

        self.state.modal.distance = block.modal.distance;

        match block.non_modal {
            NonModal::SetCoordinateData => {
                self.coords.set(block.coord_target, &block.coord_data);
                if self.state.modal.coord_select == block.coord_target {
                    self.state.coord_system = block.coord_data;
                }
            }
            NonModal::GoHome0 | NonModal::GoHome1 => {
                data.condition.rapid = true;
                if block.axis_command != AxisCommand::None {
                    mc.submit_linear_move(&block.values.xyz, &data);
                }
                mc.submit_linear_move(&block.coord_data, &data);
                self.state.position = block.coord_data;
            }
            NonModal::SetHome0 => self.coords.set(CoordIndex::G28, &self.state.position),
            NonModal::SetHome1 => self.coords.set(CoordIndex::G30, &self.state.position),
            NonModal::SetCoordinateOffset => self.state.coord_offset = block.values.xyz,
            NonModal::ResetCoordinateOffset => self.state.coord_offset = Default::default(),
            _ => {}
        }

        self.state.modal.motion = block.modal.motion;
        if self.state.modal.motion != Motion::None && block.axis_command == AxisCommand::MotionMode {
            self.execute_motion(&block, &mut data, mc);
        }

        self.state.modal.program_flow = block.modal.program_flow;
        self.execute_program_flow(mc);
        self.state.modal.program_flow = ProgramFlow::Running;
        Ok(())
    }

    fn execute_motion<P: Planner>(
        &mut self,
        block: &ParserBlock,
        data: &mut PlanLineData,
        mc: &mut MotionControl<'_, P>,
    ) {
        let target = block.values.xyz;
        let outcome = match self.state.modal.motion {
            Motion::Seek => {
                data.condition.rapid = true;
                mc.submit_linear_move(&target, data);
                ProbeOutcome::Target
            }
            Motion::Linear => {
                mc.submit_linear_move(&target, data);
                ProbeOutcome::Target
            }
            Motion::CwArc | Motion::CcwArc => {
                mc.submit_arc_move(
                    &target,
                    data,
                    &self.state.position,
                    &block.values.ijk,
                    block.values.r,
                    self.state.modal.plane.axes(),
                    self.state.modal.motion == Motion::CwArc,
                );
                ProbeOutcome::Target
            }
            _ => {
                let flags = ProbeFlags {
                    away: block.flags.probe_away,
                    no_error: block.flags.probe_no_error,
                };
                mc.run_probe_cycle(&target, data, flags)
            }
        };

        // The parser position is the target even while the machine is still moving
        match outcome {
            ProbeOutcome::Target => self.state.position = target,
            ProbeOutcome::System => self.sync_position(mc),
            ProbeOutcome::None => {}
        }
    }

    fn execute_program_flow<P: Planner>(&mut self, mc: &mut MotionControl<'_, P>) {
        let check_mode = mc.sys().state() == MachineState::CheckMode;
        match self.state.modal.program_flow {
            ProgramFlow::Running | ProgramFlow::OptionalStop => {}
            ProgramFlow::Paused => {
                mc.buffer_synchronize();
                if !check_mode {
                    mc.sys().request_feed_hold();
                    mc.execute_realtime();
                }
            }
            ProgramFlow::CompletedM2 | ProgramFlow::CompletedM30 => {
                mc.buffer_synchronize();
                let modal = &mut self.state.modal;
                modal.motion = Motion::Linear;
                modal.plane = Plane::XY;
                modal.distance = Distance::Absolute;
                modal.feed_mode = FeedMode::UnitsPerMinute;
                modal.coord_select = CoordIndex::G54;
                modal.spindle = SpindleState::Disable;
                modal.coolant = CoolantState::OFF;
                modal.override_control = false;
                if !check_mode {
                    self.load_coord_system();
                    mc.stop_spindle_and_coolant();
                }
                mc.io().reporter.feedback(Feedback::ProgramEnd);
            }
        }
    }
}

/// Digital port number from a P word
fn port_index(p: f32) -> Option<u8> {
    if (0.0..=f32::from(u8::MAX)).contains(&p) {
        Some(libm::truncf(p) as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_index() {
        assert_eq!(port_index(0.0), Some(0));
        assert_eq!(port_index(3.0), Some(3));
        assert_eq!(port_index(2.7), Some(2));
        assert_eq!(port_index(-1.0), None);
        assert_eq!(port_index(300.0), None);
    }
}
