//! Line entry point
//!
//! [`Parser::execute_line`] takes one collapsed line from a host connection.
//! `$` lines are system commands; everything else (and `$J=` jog lines) is
//! scanned, validated against the parser state and then executed through
//! [`MotionControl`].

use super::block::{ParserBlock, JOG_PREFIX};
use super::coords::CoordinateTable;
use super::state::ParserState;
use super::words::Word;
use super::GcodeError;
use crate::motion::position::{Axis, AxisMask};
use crate::motion::MotionControl;
use crate::planner::{PlanLineData, Planner};
use crate::system::MachineState;
use crate::traits::{ClientId, Feedback};

/// G-code interpreter state: the parser state and the stored coordinates
#[derive(Debug, Clone, Default)]
pub struct Parser {
    pub(super) state: ParserState,
    pub(super) coords: CoordinateTable,
}

impl Parser {
    pub fn new(coords: CoordinateTable) -> Self {
        let mut parser = Self {
            state: ParserState::default(),
            coords,
        };
        parser.load_coord_system();
        parser
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn coords(&self) -> &CoordinateTable {
        &self.coords
    }

    pub fn coords_mut(&mut self) -> &mut CoordinateTable {
        &mut self.coords
    }

    /// Back to power-up modal state, keeping the stored coordinates.
    ///
    /// The position is reloaded from the machine.
    pub fn reset<P: Planner>(&mut self, mc: &MotionControl<'_, P>) {
        self.state = ParserState::default();
        self.load_coord_system();
        self.sync_position(mc);
    }

    /// Reload the program position from the machine position
    pub fn sync_position<P: Planner>(&mut self, mc: &MotionControl<'_, P>) {
        let n_axis = mc.settings().n_axis();
        let machine = mc.machine_position();
        self.state.position[..n_axis].copy_from_slice(&machine[..n_axis]);
    }

    pub(super) fn load_coord_system(&mut self) {
        self.state.coord_system = self.coords.get(self.state.modal.coord_select);
    }

    /// Execute one collapsed line.
    ///
    /// A line that fails validation leaves the parser state untouched.
    pub fn execute_line<P: Planner>(
        &mut self,
        line: &str,
        client: ClientId,
        mc: &mut MotionControl<'_, P>,
    ) -> Result<(), GcodeError> {
        if mc.sys().take_parser_resync() {
            self.sync_position(mc);
        }
        if line.is_empty() {
            return Ok(());
        }

        if line.starts_with(JOG_PREFIX) {
            if !matches!(mc.sys().state(), MachineState::Idle | MachineState::Jog) {
                return Err(GcodeError::IdleError);
            }
            return self.execute_gcode(line, mc);
        }
        if let Some(command) = line.strip_prefix('$') {
            return self.execute_system_command(command, client, mc);
        }

        if matches!(mc.sys().state(), MachineState::Alarm | MachineState::Jog) {
            return Err(GcodeError::SystemLocked);
        }
        self.execute_gcode(line, mc)
    }

    fn execute_gcode<P: Planner>(
        &mut self,
        line: &str,
        mc: &mut MotionControl<'_, P>,
    ) -> Result<(), GcodeError> {
        let settings = mc.settings();
        let mut block = ParserBlock::scan(line, &self.state.modal, settings.n_axis())?;
        let tool_word = block.words.contains(Word::T);
        let line_number = block.words.contains(Word::N).then_some(block.values.n);
        block.validate(&self.state, &self.coords, settings, mc.laser_mode())?;

        if block.flags.jog {
            return self.execute_jog(&block, mc);
        }
        if tool_word {
            self.state.tool = block.values.t;
        }
        self.execute_block(block, line_number, mc)
    }

    /// Jogs only move the parser position; modal state is untouched
    fn execute_jog<P: Planner>(
        &mut self,
        block: &ParserBlock,
        mc: &mut MotionControl<'_, P>,
    ) -> Result<(), GcodeError> {
        let data = PlanLineData {
            spindle_speed: self.state.spindle_speed,
            spindle: self.state.modal.spindle,
            coolant: self.state.modal.coolant,
            ..PlanLineData::default()
        };
        match mc.jog(&block.values.xyz, block.values.f, &data) {
            Ok(()) => {
                self.state.position = block.values.xyz;
                Ok(())
            }
            Err(GcodeError::JogCancelled) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn execute_system_command<P: Planner>(
        &mut self,
        command: &str,
        client: ClientId,
        mc: &mut MotionControl<'_, P>,
    ) -> Result<(), GcodeError> {
        let sys = mc.sys();
        let state = sys.state();
        match command {
            "X" => {
                if state == MachineState::Alarm {
                    mc.io().reporter.feedback(Feedback::AlarmUnlock);
                    sys.set_state(MachineState::Idle);
                }
                Ok(())
            }
            "C" => {
                if state == MachineState::CheckMode {
                    // Leaving check mode discards everything it parsed
                    mc.reset();
                    mc.io().reporter.feedback(Feedback::Disabled);
                } else {
                    if state != MachineState::Idle {
                        return Err(GcodeError::IdleError);
                    }
                    sys.set_state(MachineState::CheckMode);
                    mc.io().reporter.feedback(Feedback::Enabled);
                }
                Ok(())
            }
            "SLP" => {
                sys.request_sleep();
                Ok(())
            }
            "I" => {
                mc.io().reporter.message(
                    client,
                    concat!("[VER:kerf ", env!("CARGO_PKG_VERSION"), "]"),
                );
                Ok(())
            }
            _ => match command.strip_prefix('H') {
                Some(axes) => self.home(axes, mc),
                None => Err(GcodeError::InvalidStatement),
            },
        }
    }

    /// `$H` homes every configured cycle, `$HXY` only the named axes
    fn home<P: Planner>(
        &mut self,
        axes: &str,
        mc: &mut MotionControl<'_, P>,
    ) -> Result<(), GcodeError> {
        let sys = mc.sys();
        if !mc.settings().homing.enabled {
            return Err(GcodeError::SettingDisabled);
        }
        if !matches!(sys.state(), MachineState::Idle | MachineState::Alarm) {
            return Err(GcodeError::IdleError);
        }
        let mask = parse_axis_mask(axes, mc.settings().n_axis())?;

        sys.set_state(MachineState::Homing);
        mc.run_homing_cycle(mask);
        if !sys.is_aborted() {
            sys.set_state(MachineState::Idle);
            mc.go_idle();
            self.sync_position(mc);
            sys.take_parser_resync();
        }
        Ok(())
    }
}

fn parse_axis_mask(letters: &str, n_axis: usize) -> Result<AxisMask, GcodeError> {
    let mut mask = AxisMask::NONE;
    for letter in letters.chars() {
        let axis = Axis::ALL
            .iter()
            .take(n_axis)
            .find(|axis| axis.letter() == letter)
            .ok_or(GcodeError::InvalidStatement)?;
        mask.insert(*axis);
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_mask_letters() {
        let mask = parse_axis_mask("XZ", 3).unwrap();
        assert!(mask.contains(Axis::X));
        assert!(mask.contains(Axis::Z));
        assert!(!mask.contains(Axis::Y));
        assert!(parse_axis_mask("", 3).unwrap().is_empty());
        assert_eq!(parse_axis_mask("A", 3), Err(GcodeError::InvalidStatement));
        assert_eq!(parse_axis_mask("Q", 6), Err(GcodeError::InvalidStatement));
    }
}
