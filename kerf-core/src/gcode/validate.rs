//! Line validation
//!
//! Checks the combination of words on a scanned line against the parser
//! state and converts every value to millimeters and machine coordinates.
//! Nothing here mutates the parser state; a line that fails leaves it as it
//! was.

use super::block::{AxisCommand, ParserBlock, MAX_LINE_NUMBER};
use super::coords::CoordinateTable;
use super::modal::{CoordIndex, Distance, FeedMode, Motion, NonModal, ToolLength, Units};
use super::state::{ParserState, TOOL_LENGTH_OFFSET_AXIS};
use super::words::{ModalGroup, Word};
use super::GcodeError;
use crate::config::Settings;
use crate::motion::position::AxisMask;
use crate::traits::SpindleState;

pub const MM_PER_INCH: f32 = 25.4;

impl ParserBlock {
    /// Validate the block against `state`.
    ///
    /// On success `values.xyz` holds the target in machine coordinates,
    /// `values.ijk` and `values.r` describe the arc and `values.f` is in
    /// mm/min (or 1/min in inverse time).
    pub fn validate(
        &mut self,
        state: &ParserState,
        coords: &CoordinateTable,
        settings: &Settings,
        laser_mode: bool,
    ) -> Result<(), GcodeError> {
        let n_axis = settings.n_axis();

        if self.flags.jog {
            let allowed = [
                ModalGroup::NonModal,
                ModalGroup::Distance,
                ModalGroup::Units,
            ];
            if self.groups.any_except(&allowed) {
                return Err(GcodeError::InvalidJogCommand);
            }
            if !matches!(self.non_modal, NonModal::None | NonModal::AbsoluteOverride) {
                return Err(GcodeError::InvalidJogCommand);
            }
        }

        // Axis words with no command move in the current motion mode
        if !self.axis_words.is_empty() && self.axis_command == AxisCommand::None {
            self.axis_command = AxisCommand::MotionMode;
        }

        if self.words.contains(Word::N) && self.values.n > MAX_LINE_NUMBER {
            return Err(GcodeError::InvalidLineNumber);
        }

        self.validate_feed_rate(state)?;

        if !self.words.contains(Word::S) {
            self.values.s = state.spindle_speed;
        }

        if self.groups.contains(ModalGroup::OverrideControl) && self.words.contains(Word::P) {
            if self.values.p == 0.0 {
                self.modal.override_control = false;
            }
            self.words.remove(Word::P);
        }

        if self.non_modal == NonModal::Dwell {
            if !self.words.contains(Word::P) {
                return Err(GcodeError::ValueWordMissing);
            }
            self.words.remove(Word::P);
        }

        if let Some(io) = self.io_control {
            if io.is_digital() {
                if !self.words.contains(Word::P) {
                    return Err(GcodeError::ValueWordMissing);
                }
                self.words.remove(Word::P);
            } else {
                if !self.words.contains(Word::E) || !self.words.contains(Word::Q) {
                    return Err(GcodeError::ValueWordMissing);
                }
                self.words.remove(Word::E);
                self.words.remove(Word::Q);
            }
        }

        if self.modal.units == Units::Inches {
            for axis in 0..n_axis {
                if self.axis_words.contains_index(axis) {
                    self.values.xyz[axis] *= MM_PER_INCH;
                }
            }
        }

        if self.axis_command == AxisCommand::ToolLengthOffset
            && self.modal.tool_length == ToolLength::Dynamic
        {
            let mut expected = AxisMask::NONE;
            expected.insert_index(TOOL_LENGTH_OFFSET_AXIS);
            if self.axis_words != expected {
                return Err(GcodeError::G43DynamicAxisError);
            }
        }

        self.coord_system = state.coord_system;
        if self.groups.contains(ModalGroup::CoordSelect)
            && self.modal.coord_select != state.modal.coord_select
        {
            if self.modal.coord_select.index() >= CoordIndex::WORK_SYSTEMS {
                return Err(GcodeError::UnsupportedCoordSys);
            }
            self.coord_system = coords.get(self.modal.coord_select);
        }

        self.validate_non_modal(state, coords, n_axis)?;
        self.validate_motion(state, settings)?;

        // Single-meaning words are always consumed
        self.words.remove(Word::N);
        self.words.remove(Word::F);
        if !self.flags.jog {
            self.words.remove(Word::S);
            self.words.remove(Word::T);
        }
        if self.axis_command != AxisCommand::None {
            self.words.remove_axes();
        }
        if !self.words.is_empty() {
            return Err(GcodeError::UnusedWords);
        }

        if laser_mode && !self.flags.jog {
            self.set_laser_flags(state);
        }
        Ok(())
    }

    fn validate_feed_rate(&mut self, state: &ParserState) -> Result<(), GcodeError> {
        let has_f = self.words.contains(Word::F);
        if self.flags.jog {
            if !has_f {
                return Err(GcodeError::UndefinedFeedRate);
            }
            if self.modal.units == Units::Inches {
                self.values.f *= MM_PER_INCH;
            }
            return Ok(());
        }
        match self.modal.feed_mode {
            FeedMode::InverseTime => {
                // G93 needs F on every feed motion line
                if self.axis_command == AxisCommand::MotionMode
                    && !matches!(self.modal.motion, Motion::None | Motion::Seek)
                    && !has_f
                {
                    return Err(GcodeError::UndefinedFeedRate);
                }
            }
            FeedMode::UnitsPerMinute => {
                // Switching from G93 leaves the feed rate undefined
                if state.modal.feed_mode == FeedMode::UnitsPerMinute {
                    if has_f {
                        if self.modal.units == Units::Inches {
                            self.values.f *= MM_PER_INCH;
                        }
                    } else {
                        self.values.f = state.feed_rate;
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_non_modal(
        &mut self,
        state: &ParserState,
        coords: &CoordinateTable,
        n_axis: usize,
    ) -> Result<(), GcodeError> {
        match self.non_modal {
            NonModal::SetCoordinateData => {
                if self.axis_words.is_empty() {
                    return Err(GcodeError::NoAxisWords);
                }
                // A missing P selects the active system; a missing L fails below
                if !self.words.contains(Word::P) && !self.words.contains(Word::L) {
                    return Err(GcodeError::ValueWordMissing);
                }
                match self.values.l {
                    20 => {}
                    2 => {
                        if self.words.contains(Word::R) {
                            return Err(GcodeError::UnsupportedCommand);
                        }
                    }
                    _ => return Err(GcodeError::UnsupportedCommand),
                }
                // P0 is the active system, P1..P6 are G54..G59
                let p = libm::truncf(self.values.p) as usize;
                self.coord_target = if p == 0 {
                    self.modal.coord_select
                } else {
                    CoordIndex::work(p - 1).ok_or(GcodeError::UnsupportedCoordSys)?
                };
                self.words.remove(Word::L);
                self.words.remove(Word::P);

                self.coord_data = coords.get(self.coord_target);
                for axis in 0..n_axis {
                    if !self.axis_words.contains_index(axis) {
                        continue;
                    }
                    self.coord_data[axis] = if self.values.l == 20 {
                        // WCS = MPos - G92 - TLO - WPos
                        let mut value =
                            state.position[axis] - state.coord_offset[axis] - self.values.xyz[axis];
                        if axis == TOOL_LENGTH_OFFSET_AXIS {
                            value -= state.tool_length_offset;
                        }
                        value
                    } else {
                        self.values.xyz[axis]
                    };
                }
            }
            NonModal::SetCoordinateOffset => {
                if self.axis_words.is_empty() {
                    return Err(GcodeError::NoAxisWords);
                }
                for axis in 0..n_axis {
                    self.values.xyz[axis] = if self.axis_words.contains_index(axis) {
                        // G92 = MPos - WCS - TLO - WPos
                        let mut value =
                            state.position[axis] - self.coord_system[axis] - self.values.xyz[axis];
                        if axis == TOOL_LENGTH_OFFSET_AXIS {
                            value -= state.tool_length_offset;
                        }
                        value
                    } else {
                        state.coord_offset[axis]
                    };
                }
            }
            _ => {
                if self.axis_command != AxisCommand::ToolLengthOffset && !self.axis_words.is_empty()
                {
                    self.compute_target(state, n_axis);
                }
                match self.non_modal {
                    NonModal::GoHome0 | NonModal::GoHome1 => {
                        let stored = if self.non_modal == NonModal::GoHome0 {
                            CoordIndex::G28
                        } else {
                            CoordIndex::G30
                        };
                        self.coord_data = coords.get(stored);
                        if self.axis_words.is_empty() {
                            // No intermediate move
                            self.axis_command = AxisCommand::None;
                        } else {
                            for axis in 0..n_axis {
                                if !self.axis_words.contains_index(axis) {
                                    self.coord_data[axis] = state.position[axis];
                                }
                            }
                        }
                    }
                    NonModal::AbsoluteOverride => {
                        if !matches!(self.modal.motion, Motion::Seek | Motion::Linear) {
                            return Err(GcodeError::G53InvalidMotionMode);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Resolve axis words to a machine target per the distance mode
    fn compute_target(&mut self, state: &ParserState, n_axis: usize) {
        for axis in 0..n_axis {
            if !self.axis_words.contains_index(axis) {
                self.values.xyz[axis] = state.position[axis];
            } else if self.non_modal != NonModal::AbsoluteOverride {
                match self.modal.distance {
                    Distance::Absolute => {
                        self.values.xyz[axis] += self.coord_system[axis] + state.coord_offset[axis];
                        if axis == TOOL_LENGTH_OFFSET_AXIS {
                            self.values.xyz[axis] += state.tool_length_offset;
                        }
                    }
                    Distance::Incremental => self.values.xyz[axis] += state.position[axis],
                }
            }
        }
    }

    fn validate_motion(&mut self, state: &ParserState, settings: &Settings) -> Result<(), GcodeError> {
        if self.modal.motion == Motion::None {
            if !self.axis_words.is_empty() {
                return Err(GcodeError::AxisWordsExist);
            }
            return Ok(());
        }
        if self.axis_command != AxisCommand::MotionMode {
            return Ok(());
        }
        if self.modal.motion == Motion::Seek {
            if self.axis_words.is_empty() {
                self.axis_command = AxisCommand::None;
            }
            return Ok(());
        }
        if self.values.f == 0.0 {
            return Err(GcodeError::UndefinedFeedRate);
        }

        match self.modal.motion {
            Motion::Linear => {
                if self.axis_words.is_empty() {
                    self.axis_command = AxisCommand::None;
                }
            }
            Motion::CwArc | Motion::CcwArc => self.validate_arc(state, settings)?,
            _ => {
                self.flags.probe_no_error = matches!(
                    self.modal.motion,
                    Motion::ProbeTowardNoError | Motion::ProbeAwayNoError
                );
                self.flags.probe_away =
                    matches!(self.modal.motion, Motion::ProbeAway | Motion::ProbeAwayNoError);
                if self.axis_words.is_empty() {
                    return Err(GcodeError::NoAxisWords);
                }
                if state.position == self.values.xyz {
                    return Err(GcodeError::InvalidTarget);
                }
            }
        }
        Ok(())
    }

    fn validate_arc(&mut self, state: &ParserState, settings: &Settings) -> Result<(), GcodeError> {
        let plane = self.modal.plane.axes();
        if self.axis_words.is_empty() {
            return Err(GcodeError::NoAxisWords);
        }
        if !self.axis_words.contains_index(plane.axis_0)
            && !self.axis_words.contains_index(plane.axis_1)
        {
            return Err(GcodeError::NoAxisWordsInPlane);
        }

        let mut x = self.values.xyz[plane.axis_0] - state.position[plane.axis_0];
        let mut y = self.values.xyz[plane.axis_1] - state.position[plane.axis_1];

        if self.words.contains(Word::R) {
            self.words.remove(Word::R);
            if state.position == self.values.xyz {
                return Err(GcodeError::InvalidTarget);
            }
            if self.modal.units == Units::Inches {
                self.values.r *= MM_PER_INCH;
            }
            let r = self.values.r;
            let h_sqr = 4.0 * r * r - x * x - y * y;
            if h_sqr < 0.0 {
                return Err(GcodeError::ArcRadiusError);
            }
            // -(2h / d): puts the center right of the travel vector for CW
            let mut h_x2_div_d = -libm::sqrtf(h_sqr) / libm::hypotf(x, y);
            if self.modal.motion == Motion::CcwArc {
                h_x2_div_d = -h_x2_div_d;
            }
            // Negative R asks for the arc longer than 180 degrees
            if r < 0.0 {
                h_x2_div_d = -h_x2_div_d;
                self.values.r = -r;
            }
            self.values.ijk[plane.axis_0] = 0.5 * (x - y * h_x2_div_d);
            self.values.ijk[plane.axis_1] = 0.5 * (y + x * h_x2_div_d);
        } else {
            if !self.ijk_words.contains_index(plane.axis_0)
                && !self.ijk_words.contains_index(plane.axis_1)
            {
                return Err(GcodeError::NoOffsetsInPlane);
            }
            self.words.remove(Word::I);
            self.words.remove(Word::J);
            self.words.remove(Word::K);
            if self.modal.units == Units::Inches {
                for (idx, value) in self.values.ijk.iter_mut().enumerate() {
                    if self.ijk_words.contains_index(idx) {
                        *value *= MM_PER_INCH;
                    }
                }
            }
            x -= self.values.ijk[plane.axis_0];
            y -= self.values.ijk[plane.axis_1];
            let target_r = libm::hypotf(x, y);
            self.values.r = libm::hypotf(self.values.ijk[plane.axis_0], self.values.ijk[plane.axis_1]);

            let arc = &settings.arc;
            let delta_r = libm::fabsf(target_r - self.values.r);
            if delta_r > arc.center_error_min
                && (delta_r > arc.center_error_max
                    || delta_r > arc.center_error_ratio * self.values.r)
            {
                return Err(GcodeError::InvalidTarget);
            }
        }
        Ok(())
    }

    fn set_laser_flags(&mut self, state: &ParserState) {
        if !self.modal.motion.is_cutting() {
            self.flags.laser_disable = true;
        }
        if !self.axis_words.is_empty() && self.axis_command == AxisCommand::MotionMode {
            self.flags.laser_is_motion = true;
        } else if state.modal.spindle == SpindleState::Cw {
            // Constant power: the output changes between cutting and
            // non-cutting modes even when nothing moves
            if state.modal.motion.is_cutting() == self.flags.laser_disable {
                self.flags.laser_force_sync = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::modal::ModalState;

    fn validate(line: &str, state: &ParserState) -> Result<ParserBlock, GcodeError> {
        validate_with(line, state, &CoordinateTable::new())
    }

    fn validate_with(
        line: &str,
        state: &ParserState,
        coords: &CoordinateTable,
    ) -> Result<ParserBlock, GcodeError> {
        let settings = Settings::default();
        let mut block = ParserBlock::scan(line, &state.modal, settings.n_axis())?;
        block.validate(state, coords, &settings, false)?;
        Ok(block)
    }

    fn state_at(position: [f32; 3]) -> ParserState {
        let mut state = ParserState::default();
        state.position[..3].copy_from_slice(&position);
        state
    }

    #[test]
    fn test_absolute_target_adds_offsets() {
        let mut state = ParserState::default();
        state.coord_system[0] = 10.0;
        state.coord_offset[0] = 1.0;
        state.tool_length_offset = 2.0;
        let block = validate("G0X5Z1", &state).unwrap();
        assert_eq!(block.values.xyz[0], 16.0);
        assert_eq!(block.values.xyz[1], 0.0);
        assert_eq!(block.values.xyz[2], 3.0);
    }

    #[test]
    fn test_incremental_and_g53() {
        let state = state_at([10.0, 0.0, 0.0]);
        let block = validate("G91G0X-5", &state).unwrap();
        assert_eq!(block.values.xyz[0], 5.0);

        let mut offset = state;
        offset.coord_system[0] = 100.0;
        let block = validate("G53G0X5", &offset).unwrap();
        assert_eq!(block.values.xyz[0], 5.0);
        assert_eq!(validate("G53G2X5R5F100", &offset), Err(GcodeError::G53InvalidMotionMode));
    }

    #[test]
    fn test_inches_convert() {
        let block = validate("G20G1X1F10", &ParserState::default()).unwrap();
        assert!((block.values.xyz[0] - 25.4).abs() < 1e-4);
        assert!((block.values.f - 254.0).abs() < 1e-3);
    }

    #[test]
    fn test_feed_rate_rules() {
        let state = ParserState::default();
        assert_eq!(validate("G1X1", &state), Err(GcodeError::UndefinedFeedRate));
        let mut with_feed = state;
        with_feed.feed_rate = 500.0;
        assert_eq!(validate("G1X1", &with_feed).unwrap().values.f, 500.0);
        assert_eq!(validate("G93G1X1", &with_feed), Err(GcodeError::UndefinedFeedRate));
        assert!(validate("G93G1X1F2", &with_feed).is_ok());
        assert!(validate("G0X1", &state).is_ok());
    }

    #[test]
    fn test_inverse_time_to_units_per_minute_drops_feed() {
        let mut state = ParserState::default();
        state.modal.feed_mode = FeedMode::InverseTime;
        state.feed_rate = 3.0;
        assert_eq!(validate("G94G1X1", &state), Err(GcodeError::UndefinedFeedRate));
    }

    #[test]
    fn test_radius_arc_to_current_position_is_invalid() {
        assert_eq!(
            validate("G2X0Y0R5F100", &ParserState::default()),
            Err(GcodeError::InvalidTarget)
        );
    }

    #[test]
    fn test_radius_arc_center() {
        let block = validate("G2X10Y0R5F100", &ParserState::default()).unwrap();
        assert!((block.values.ijk[0] - 5.0).abs() < 1e-4);
        assert!(block.values.ijk[1].abs() < 1e-3);
        assert_eq!(validate("G2X10R4F100", &ParserState::default()), Err(GcodeError::ArcRadiusError));
    }

    #[test]
    fn test_negative_radius_picks_long_arc() {
        let short = validate("G2X10Y10R10F100", &ParserState::default()).unwrap();
        let long = validate("G2X10Y10R-10F100", &ParserState::default()).unwrap();
        assert!((short.values.ijk[0] - 10.0).abs() < 1e-3);
        assert!(short.values.ijk[1].abs() < 1e-3);
        assert!(long.values.ijk[0].abs() < 1e-3);
        assert!((long.values.ijk[1] - 10.0).abs() < 1e-3);
        assert_eq!(long.values.r, 10.0);
    }

    #[test]
    fn test_center_arc_checks() {
        let state = ParserState::default();
        let block = validate("G3X10I5F100", &state).unwrap();
        assert!((block.values.r - 5.0).abs() < 1e-5);
        assert_eq!(validate("G3X10K5F100", &state), Err(GcodeError::NoOffsetsInPlane));
        assert_eq!(validate("G3X10I4F100", &state), Err(GcodeError::InvalidTarget));
        assert_eq!(validate("G3Z10I5F100", &state), Err(GcodeError::NoAxisWordsInPlane));
    }

    #[test]
    fn test_g10_l2_and_l20() {
        let mut state = state_at([10.0, 20.0, 0.0]);
        state.coord_offset[0] = 1.0;
        let block = validate("G10L2P2X5", &state).unwrap();
        assert_eq!(block.coord_target, CoordIndex::G55);
        assert_eq!(block.coord_data[0], 5.0);

        let block = validate("G10L20P0X2", &state).unwrap();
        assert_eq!(block.coord_target, CoordIndex::G54);
        assert_eq!(block.coord_data[0], 7.0);

        assert_eq!(validate("G10L2P7X1", &state), Err(GcodeError::UnsupportedCoordSys));
        assert_eq!(validate("G10L3P1X1", &state), Err(GcodeError::UnsupportedCommand));
        assert_eq!(validate("G10X1", &state), Err(GcodeError::ValueWordMissing));
        assert_eq!(validate("G10P1X1", &state), Err(GcodeError::UnsupportedCommand));
        assert_eq!(validate("G10L2P1", &state), Err(GcodeError::NoAxisWords));
    }

    #[test]
    fn test_g10_without_p_targets_active_system() {
        let state = state_at([0.0, 0.0, 0.0]);
        let block = validate("G10L2X4", &state).unwrap();
        assert_eq!(block.coord_target, CoordIndex::G54);
        assert_eq!(block.coord_data[0], 4.0);
    }

    #[test]
    fn test_g92_offset() {
        let mut state = state_at([10.0, 0.0, 0.0]);
        state.coord_system[0] = 2.0;
        let block = validate("G92X3", &state).unwrap();
        assert_eq!(block.values.xyz[0], 5.0);
    }

    #[test]
    fn test_g28_intermediate_and_stored() {
        let mut coords = CoordinateTable::new();
        coords.set(CoordIndex::G28, &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        let state = state_at([10.0, 10.0, 10.0]);
        let block = validate_with("G28Z20", &state, &coords).unwrap();
        assert_eq!(block.values.xyz[2], 20.0);
        assert_eq!(block.coord_data[..3], [10.0, 10.0, 3.0]);

        let block = validate_with("G28", &state, &coords).unwrap();
        assert_eq!(block.axis_command, AxisCommand::None);
        assert_eq!(block.coord_data[..3], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_g80_rejects_axis_words() {
        assert_eq!(validate("G80X1", &ParserState::default()), Err(GcodeError::AxisWordsExist));
    }

    #[test]
    fn test_unused_words() {
        let state = ParserState::default();
        assert_eq!(validate("G0X1P2", &state), Err(GcodeError::UnusedWords));
        assert_eq!(validate("G2X10Y10R10I5F100", &state), Err(GcodeError::UnusedWords));
        assert!(validate("S100T2", &state).is_ok());
    }

    #[test]
    fn test_dwell_and_io_need_words() {
        let state = ParserState::default();
        assert_eq!(validate("G4", &state), Err(GcodeError::ValueWordMissing));
        assert!(validate("G4P0.5", &state).is_ok());
        assert_eq!(validate("M62", &state), Err(GcodeError::ValueWordMissing));
        assert_eq!(validate("M67E1", &state), Err(GcodeError::ValueWordMissing));
        assert!(validate("M67E1Q50", &state).is_ok());
    }

    #[test]
    fn test_tool_length_axis() {
        let state = ParserState::default();
        assert!(validate("G43.1Z2", &state).is_ok());
        assert_eq!(validate("G43.1X2", &state), Err(GcodeError::G43DynamicAxisError));
        assert_eq!(validate("G43.1Z1X2", &state), Err(GcodeError::G43DynamicAxisError));
    }

    #[test]
    fn test_probe_rules() {
        let state = ParserState::default();
        let block = validate("G38.4Z-5F50", &state).unwrap();
        assert!(block.flags.probe_away);
        assert!(!block.flags.probe_no_error);
        assert_eq!(validate("G38.2Z0F50", &state), Err(GcodeError::InvalidTarget));
        assert_eq!(validate("G38.2Z-1", &state), Err(GcodeError::UndefinedFeedRate));
    }

    #[test]
    fn test_jog_restrictions() {
        let state = ParserState::default();
        assert!(validate("$J=G91X5F100", &state).is_ok());
        assert!(validate("$J=G53X5F100", &state).is_ok());
        assert_eq!(validate("$J=X5", &state), Err(GcodeError::UndefinedFeedRate));
        assert_eq!(validate("$J=G2X5F100", &state), Err(GcodeError::InvalidJogCommand));
        assert_eq!(validate("$J=G4P1X5F100", &state), Err(GcodeError::InvalidJogCommand));
        assert_eq!(validate("$J=X5F100S10", &state), Err(GcodeError::UnusedWords));
    }

    #[test]
    fn test_modal_state_is_not_touched() {
        let state = ParserState::default();
        let block = validate("G91G20G18", &state).unwrap();
        assert_eq!(state.modal, ModalState::default());
        assert_eq!(block.modal.distance, Distance::Incremental);
    }

    #[test]
    fn test_line_number_limit() {
        let state = ParserState::default();
        assert_eq!(validate("N10000001G0", &state), Err(GcodeError::InvalidLineNumber));
        assert_eq!(validate("N10G0", &state).unwrap().values.n, 10);
    }
}
