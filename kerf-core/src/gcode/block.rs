//! One parsed line
//!
//! [`ParserBlock::scan`] reads every word of a collapsed line and checks
//! what can be checked word by word: letters, numbers, modal group
//! exclusivity, repeated and negative values. Everything that depends on
//! the combination of words happens in validation.

use super::modal::{
    CoolantWords, CoordIndex, Distance, FeedMode, IoControl, ModalState, Motion, NonModal, Plane,
    ProgramFlow, ToolLength, Units,
};
use super::number::read_number;
use super::words::{GroupSet, ModalGroup, Word, WordSet};
use super::GcodeError;
use crate::motion::position::{AxisMask, Position, MAX_N_AXIS};
use crate::traits::SpindleState;

/// Largest accepted line number
pub const MAX_LINE_NUMBER: u32 = 10_000_000;

/// Largest tool number
pub const MAX_TOOL_NUMBER: f32 = 255.0;

/// Prefix that marks a jog line
pub const JOG_PREFIX: &str = "$J=";

/// Which command of the line consumes the axis words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisCommand {
    #[default]
    None,
    /// G10, G28, G30 or G92
    NonModal,
    /// G0-G3 or G38.x
    MotionMode,
    /// G43.1 or G49
    ToolLengthOffset,
}

/// Value words of one line
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockValues {
    pub e: i32,
    pub f: f32,
    /// I J K
    pub ijk: [f32; 3],
    pub l: i32,
    pub n: u32,
    pub p: f32,
    pub q: f32,
    pub r: f32,
    pub s: f32,
    pub t: u8,
    /// X Y Z A B C; becomes the target in machine coordinates after validation
    pub xyz: Position,
}

/// Flags derived while validating a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockFlags {
    pub jog: bool,
    /// Probe toward open contact (G38.4/G38.5)
    pub probe_away: bool,
    /// Missing contact is not an alarm (G38.3/G38.5)
    pub probe_no_error: bool,
    /// Laser off for this motion (G0, or G1-G3 with no axis motion)
    pub laser_disable: bool,
    /// Line moves the machine while in laser mode
    pub laser_is_motion: bool,
    /// Constant-power laser switches between cutting and non-cutting mode
    /// without motion, so the spindle output must be synchronized
    pub laser_force_sync: bool,
}

/// Parsed content of one line
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParserBlock {
    pub non_modal: NonModal,
    /// Modal state as it will be after this line
    pub modal: ModalState,
    pub values: BlockValues,
    pub words: WordSet,
    pub groups: GroupSet,
    pub axis_words: AxisMask,
    /// I/J/K as bits 0..3
    pub ijk_words: AxisMask,
    pub axis_command: AxisCommand,
    pub coolant: CoolantWords,
    pub io_control: Option<IoControl>,
    pub tool_change: bool,
    /// G91.1 given
    pub arc_distance_incremental: bool,
    pub flags: BlockFlags,
    /// Work coordinate system offset in effect for this line
    pub coord_system: Position,
    /// G10 target entry and its new value
    pub coord_target: CoordIndex,
    pub coord_data: Position,
}

impl ParserBlock {
    fn new(modal: ModalState) -> Self {
        Self {
            non_modal: NonModal::None,
            modal,
            values: BlockValues::default(),
            words: WordSet::empty(),
            groups: GroupSet::empty(),
            axis_words: AxisMask::NONE,
            ijk_words: AxisMask::NONE,
            axis_command: AxisCommand::None,
            coolant: CoolantWords::default(),
            io_control: None,
            tool_change: false,
            arc_distance_incremental: false,
            flags: BlockFlags::default(),
            coord_system: [0.0; MAX_N_AXIS],
            coord_target: CoordIndex::G54,
            coord_data: [0.0; MAX_N_AXIS],
        }
    }

    /// Scan a collapsed line.
    ///
    /// `modal` is the current modal state; the block starts from a copy of it.
    /// Lines that start with [`JOG_PREFIX`] are jog lines: G1 and G94 are
    /// forced and scanning starts after the prefix.
    pub fn scan(line: &str, modal: &ModalState, n_axis: usize) -> Result<Self, GcodeError> {
        let mut block = Self::new(*modal);
        let bytes = line.as_bytes();
        let mut pos = 0;
        if line.starts_with(JOG_PREFIX) {
            block.flags.jog = true;
            block.modal.motion = Motion::Linear;
            block.modal.feed_mode = FeedMode::UnitsPerMinute;
            pos = JOG_PREFIX.len();
        }

        while let Some(&letter) = bytes.get(pos) {
            if !letter.is_ascii_uppercase() {
                return Err(GcodeError::ExpectedCommandLetter);
            }
            pos += 1;
            let value = read_number(bytes, &mut pos).ok_or(GcodeError::BadNumberFormat)?;
            let int_value = libm::truncf(value) as i32;
            let mantissa = libm::roundf(100.0 * (value - int_value as f32)) as i32;

            match letter {
                b'G' => block.scan_g(int_value, mantissa)?,
                b'M' => block.scan_m(int_value, mantissa)?,
                _ => block.scan_value(letter, value, int_value, n_axis)?,
            }
        }
        Ok(block)
    }

    fn claim_axis_command(&mut self, command: AxisCommand) -> Result<(), GcodeError> {
        if self.axis_command != AxisCommand::None {
            return Err(GcodeError::AxisCommandConflict);
        }
        self.axis_command = command;
        Ok(())
    }

    fn scan_g(&mut self, code: i32, mantissa: i32) -> Result<(), GcodeError> {
        let group = match code {
            4 | 10 | 28 | 30 | 53 | 92 => ModalGroup::NonModal,
            0..=3 | 38 | 80 => ModalGroup::Motion,
            17..=19 => ModalGroup::Plane,
            90 | 91 if mantissa == 10 => ModalGroup::ArcDistance,
            90 | 91 => ModalGroup::Distance,
            93 | 94 => ModalGroup::FeedMode,
            20 | 21 => ModalGroup::Units,
            40 => ModalGroup::CutterComp,
            43 | 49 => ModalGroup::ToolLength,
            54..=59 => ModalGroup::CoordSelect,
            61 => ModalGroup::PathControl,
            _ => return Err(GcodeError::UnsupportedCommand),
        };
        if !self.groups.insert(group) {
            return Err(GcodeError::ModalGroupViolation);
        }

        let mut mantissa = mantissa;
        match code {
            10 | 28 | 30 | 92 => {
                if mantissa == 0 {
                    self.claim_axis_command(AxisCommand::NonModal)?;
                }
                self.non_modal = match (code, mantissa) {
                    (10, _) => NonModal::SetCoordinateData,
                    (28, 0) => NonModal::GoHome0,
                    (28, 10) => NonModal::SetHome0,
                    (30, 0) => NonModal::GoHome1,
                    (30, 10) => NonModal::SetHome1,
                    (92, 0) => NonModal::SetCoordinateOffset,
                    (92, 10) => NonModal::ResetCoordinateOffset,
                    _ => return Err(GcodeError::UnsupportedCommand),
                };
                if code != 10 {
                    mantissa = 0;
                }
            }
            4 => self.non_modal = NonModal::Dwell,
            53 => self.non_modal = NonModal::AbsoluteOverride,
            0..=3 => {
                self.claim_axis_command(AxisCommand::MotionMode)?;
                self.modal.motion = match code {
                    0 => Motion::Seek,
                    1 => Motion::Linear,
                    2 => Motion::CwArc,
                    _ => Motion::CcwArc,
                };
            }
            38 => {
                self.claim_axis_command(AxisCommand::MotionMode)?;
                self.modal.motion = match mantissa {
                    20 => Motion::ProbeToward,
                    30 => Motion::ProbeTowardNoError,
                    40 => Motion::ProbeAway,
                    50 => Motion::ProbeAwayNoError,
                    _ => return Err(GcodeError::UnsupportedCommand),
                };
                mantissa = 0;
            }
            80 => self.modal.motion = Motion::None,
            17 => self.modal.plane = Plane::XY,
            18 => self.modal.plane = Plane::ZX,
            19 => self.modal.plane = Plane::YZ,
            90 | 91 => {
                if mantissa == 0 {
                    self.modal.distance = if code == 90 {
                        Distance::Absolute
                    } else {
                        Distance::Incremental
                    };
                } else if code == 91 && mantissa == 10 {
                    // IJK are always incremental
                    self.arc_distance_incremental = true;
                    mantissa = 0;
                } else {
                    return Err(GcodeError::UnsupportedCommand);
                }
            }
            93 => self.modal.feed_mode = FeedMode::InverseTime,
            94 => self.modal.feed_mode = FeedMode::UnitsPerMinute,
            20 => self.modal.units = Units::Inches,
            21 => self.modal.units = Units::Mm,
            40 => {}
            43 | 49 => {
                self.claim_axis_command(AxisCommand::ToolLengthOffset)?;
                if code == 49 {
                    self.modal.tool_length = ToolLength::Cancel;
                } else if mantissa == 10 {
                    self.modal.tool_length = ToolLength::Dynamic;
                    mantissa = 0;
                } else {
                    return Err(GcodeError::UnsupportedCommand);
                }
            }
            54..=59 => {
                // 54..=59 maps onto G54..G59
                self.modal.coord_select =
                    CoordIndex::work((code - 54) as usize).ok_or(GcodeError::UnsupportedCommand)?;
            }
            61 => {
                if mantissa != 0 {
                    return Err(GcodeError::UnsupportedCommand);
                }
            }
            _ => return Err(GcodeError::UnsupportedCommand),
        }
        if mantissa != 0 {
            return Err(GcodeError::CommandValueNotInteger);
        }
        Ok(())
    }

    fn scan_m(&mut self, code: i32, mantissa: i32) -> Result<(), GcodeError> {
        if mantissa != 0 {
            return Err(GcodeError::CommandValueNotInteger);
        }
        let group = match code {
            0 | 1 | 2 | 30 => ModalGroup::Stopping,
            3..=5 => ModalGroup::Spindle,
            6 => ModalGroup::ToolChange,
            7..=9 => ModalGroup::Coolant,
            56 => ModalGroup::OverrideControl,
            62..=65 | 67 | 68 => ModalGroup::UserIo,
            _ => return Err(GcodeError::UnsupportedCommand),
        };
        // M7 and M8 may share a line; any other coolant combination may not
        if group == ModalGroup::Coolant {
            let repeated = match code {
                7 => self.coolant.mist || self.coolant.off,
                8 => self.coolant.flood || self.coolant.off,
                _ => !self.coolant.is_empty(),
            };
            if repeated {
                return Err(GcodeError::ModalGroupViolation);
            }
            self.groups.insert(group);
        } else if !self.groups.insert(group) {
            return Err(GcodeError::ModalGroupViolation);
        }

        match code {
            0 => self.modal.program_flow = ProgramFlow::Paused,
            1 => self.modal.program_flow = ProgramFlow::OptionalStop,
            2 => self.modal.program_flow = ProgramFlow::CompletedM2,
            30 => self.modal.program_flow = ProgramFlow::CompletedM30,
            3 => self.modal.spindle = SpindleState::Cw,
            4 => self.modal.spindle = SpindleState::Ccw,
            5 => self.modal.spindle = SpindleState::Disable,
            6 => self.tool_change = true,
            7 => self.coolant.mist = true,
            8 => self.coolant.flood = true,
            9 => self.coolant.off = true,
            56 => self.modal.override_control = true,
            62 => self.io_control = Some(IoControl::DigitalOnSync),
            63 => self.io_control = Some(IoControl::DigitalOffSync),
            64 => self.io_control = Some(IoControl::DigitalOnImmediate),
            65 => self.io_control = Some(IoControl::DigitalOffImmediate),
            67 => self.io_control = Some(IoControl::AnalogSync),
            _ => self.io_control = Some(IoControl::AnalogImmediate),
        }
        Ok(())
    }

    fn scan_value(
        &mut self,
        letter: u8,
        value: f32,
        int_value: i32,
        n_axis: usize,
    ) -> Result<(), GcodeError> {
        let word = Word::from_letter(letter).ok_or(GcodeError::UnsupportedCommand)?;
        match word {
            Word::E => self.values.e = int_value,
            Word::F => self.values.f = value,
            Word::L => self.values.l = int_value,
            Word::N => self.values.n = if value < 0.0 { 0 } else { libm::truncf(value) as u32 },
            Word::P => self.values.p = value,
            Word::Q => self.values.q = value,
            Word::R => self.values.r = value,
            Word::S => self.values.s = value,
            Word::T => {
                if value > MAX_TOOL_NUMBER {
                    return Err(GcodeError::MaxValueExceeded);
                }
                self.values.t = if value < 0.0 { 0 } else { int_value as u8 };
            }
            Word::I | Word::J | Word::K => {
                if let Some(idx) = word.offset_index() {
                    self.values.ijk[idx] = value;
                    self.ijk_words.insert_index(idx);
                }
            }
            Word::X | Word::Y | Word::Z | Word::A | Word::B | Word::C => {
                let axis = word.axis_index().ok_or(GcodeError::UnsupportedCommand)?;
                if axis >= n_axis.min(MAX_N_AXIS) {
                    return Err(GcodeError::UnsupportedCommand);
                }
                self.values.xyz[axis] = value;
                self.axis_words.insert_index(axis);
            }
        }
        if self.words.contains(word) {
            return Err(GcodeError::WordRepeated);
        }
        if word.is_non_negative() && value < 0.0 {
            return Err(GcodeError::NegativeValue);
        }
        self.words.insert(word);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(line: &str) -> Result<ParserBlock, GcodeError> {
        ParserBlock::scan(line, &ModalState::default(), 3)
    }

    #[test]
    fn test_scan_motion_and_words() {
        let block = scan("G1X10.5Y-2F300").unwrap();
        assert_eq!(block.modal.motion, Motion::Linear);
        assert_eq!(block.axis_command, AxisCommand::MotionMode);
        assert_eq!(block.values.xyz[0], 10.5);
        assert_eq!(block.values.xyz[1], -2.0);
        assert!(block.axis_words.contains_index(0));
        assert!(!block.axis_words.contains_index(2));
        assert!(block.words.contains(Word::F));
    }

    #[test]
    fn test_modal_group_violation() {
        assert_eq!(scan("G0G1X1"), Err(GcodeError::ModalGroupViolation));
        assert_eq!(scan("G20G21"), Err(GcodeError::ModalGroupViolation));
        assert_eq!(scan("M3M5"), Err(GcodeError::ModalGroupViolation));
    }

    #[test]
    fn test_axis_command_conflict() {
        assert_eq!(scan("G28G1X1"), Err(GcodeError::AxisCommandConflict));
        assert_eq!(scan("G1G92X1"), Err(GcodeError::AxisCommandConflict));
        assert_eq!(scan("G43.1G0Z1"), Err(GcodeError::AxisCommandConflict));
    }

    #[test]
    fn test_mantissa_rules() {
        assert_eq!(scan("G28.1").unwrap().non_modal, NonModal::SetHome0);
        assert_eq!(scan("G92.1").unwrap().non_modal, NonModal::ResetCoordinateOffset);
        assert_eq!(scan("G38.3Z-5").unwrap().modal.motion, Motion::ProbeTowardNoError);
        assert_eq!(scan("G38.5Z-5").unwrap().modal.motion, Motion::ProbeAwayNoError);
        assert!(scan("G91.1").unwrap().arc_distance_incremental);
        assert_eq!(scan("G43.1Z1").unwrap().modal.tool_length, ToolLength::Dynamic);
        assert_eq!(scan("G1.5X1"), Err(GcodeError::CommandValueNotInteger));
        assert_eq!(scan("G10.5"), Err(GcodeError::CommandValueNotInteger));
        assert_eq!(scan("G90.1"), Err(GcodeError::UnsupportedCommand));
        assert_eq!(scan("G61.1"), Err(GcodeError::UnsupportedCommand));
        assert_eq!(scan("G38.1Z1"), Err(GcodeError::UnsupportedCommand));
        assert_eq!(scan("G43Z1"), Err(GcodeError::UnsupportedCommand));
        assert_eq!(scan("M3.5"), Err(GcodeError::CommandValueNotInteger));
    }

    #[test]
    fn test_coolant_words_combine() {
        let block = scan("M7M8").unwrap();
        assert!(block.coolant.mist && block.coolant.flood);
        assert_eq!(scan("M7M9"), Err(GcodeError::ModalGroupViolation));
        assert_eq!(scan("M8M8"), Err(GcodeError::ModalGroupViolation));
    }

    #[test]
    fn test_value_word_checks() {
        assert_eq!(scan("X1X2"), Err(GcodeError::WordRepeated));
        assert_eq!(scan("G1X1F-1"), Err(GcodeError::NegativeValue));
        assert_eq!(scan("S-100"), Err(GcodeError::NegativeValue));
        assert_eq!(scan("T256"), Err(GcodeError::MaxValueExceeded));
        assert_eq!(scan("T12").unwrap().values.t, 12);
        assert_eq!(scan("G0A1"), Err(GcodeError::UnsupportedCommand));
        assert_eq!(scan("G0D1"), Err(GcodeError::UnsupportedCommand));
    }

    #[test]
    fn test_letter_and_number_errors() {
        assert_eq!(scan("1G0"), Err(GcodeError::ExpectedCommandLetter));
        assert_eq!(scan("GX1"), Err(GcodeError::BadNumberFormat));
        assert_eq!(scan("G5"), Err(GcodeError::UnsupportedCommand));
        assert_eq!(scan("M99"), Err(GcodeError::UnsupportedCommand));
    }

    #[test]
    fn test_jog_prefix_forces_feed_motion() {
        let modal = ModalState {
            motion: Motion::Seek,
            feed_mode: FeedMode::InverseTime,
            ..ModalState::default()
        };
        let block = ParserBlock::scan("$J=X5F100", &modal, 3).unwrap();
        assert!(block.flags.jog);
        assert_eq!(block.modal.motion, Motion::Linear);
        assert_eq!(block.modal.feed_mode, FeedMode::UnitsPerMinute);
        assert_eq!(block.values.xyz[0], 5.0);
    }

    #[test]
    fn test_io_words() {
        let block = scan("M62P1").unwrap();
        assert_eq!(block.io_control, Some(IoControl::DigitalOnSync));
        assert_eq!(block.values.p, 1.0);
        assert_eq!(scan("M62M63P1"), Err(GcodeError::ModalGroupViolation));
    }
}
