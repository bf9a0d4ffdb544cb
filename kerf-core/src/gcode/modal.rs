//! Modal commands and the modal state they select

use crate::traits::{CoolantState, SpindleState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Non-modal action of a line (group 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NonModal {
    #[default]
    None,
    /// G4
    Dwell,
    /// G10
    SetCoordinateData,
    /// G28
    GoHome0,
    /// G28.1
    SetHome0,
    /// G30
    GoHome1,
    /// G30.1
    SetHome1,
    /// G53
    AbsoluteOverride,
    /// G92
    SetCoordinateOffset,
    /// G92.1
    ResetCoordinateOffset,
}

/// Motion mode (group 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Motion {
    /// G0
    #[default]
    Seek,
    /// G1
    Linear,
    /// G2
    CwArc,
    /// G3
    CcwArc,
    /// G38.2
    ProbeToward,
    /// G38.3
    ProbeTowardNoError,
    /// G38.4
    ProbeAway,
    /// G38.5
    ProbeAwayNoError,
    /// G80
    None,
}

impl Motion {
    pub fn is_arc(self) -> bool {
        matches!(self, Motion::CwArc | Motion::CcwArc)
    }

    pub fn is_probe(self) -> bool {
        matches!(
            self,
            Motion::ProbeToward
                | Motion::ProbeTowardNoError
                | Motion::ProbeAway
                | Motion::ProbeAwayNoError
        )
    }

    /// G1, G2 and G3: modes that cut, so laser power stays on
    pub fn is_cutting(self) -> bool {
        matches!(self, Motion::Linear | Motion::CwArc | Motion::CcwArc)
    }
}

/// Plane select (group 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Plane {
    /// G17
    #[default]
    XY,
    /// G18
    ZX,
    /// G19
    YZ,
}

/// Axes of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlaneAxes {
    pub axis_0: usize,
    pub axis_1: usize,
    /// Axis perpendicular to the plane; helical motion runs along it
    pub linear: usize,
}

impl Plane {
    pub fn axes(self) -> PlaneAxes {
        match self {
            Plane::XY => PlaneAxes {
                axis_0: 0,
                axis_1: 1,
                linear: 2,
            },
            Plane::ZX => PlaneAxes {
                axis_0: 2,
                axis_1: 0,
                linear: 1,
            },
            Plane::YZ => PlaneAxes {
                axis_0: 1,
                axis_1: 2,
                linear: 0,
            },
        }
    }
}

/// Distance mode (group 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Distance {
    /// G90
    #[default]
    Absolute,
    /// G91
    Incremental,
}

/// Feed rate mode (group 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FeedMode {
    /// G94
    #[default]
    UnitsPerMinute,
    /// G93
    InverseTime,
}

/// Units (group 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Units {
    /// G21
    #[default]
    Mm,
    /// G20
    Inches,
}

/// Tool length offset mode (group 8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ToolLength {
    /// G49
    #[default]
    Cancel,
    /// G43.1
    Dynamic,
}

/// Program flow (group M4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramFlow {
    #[default]
    Running,
    /// M0
    Paused,
    /// M1, accepted and ignored
    OptionalStop,
    /// M2
    CompletedM2,
    /// M30
    CompletedM30,
}

/// User I/O command (group M10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoControl {
    /// M62
    DigitalOnSync,
    /// M63
    DigitalOffSync,
    /// M64
    DigitalOnImmediate,
    /// M65
    DigitalOffImmediate,
    /// M67
    AnalogSync,
    /// M68
    AnalogImmediate,
}

impl IoControl {
    pub fn is_digital(self) -> bool {
        !self.is_analog()
    }

    pub fn is_analog(self) -> bool {
        matches!(self, IoControl::AnalogSync | IoControl::AnalogImmediate)
    }

    /// Waits for queued motion before switching
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            IoControl::DigitalOnSync | IoControl::DigitalOffSync | IoControl::AnalogSync
        )
    }

    pub fn turns_on(self) -> bool {
        matches!(self, IoControl::DigitalOnSync | IoControl::DigitalOnImmediate)
    }
}

/// Coolant words on one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoolantWords {
    /// M7
    pub mist: bool,
    /// M8
    pub flood: bool,
    /// M9
    pub off: bool,
}

impl CoolantWords {
    pub fn is_empty(&self) -> bool {
        !self.mist && !self.flood && !self.off
    }

    /// Coolant state after applying these words to `current`
    pub fn apply(&self, current: CoolantState) -> CoolantState {
        if self.off {
            return CoolantState::OFF;
        }
        CoolantState {
            mist: current.mist || self.mist,
            flood: current.flood || self.flood,
        }
    }
}

/// Work coordinate systems and stored positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoordIndex {
    #[default]
    G54,
    G55,
    G56,
    G57,
    G58,
    G59,
    /// G28 stored position
    G28,
    /// G30 stored position
    G30,
}

impl CoordIndex {
    /// Number of work coordinate systems (G54-G59)
    pub const WORK_SYSTEMS: usize = 6;

    /// Total number of stored entries
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Work coordinate system by zero-based index (0 = G54)
    pub fn work(index: usize) -> Option<Self> {
        Some(match index {
            0 => CoordIndex::G54,
            1 => CoordIndex::G55,
            2 => CoordIndex::G56,
            3 => CoordIndex::G57,
            4 => CoordIndex::G58,
            5 => CoordIndex::G59,
            _ => return None,
        })
    }
}

/// Persistent modal state of the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModalState {
    pub motion: Motion,
    pub feed_mode: FeedMode,
    pub units: Units,
    pub distance: Distance,
    pub plane: Plane,
    pub tool_length: ToolLength,
    pub coord_select: CoordIndex,
    pub program_flow: ProgramFlow,
    pub spindle: SpindleState,
    pub coolant: CoolantState,
    /// M56 parking override control
    pub override_control: bool,
}
