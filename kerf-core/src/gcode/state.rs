//! Persistent parser state

use super::modal::ModalState;
use crate::motion::position::{Position, MAX_N_AXIS};

/// Axis that G43.1 offsets
pub const TOOL_LENGTH_OFFSET_AXIS: usize = 2;

/// State carried from line to line. Only a fully validated line changes it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParserState {
    pub modal: ModalState,
    /// Programmed spindle speed (rpm)
    pub spindle_speed: f32,
    /// Programmed feed rate (mm/min, or 1/min in inverse time)
    pub feed_rate: f32,
    /// Selected tool, tracked only
    pub tool: u8,
    pub line_number: Option<u32>,
    /// Where the program considers the tool to be, machine coordinates (mm)
    pub position: Position,
    /// Active work coordinate system offset (mm)
    pub coord_system: Position,
    /// G92 offset (mm)
    pub coord_offset: Position,
    /// G43.1 offset along [`TOOL_LENGTH_OFFSET_AXIS`] (mm)
    pub tool_length_offset: f32,
}

impl ParserState {
    /// Work coordinate offset of `axis`: coordinate system + G92 + tool length
    pub fn work_offset(&self, axis: usize) -> f32 {
        let mut offset = self.coord_system[axis] + self.coord_offset[axis];
        if axis == TOOL_LENGTH_OFFSET_AXIS {
            offset += self.tool_length_offset;
        }
        offset
    }

    /// Program position in work coordinates
    pub fn work_position(&self) -> Position {
        let mut work = [0.0; MAX_N_AXIS];
        for (axis, value) in work.iter_mut().enumerate() {
            *value = self.position[axis] - self.work_offset(axis);
        }
        work
    }
}
