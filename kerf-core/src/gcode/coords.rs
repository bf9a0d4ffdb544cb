//! Stored coordinate data: G54-G59 offsets and G28/G30 positions

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::modal::CoordIndex;
use crate::motion::position::{Position, MAX_N_AXIS};

/// Largest serialized [`CoordinateTable`]
pub const MAX_COORDS_SIZE: usize = 256;

/// Coordinate data kept across resets
///
/// The firmware persists this table whenever [`take_dirty`](Self::take_dirty)
/// reports a change.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordinateTable {
    entries: [Position; CoordIndex::COUNT],
    #[cfg_attr(feature = "serde", serde(skip))]
    dirty: bool,
}

impl Default for CoordinateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinateTable {
    pub const fn new() -> Self {
        Self {
            entries: [[0.0; MAX_N_AXIS]; CoordIndex::COUNT],
            dirty: false,
        }
    }

    pub fn get(&self, index: CoordIndex) -> Position {
        self.entries[index.index()]
    }

    pub fn set(&mut self, index: CoordIndex, value: &Position) {
        if self.entries[index.index()] != *value {
            self.entries[index.index()] = *value;
            self.dirty = true;
        }
    }

    /// True once after any entry changed
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }

    #[cfg(feature = "serde")]
    pub fn to_bytes<'b>(&self, buf: &'b mut [u8]) -> Option<&'b mut [u8]> {
        postcard::to_slice(self, buf).ok()
    }

    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        postcard::from_bytes(bytes).ok()
    }
}
