//! Axis identifiers, axis masks and position vectors
//!
//! Positions in the motion layer are millimeters in machine space. The
//! stepper layer counts steps; [`steps_to_mpos`] and [`mpos_to_steps`]
//! convert between the two using the configured steps/mm.

use core::ops::{BitAnd, BitOr, Not};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// Maximum number of axes the firmware can drive
pub const MAX_N_AXIS: usize = 6;

/// Position vector in millimeters
pub type Position = [f32; MAX_N_AXIS];

/// Position vector in steps
pub type StepPosition = [i32; MAX_N_AXIS];

/// Logical axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
    A = 3,
    B = 4,
    C = 5,
}

impl Axis {
    /// All axes in index order
    pub const ALL: [Axis; MAX_N_AXIS] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    /// Index into position vectors
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Axis for a vector index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// G-code letter for this axis
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::A => 'A',
            Axis::B => 'B',
            Axis::C => 'C',
        }
    }
}

/// Set of axes, one bit per axis index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisMask(u8);

impl AxisMask {
    /// No axes
    pub const NONE: AxisMask = AxisMask(0);

    /// Every axis the firmware knows about
    pub const ALL: AxisMask = AxisMask((1 << MAX_N_AXIS) - 1);

    /// Mask from raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Mask containing a single axis
    pub const fn single(axis: Axis) -> Self {
        Self(1 << axis as u8)
    }

    /// Mask of the first `n_axis` axes
    pub const fn first(n_axis: usize) -> Self {
        if n_axis >= MAX_N_AXIS {
            Self::ALL
        } else {
            Self(((1u16 << n_axis) - 1) as u8)
        }
    }

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, axis: Axis) -> bool {
        self.0 & (1 << axis as u8) != 0
    }

    /// Check by vector index (used in hot loops)
    #[inline]
    pub const fn contains_index(self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    pub fn insert(&mut self, axis: Axis) {
        self.0 |= 1 << axis as u8;
    }

    #[inline]
    pub fn insert_index(&mut self, index: usize) {
        self.0 |= 1 << index;
    }

    pub fn remove(&mut self, axis: Axis) {
        self.0 &= !(1 << axis as u8);
    }

    pub fn intersects(self, other: AxisMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Number of axes in the mask
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// True when exactly one axis is set
    pub fn is_single_axis(self) -> bool {
        self.0 != 0 && (self.0 & (self.0 - 1)) == 0
    }

    /// Iterate over the axes in the mask, in index order
    pub fn iter(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl BitOr for AxisMask {
    type Output = AxisMask;

    fn bitor(self, rhs: AxisMask) -> AxisMask {
        AxisMask(self.0 | rhs.0)
    }
}

impl BitAnd for AxisMask {
    type Output = AxisMask;

    fn bitand(self, rhs: AxisMask) -> AxisMask {
        AxisMask(self.0 & rhs.0)
    }
}

impl Not for AxisMask {
    type Output = AxisMask;

    fn not(self) -> AxisMask {
        AxisMask(!self.0 & Self::ALL.0)
    }
}

/// Convert a step count to millimeters for one axis
pub fn steps_to_mm(steps: i32, steps_per_mm: f32) -> f32 {
    steps as f32 / steps_per_mm
}

/// Convert a machine step position into millimeters
pub fn steps_to_mpos(steps: &StepPosition, settings: &Settings) -> Position {
    let mut mpos = [0.0; MAX_N_AXIS];
    for (idx, value) in mpos.iter_mut().enumerate().take(settings.n_axis()) {
        *value = steps_to_mm(steps[idx], settings.axes[idx].steps_per_mm);
    }
    mpos
}

/// Convert a millimeter position to the nearest step position
pub fn mpos_to_steps(mpos: &Position, settings: &Settings) -> StepPosition {
    let mut steps = [0; MAX_N_AXIS];
    for (idx, value) in steps.iter_mut().enumerate().take(settings.n_axis()) {
        *value = libm::roundf(mpos[idx] * settings.axes[idx].steps_per_mm) as i32;
    }
    steps
}

/// Euclidean distance between two positions over the first `n_axis` axes
pub fn distance(a: &Position, b: &Position, n_axis: usize) -> f32 {
    let mut sum = 0.0;
    for idx in 0..n_axis.min(MAX_N_AXIS) {
        let d = a[idx] - b[idx];
        sum += d * d;
    }
    libm::sqrtf(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_axis_mask() {
        assert!(AxisMask::single(Axis::Y).is_single_axis());
        assert!(!AxisMask::NONE.is_single_axis());
        assert!(!(AxisMask::single(Axis::X) | AxisMask::single(Axis::Z)).is_single_axis());
    }

    #[test]
    fn test_first_axes() {
        assert_eq!(AxisMask::first(3).bits(), 0b111);
        assert_eq!(AxisMask::first(6), AxisMask::ALL);
        assert_eq!(AxisMask::first(9), AxisMask::ALL);
    }

    #[test]
    fn test_mask_iteration_order() {
        let mask = AxisMask::from_bits(0b10_0101);
        let mut axes = mask.iter();
        assert_eq!(axes.next(), Some(Axis::X));
        assert_eq!(axes.next(), Some(Axis::Z));
        assert_eq!(axes.next(), Some(Axis::C));
        assert_eq!(axes.next(), None);
    }

    #[test]
    fn test_not_stays_in_range() {
        let inverted = !AxisMask::single(Axis::X);
        assert_eq!(inverted.bits(), 0b11_1110);
    }

    #[test]
    fn test_step_conversion_round_trip() {
        let settings = Settings::default();
        let mpos = [10.0, -2.5, 0.25, 0.0, 0.0, 0.0];
        let steps = mpos_to_steps(&mpos, &settings);
        let back = steps_to_mpos(&steps, &settings);
        for idx in 0..settings.n_axis() {
            assert!((back[idx] - mpos[idx]).abs() < 1e-4);
        }
    }
}
