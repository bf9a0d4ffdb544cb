//! Kinematics hooks
//!
//! Cartesian machines use [`Cartesian`]. Other geometries override the
//! transforms and, if they home differently, the homing hooks.

use crate::motion::position::{AxisMask, Position};

pub trait Kinematics {
    /// Run a complete custom homing cycle. Return true to skip the built-in one.
    fn custom_homing(&mut self, _mask: AxisMask) -> bool {
        false
    }

    /// Called before the built-in homing cycle. Return true to skip it.
    fn pre_homing(&mut self, _mask: AxisMask) -> bool {
        false
    }

    /// Called after a successful homing cycle
    fn post_homing(&mut self) {}

    /// Map a cartesian target to motor space
    fn to_motors(&mut self, target: &Position) -> Position {
        *target
    }

    /// Map motor positions back to cartesian space
    fn to_cartesian(&self, motors: &Position) -> Position {
        *motors
    }
}

/// Identity kinematics
pub struct Cartesian;

impl Kinematics for Cartesian {}
