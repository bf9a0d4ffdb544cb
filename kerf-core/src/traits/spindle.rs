//! Spindle and coolant traits
//!
//! Spindle output may be a PWM-driven motor controller or a laser. In laser
//! mode the step interrupt scales power with the actual feed rate on every
//! segment.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Spindle direction and power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpindleState {
    /// Off (M5)
    #[default]
    Disable,
    /// Clockwise (M3)
    Cw,
    /// Counter-clockwise (M4), dynamic power in laser mode
    Ccw,
}

/// Coolant outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoolantState {
    /// Mist coolant (M7)
    pub mist: bool,
    /// Flood coolant (M8)
    pub flood: bool,
}

impl CoolantState {
    pub const OFF: CoolantState = CoolantState {
        mist: false,
        flood: false,
    };

    pub fn is_off(&self) -> bool {
        !self.mist && !self.flood
    }
}

/// Spindle (or laser) output
pub trait Spindle {
    /// Update the speed without changing direction.
    ///
    /// Called by the step interrupt as each segment loads, so this must not block.
    fn set_rpm(&mut self, rpm: f32);

    /// Set direction and speed
    fn set_state(&mut self, state: SpindleState, rpm: f32);

    /// Apply a state change after queued motion has finished.
    ///
    /// The caller has already synchronized the motion buffer.
    fn sync(&mut self, state: SpindleState, rpm: f32) {
        self.set_state(state, rpm);
    }

    /// Power follows feed rate and S changes do not stop motion
    fn is_laser_mode(&self) -> bool {
        false
    }

    fn stop(&mut self) {
        self.set_state(SpindleState::Disable, 0.0);
    }
}

/// Coolant output
pub trait Coolant {
    fn set_state(&mut self, state: CoolantState);

    fn stop(&mut self) {
        self.set_state(CoolantState::OFF);
    }
}

/// Spindle placeholder for machines without one
pub struct NoSpindle;

impl Spindle for NoSpindle {
    fn set_rpm(&mut self, _rpm: f32) {}

    fn set_state(&mut self, _state: SpindleState, _rpm: f32) {}
}

/// Coolant placeholder for machines without coolant outputs
pub struct NoCoolant;

impl Coolant for NoCoolant {
    fn set_state(&mut self, _state: CoolantState) {}
}
