//! Step/direction output and homing hooks
//!
//! [`StepOutput`] is driven from the step interrupt only. Pulse width and the
//! direction-to-step delay are the implementation's job.

use crate::motion::position::AxisMask;
use crate::system::SquaringMode;

/// Step, direction and enable outputs for every motor
pub trait StepOutput {
    /// Start a step pulse on the axes in `mask`.
    ///
    /// On squared axes `mode` selects which of the two motors step.
    fn step(&mut self, mask: AxisMask, mode: SquaringMode);

    /// End the step pulse on every axis
    fn unstep(&mut self);

    /// Set direction outputs; bits set in `negative` move toward negative.
    ///
    /// Returns true when any output changed, so the caller knows a direction
    /// setup delay applies before the next step.
    fn set_direction(&mut self, negative: AxisMask) -> bool;

    /// Energize or release the drivers
    fn set_enable(&mut self, enabled: bool);
}

/// Per-motor homing hooks
///
/// Motors that home themselves (servos, sensorless drivers) remove their axes
/// from the mask so the switch-based cycle skips them.
pub trait HomingDriver {
    /// Enter or leave homing mode, returning the axes that need switch homing
    fn set_homing_mode(&mut self, mask: AxisMask, _homing: bool) -> AxisMask {
        mask
    }
}

/// Default homing hooks: every axis homes against its limit switch
pub struct SwitchHoming;

impl HomingDriver for SwitchHoming {}

/// Step timer control from the background context
pub trait StepTimer {
    /// Start periodic step interrupts
    fn start(&mut self);

    /// Stop step interrupts
    fn stop(&mut self);
}
