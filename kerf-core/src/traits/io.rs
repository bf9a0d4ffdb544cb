//! Machine inputs and auxiliary outputs

use crate::motion::position::AxisMask;

/// Touch probe input
pub trait ProbeInput {
    /// Probe is in contact, after applying any inversion
    fn is_triggered(&mut self) -> bool;
}

/// Limit switches, one bit per axis
pub trait LimitSwitches {
    /// Axes whose limit switch is closed, after applying any inversion
    fn triggered(&mut self) -> AxisMask;
}

/// Safety door switch
pub trait DoorSwitch {
    /// Door is open, after applying any inversion
    fn is_ajar(&mut self) -> bool;
}

/// User digital and analog outputs (M62-M68)
pub trait UserIo {
    /// Set a digital output. Returns false if the output does not exist.
    fn set_digital(&mut self, _index: u8, _on: bool) -> bool {
        false
    }

    /// Set an analog output in percent. Returns false if the output does not exist.
    fn set_analog(&mut self, _index: u8, _percent: f32) -> bool {
        false
    }

    /// Turn every output off
    fn all_off(&mut self) {}
}

/// Placeholder for machines without user outputs
pub struct NoUserIo;

impl UserIo for NoUserIo {}

/// Placeholder for machines without a probe
pub struct NoProbe;

impl ProbeInput for NoProbe {
    fn is_triggered(&mut self) -> bool {
        false
    }
}

/// Placeholder for machines without limit switches
pub struct NoLimits;

impl LimitSwitches for NoLimits {
    fn triggered(&mut self) -> AxisMask {
        AxisMask::NONE
    }
}

/// Placeholder for machines without a safety door
pub struct NoDoor;

impl DoorSwitch for NoDoor {
    fn is_ajar(&mut self) -> bool {
        false
    }
}
