//! On/off spindle

use embedded_hal::digital::OutputPin;
use kerf_core::traits::{Spindle, SpindleState};

use crate::drive;

/// Spindle switched by a relay; speed words are ignored
pub struct RelaySpindle<E, D> {
    enable: E,
    dir: D,
}

impl<E: OutputPin, D: OutputPin> RelaySpindle<E, D> {
    pub fn new(enable: E, dir: D) -> Self {
        let mut spindle = Self { enable, dir };
        spindle.stop();
        spindle
    }
}

impl<E: OutputPin, D: OutputPin> Spindle for RelaySpindle<E, D> {
    fn set_rpm(&mut self, _rpm: f32) {}

    fn set_state(&mut self, state: SpindleState, _rpm: f32) {
        if state != SpindleState::Disable {
            drive(&mut self.dir, state == SpindleState::Ccw);
        }
        drive(&mut self.enable, state != SpindleState::Disable);
    }
}
