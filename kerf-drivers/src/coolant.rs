//! Mist and flood coolant outputs

use embedded_hal::digital::OutputPin;
use kerf_core::traits::{Coolant, CoolantState};

use crate::drive;

/// Coolant valves on two GPIO pins
pub struct GpioCoolant<M, F> {
    mist: M,
    flood: F,
    invert: bool,
    state: CoolantState,
}

impl<M: OutputPin, F: OutputPin> GpioCoolant<M, F> {
    /// `invert`: valves open on a low level
    pub fn new(mist: M, flood: F, invert: bool) -> Self {
        let mut coolant = Self {
            mist,
            flood,
            invert,
            state: CoolantState::OFF,
        };
        coolant.stop();
        coolant
    }

    pub fn state(&self) -> CoolantState {
        self.state
    }
}

impl<M: OutputPin, F: OutputPin> Coolant for GpioCoolant<M, F> {
    fn set_state(&mut self, state: CoolantState) {
        drive(&mut self.mist, state.mist != self.invert);
        drive(&mut self.flood, state.flood != self.invert);
        self.state = state;
    }
}
