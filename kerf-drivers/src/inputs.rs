//! Probe, limit and door switches
//!
//! Every input reads active when its pin is high, or low when inverted. A
//! pin that cannot be read counts as active, so a broken wire stops motion.

use embedded_hal::digital::InputPin;
use kerf_core::motion::position::AxisMask;
use kerf_core::traits::{DoorSwitch, LimitSwitches, ProbeInput};

use crate::is_active;

/// Touch probe input
pub struct SwitchProbe<P> {
    pin: P,
    invert: bool,
}

impl<P: InputPin> SwitchProbe<P> {
    pub fn new(pin: P, invert: bool) -> Self {
        Self { pin, invert }
    }

    pub fn set_invert(&mut self, invert: bool) {
        self.invert = invert;
    }
}

impl<P: InputPin> ProbeInput for SwitchProbe<P> {
    fn is_triggered(&mut self) -> bool {
        is_active(&mut self.pin, self.invert)
    }
}

/// One limit switch per axis
pub struct LimitInputs<I, const N: usize> {
    pins: [I; N],
    invert: AxisMask,
}

impl<I: InputPin, const N: usize> LimitInputs<I, N> {
    pub fn new(pins: [I; N], invert: AxisMask) -> Self {
        Self { pins, invert }
    }
}

impl<I: InputPin, const N: usize> LimitSwitches for LimitInputs<I, N> {
    fn triggered(&mut self) -> AxisMask {
        let mut mask = AxisMask::NONE;
        for (idx, pin) in self.pins.iter_mut().enumerate() {
            if is_active(pin, self.invert.contains_index(idx)) {
                mask.insert_index(idx);
            }
        }
        mask
    }
}

/// Safety door switch
pub struct DoorInput<P> {
    pin: P,
    invert: bool,
}

impl<P: InputPin> DoorInput<P> {
    pub fn new(pin: P, invert: bool) -> Self {
        Self { pin, invert }
    }
}

impl<P: InputPin> DoorSwitch for DoorInput<P> {
    fn is_ajar(&mut self) -> bool {
        is_active(&mut self.pin, self.invert)
    }
}
