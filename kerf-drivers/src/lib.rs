//! Hardware driver implementations
//!
//! Concrete implementations of the kerf-core hardware traits on top of
//! `embedded-hal` pins and PWM channels:
//!
//! - Step/direction/enable outputs, including a second motor for a squared axis
//! - PWM and relay spindles, laser mode
//! - Mist and flood coolant outputs
//! - Probe, limit and door switches
//! - M62-M68 user outputs

#![no_std]
#![deny(unsafe_code)]

pub mod coolant;
pub mod inputs;
pub mod spindle;
pub mod stepper;
pub mod user_io;

#[cfg(test)]
pub(crate) mod mock;

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};
use embedded_hal::pwm::SetDutyCycle;

/// Placeholder for an optional pin that is not wired
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

impl InputPin for NoPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(false)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(true)
    }
}

/// Placeholder for a PWM channel that is not wired
pub struct NoPwm;

impl embedded_hal::pwm::ErrorType for NoPwm {
    type Error = Infallible;
}

impl SetDutyCycle for NoPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, _duty: u16) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Drive `pin` to a logic level, ignoring output errors
pub(crate) fn drive<P: OutputPin>(pin: &mut P, high: bool) {
    let _ = pin.set_state(PinState::from(high));
}

/// Whether a switch reads active. An unreadable switch counts as active.
pub(crate) fn is_active<P: InputPin>(pin: &mut P, invert: bool) -> bool {
    pin.is_high().map_or(true, |high| high != invert)
}

/// Duty cycle for `percent` (0-100) of the channel's range
pub(crate) fn duty_for_percent<P: SetDutyCycle>(pwm: &P, percent: f32) -> u16 {
    let max = f32::from(pwm.max_duty_cycle());
    libm::roundf(percent.clamp(0.0, 100.0) * max / 100.0) as u16
}
