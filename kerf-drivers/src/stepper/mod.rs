//! Step/direction/enable outputs
//!
//! One step and one direction pin per axis and a shared enable pin. A
//! squared axis gets a second step pin for its B motor; the ganged mode
//! chosen by homing decides which of the two motors receives the pulse.

use embedded_hal::digital::OutputPin;
use kerf_core::config::StepperSettings;
use kerf_core::motion::position::AxisMask;
use kerf_core::system::SquaringMode;
use kerf_core::traits::StepOutput;

use crate::drive;

/// Output pin polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepPolarity {
    /// Axes whose step pulse is active-low
    pub step_invert: AxisMask,
    /// Axes whose direction pin is inverted
    pub dir_invert: AxisMask,
    /// Drivers are enabled by a low level
    pub enable_invert: bool,
}

impl From<&StepperSettings> for StepPolarity {
    fn from(settings: &StepperSettings) -> Self {
        Self {
            step_invert: settings.step_invert,
            dir_invert: settings.dir_invert,
            enable_invert: settings.enable_invert,
        }
    }
}

struct SquaredMotor<S> {
    axis: usize,
    step: S,
}

/// GPIO stepper bank for `N` axes
pub struct GpioSteppers<S, D, E, const N: usize> {
    step: [S; N],
    dir: [D; N],
    enable: E,
    squared: Option<SquaredMotor<S>>,
    polarity: StepPolarity,
    negative: AxisMask,
    pulsed: AxisMask,
}

impl<S: OutputPin, D: OutputPin, E: OutputPin, const N: usize> GpioSteppers<S, D, E, N> {
    /// Take the pins and park them: no pulse, positive direction, drivers off
    pub fn new(step: [S; N], dir: [D; N], enable: E, polarity: StepPolarity) -> Self {
        let mut steppers = Self {
            step,
            dir,
            enable,
            squared: None,
            polarity,
            negative: AxisMask::NONE,
            pulsed: AxisMask::ALL,
        };
        steppers.unstep();
        for (idx, pin) in steppers.dir.iter_mut().enumerate() {
            drive(pin, polarity.dir_invert.contains_index(idx));
        }
        steppers.set_enable(false);
        steppers
    }

    /// Add the B motor of a squared axis
    pub fn with_squared_axis(mut self, axis: usize, mut step: S) -> Self {
        drive(&mut step, self.polarity.step_invert.contains_index(axis));
        self.squared = Some(SquaredMotor { axis, step });
        self
    }

    fn step_level(&self, idx: usize, active: bool) -> bool {
        active != self.polarity.step_invert.contains_index(idx)
    }
}

impl<S: OutputPin, D: OutputPin, E: OutputPin, const N: usize> StepOutput
    for GpioSteppers<S, D, E, N>
{
    fn step(&mut self, mask: AxisMask, mode: SquaringMode) {
        for idx in (0..N).filter(|&idx| mask.contains_index(idx)) {
            let level = self.step_level(idx, true);
            match &mut self.squared {
                Some(squared) if squared.axis == idx => {
                    if mode != SquaringMode::B {
                        drive(&mut self.step[idx], level);
                    }
                    if mode != SquaringMode::A {
                        drive(&mut squared.step, level);
                    }
                }
                _ => drive(&mut self.step[idx], level),
            }
        }
        self.pulsed = mask;
    }

    fn unstep(&mut self) {
        for idx in (0..N).filter(|&idx| self.pulsed.contains_index(idx)) {
            let level = self.step_level(idx, false);
            drive(&mut self.step[idx], level);
            if let Some(squared) = self.squared.as_mut().filter(|sq| sq.axis == idx) {
                drive(&mut squared.step, level);
            }
        }
        self.pulsed = AxisMask::NONE;
    }

    fn set_direction(&mut self, negative: AxisMask) -> bool {
        if negative == self.negative {
            return false;
        }
        for (idx, pin) in self.dir.iter_mut().enumerate() {
            drive(
                pin,
                negative.contains_index(idx) != self.polarity.dir_invert.contains_index(idx),
            );
        }
        self.negative = negative;
        true
    }

    fn set_enable(&mut self, enabled: bool) {
        drive(&mut self.enable, enabled != self.polarity.enable_invert);
    }
}
