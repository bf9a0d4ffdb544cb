//! PWM spindle and laser output

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use kerf_core::config::SpindleSettings;
use kerf_core::traits::{Spindle, SpindleState};

use crate::{drive, duty_for_percent};

/// Spindle whose speed is a PWM duty cycle.
///
/// Speeds map linearly onto the duty range with `rpm_max` at full duty;
/// anything below `rpm_min` is raised to it, and 0 rpm turns the output off.
pub struct PwmSpindle<P, E, D> {
    pwm: P,
    enable: E,
    dir: D,
    rpm_min: f32,
    rpm_max: f32,
    laser_mode: bool,
    state: SpindleState,
}

impl<P: SetDutyCycle, E: OutputPin, D: OutputPin> PwmSpindle<P, E, D> {
    pub fn new(pwm: P, enable: E, dir: D, settings: &SpindleSettings) -> Self {
        let mut spindle = Self {
            pwm,
            enable,
            dir,
            rpm_min: settings.rpm_min,
            rpm_max: settings.rpm_max,
            laser_mode: settings.laser_mode,
            state: SpindleState::Disable,
        };
        spindle.stop();
        spindle
    }

    pub fn update_settings(&mut self, settings: &SpindleSettings) {
        self.rpm_min = settings.rpm_min;
        self.rpm_max = settings.rpm_max;
        self.laser_mode = settings.laser_mode;
    }

    pub fn state(&self) -> SpindleState {
        self.state
    }

    fn duty(&self, rpm: f32) -> u16 {
        if rpm <= 0.0 || self.rpm_max <= 0.0 {
            return 0;
        }
        let rpm = rpm.clamp(self.rpm_min, self.rpm_max);
        duty_for_percent(&self.pwm, rpm / self.rpm_max * 100.0)
    }
}

impl<P: SetDutyCycle, E: OutputPin, D: OutputPin> Spindle for PwmSpindle<P, E, D> {
    fn set_rpm(&mut self, rpm: f32) {
        if self.state == SpindleState::Disable {
            return;
        }
        let duty = self.duty(rpm);
        let _ = self.pwm.set_duty_cycle(duty);
    }

    fn set_state(&mut self, state: SpindleState, rpm: f32) {
        let duty = if state == SpindleState::Disable {
            0
        } else {
            drive(&mut self.dir, state == SpindleState::Ccw);
            self.duty(rpm)
        };
        // Duty first: some boards gate a level shifter with the enable pin
        let _ = self.pwm.set_duty_cycle(duty);
        drive(&mut self.enable, state != SpindleState::Disable);
        self.state = state;
    }

    fn is_laser_mode(&self) -> bool {
        self.laser_mode
    }
}
