//! M62-M68 user outputs

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use kerf_core::traits::UserIo;

use crate::{drive, duty_for_percent};

/// Digital outputs on GPIO pins and analog outputs on PWM channels
pub struct GpioUserIo<D, A, const ND: usize, const NA: usize> {
    digital: [D; ND],
    analog: [A; NA],
}

impl<D: OutputPin, A: SetDutyCycle, const ND: usize, const NA: usize> GpioUserIo<D, A, ND, NA> {
    pub fn new(digital: [D; ND], analog: [A; NA]) -> Self {
        let mut io = Self { digital, analog };
        io.all_off();
        io
    }
}

impl<D: OutputPin, A: SetDutyCycle, const ND: usize, const NA: usize> UserIo
    for GpioUserIo<D, A, ND, NA>
{
    fn set_digital(&mut self, index: u8, on: bool) -> bool {
        match self.digital.get_mut(usize::from(index)) {
            Some(pin) => {
                drive(pin, on);
                true
            }
            None => false,
        }
    }

    fn set_analog(&mut self, index: u8, percent: f32) -> bool {
        match self.analog.get_mut(usize::from(index)) {
            Some(pwm) => {
                let duty = duty_for_percent(pwm, percent);
                let _ = pwm.set_duty_cycle(duty);
                true
            }
            None => false,
        }
    }

    fn all_off(&mut self) {
        for pin in self.digital.iter_mut() {
            drive(pin, false);
        }
        for pwm in self.analog.iter_mut() {
            let _ = pwm.set_duty_cycle(0);
        }
    }
}
