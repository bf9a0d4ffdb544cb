//! Mock pins shared by the driver tests

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;

#[derive(Debug, Default)]
pub struct MockPin {
    pub high: bool,
    /// Number of level changes
    pub edges: u32,
}

impl MockPin {
    pub fn high() -> Self {
        Self {
            high: true,
            edges: 0,
        }
    }

    fn set(&mut self, high: bool) {
        if self.high != high {
            self.edges += 1;
        }
        self.high = high;
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.high)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.high)
    }
}

/// Input that always fails to read
pub struct BrokenPin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadError;

impl embedded_hal::digital::Error for ReadError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl ErrorType for BrokenPin {
    type Error = ReadError;
}

impl InputPin for BrokenPin {
    fn is_high(&mut self) -> Result<bool, ReadError> {
        Err(ReadError)
    }

    fn is_low(&mut self) -> Result<bool, ReadError> {
        Err(ReadError)
    }
}

#[derive(Debug)]
pub struct MockPwm {
    pub duty: u16,
    pub max: u16,
}

impl MockPwm {
    pub fn new(max: u16) -> Self {
        Self { duty: 0, max }
    }
}

impl embedded_hal::pwm::ErrorType for MockPwm {
    type Error = Infallible;
}

impl SetDutyCycle for MockPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
        self.duty = duty;
        Ok(())
    }
}
