//! Board wiring for the BTT SKR Pico
//!
//! | Function        | GPIO                     |
//! |-----------------|--------------------------|
//! | X step/dir/en   | 11 / 10 / 12             |
//! | Y step/dir/en   | 6 / 5 / 7                |
//! | Z step/dir/en   | 19 / 28 / 2              |
//! | X/Y/Z limit     | 4 / 3 / 25               |
//! | Probe           | 22                       |
//! | Door            | 16 (E0 stop)             |
//! | Spindle PWM     | 17 (FAN1, slice 0 B)     |
//! | Spindle en/dir  | 18 / 20 (FAN2 / FAN3)    |
//! | Flood / mist    | 23 / 21 (HE0 / HB)       |
//! | User outputs    | 26, 27                   |
//! | Host UART       | 0 TX / 1 RX              |

use core::convert::Infallible;

use embassy_rp::gpio::{Input, Output};
use embassy_rp::pwm::PwmOutput;
use embedded_hal::digital::{ErrorType, OutputPin};

use kerf_drivers::coolant::GpioCoolant;
use kerf_drivers::inputs::{DoorInput, LimitInputs, SwitchProbe};
use kerf_drivers::spindle::PwmSpindle;
use kerf_drivers::stepper::GpioSteppers;
use kerf_drivers::user_io::GpioUserIo;
use kerf_drivers::NoPwm;

use crate::shared::Shared;

/// Motors wired on this board
pub const N_MOTORS: usize = 3;

/// Digital outputs for M62-M65
pub const N_USER_OUTPUTS: usize = 2;

/// Spindle PWM counter top; the duty range is 0..=SPINDLE_PWM_TOP
pub const SPINDLE_PWM_TOP: u16 = 1000;

/// Spindle PWM clock divider (125 MHz / 125 / 1000 = 1 kHz)
pub const SPINDLE_PWM_DIVIDER: u8 = 125;

pub type BoardMotors = GpioSteppers<Output<'static>, Output<'static>, EnableGroup<N_MOTORS>, N_MOTORS>;
pub type BoardLimits = LimitInputs<Input<'static>, N_MOTORS>;
pub type BoardProbe = SwitchProbe<Input<'static>>;
pub type BoardDoor = DoorInput<Input<'static>>;
pub type BoardSpindle = PwmSpindle<PwmOutput<'static>, Output<'static>, Output<'static>>;
pub type BoardCoolant = GpioCoolant<Output<'static>, Output<'static>>;
pub type BoardUserIo = GpioUserIo<Output<'static>, NoPwm, N_USER_OUTPUTS, 0>;

/// Sampled by the step task and checked before a probe cycle
pub static PROBE: Shared<BoardProbe> = Shared::new();

/// Programmed from the protocol loop, rate-adjusted per segment in laser mode
pub static SPINDLE: Shared<BoardSpindle> = Shared::new();

/// Watched for openings by the realtime executor and read by the motion layer
pub static DOOR: Shared<BoardDoor> = Shared::new();

/// Each driver on the SKR Pico has its own enable line; they switch together
pub struct EnableGroup<const N: usize>(pub [Output<'static>; N]);

impl<const N: usize> ErrorType for EnableGroup<N> {
    type Error = Infallible;
}

impl<const N: usize> OutputPin for EnableGroup<N> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.iter_mut().for_each(Output::set_low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.iter_mut().for_each(Output::set_high);
        Ok(())
    }
}
