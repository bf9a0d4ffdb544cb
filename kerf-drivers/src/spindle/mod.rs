//! Spindle drivers
//!
//! - [`PwmSpindle`]: speed on a PWM channel, with enable and direction pins.
//!   In laser mode the step interrupt drives its power per segment.
//! - [`RelaySpindle`]: on/off and direction only.

pub mod pwm;
pub mod relay;

pub use pwm::PwmSpindle;
pub use relay::RelaySpindle;
