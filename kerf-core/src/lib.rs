//! Board-agnostic motion core for the Kerf controller
//!
//! Everything between a line of G-code and a step pulse that does not
//! depend on a particular board:
//!
//! - G-code scanning, validation and execution
//! - Motion control: lines, arcs, dwells, homing, probing, jogging
//! - The realtime protocol: holds, cycle start, overrides, resets, alarms
//! - Planner contract and a reference block queue
//! - Segment preparation (ramps, AMASS) and the step pulse interrupt
//! - Hardware abstraction traits and machine settings

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod gcode;
pub mod motion;
pub mod planner;
pub mod stepper;
pub mod system;
pub mod traits;
