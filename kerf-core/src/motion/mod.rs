//! Motion control
//!
//! Everything between a validated G-code block and the planner: lines,
//! arcs, dwells, homing, probing, jogging, soft limits, and the realtime
//! protocol that keeps running while the background context waits.

pub mod arc;
pub mod control;
pub mod homing;
pub mod jog;
pub mod limits;
pub mod position;
pub mod probe;
pub mod protocol;

pub use control::MotionControl;
pub use position::{Axis, AxisMask, Position, StepPosition, MAX_N_AXIS};
pub use probe::{ProbeFlags, ProbeOutcome};
pub use protocol::RealtimeCommand;
