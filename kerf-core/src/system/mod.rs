//! System context, machine state and realtime flags

pub mod context;
pub mod flags;
pub mod state;

pub use context::{feed_override, rapid_override, spindle_override, SystemContext};
pub use flags::{AtomicFlags, ExecFlag, FlagBit, FlagSet, StepControl, SuspendFlag};
pub use state::{Alarm, MachineState, ProbeState, SquaringMode};
