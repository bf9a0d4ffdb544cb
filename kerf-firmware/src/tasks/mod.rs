//! Embassy async tasks
//!
//! All of these run on the high-priority interrupt executor so they preempt
//! the blocking protocol loop in thread mode.

pub mod limits;
pub mod serial;
pub mod step;

pub use limits::{limit_task, PolledLimits};
pub use serial::{serial_rx_task, serial_tx_task};
pub use step::{step_task, TaskTimer, TimedOutput};
