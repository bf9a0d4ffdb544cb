//! Hardware abstraction traits
//!
//! These traits define the interface between the motion core and
//! hardware-specific implementations. Optional hooks have default no-op
//! methods and placeholder types for machines that lack the hardware.

pub mod io;
pub mod kinematics;
pub mod motor;
pub mod realtime;
pub mod spindle;

pub use io::{DoorSwitch, LimitSwitches, NoDoor, NoLimits, NoProbe, NoUserIo, ProbeInput, UserIo};
pub use kinematics::{Cartesian, Kinematics};
pub use motor::{HomingDriver, StepOutput, StepTimer, SwitchHoming};
pub use realtime::{ClientId, Feedback, NullReporter, RealtimeExecutor, Reporter};
pub use spindle::{Coolant, CoolantState, NoCoolant, NoSpindle, Spindle, SpindleState};

/// Everything the motion layer drives from the background context
pub struct MachineIo<'a> {
    pub spindle: &'a mut dyn Spindle,
    pub coolant: &'a mut dyn Coolant,
    pub user_io: &'a mut dyn UserIo,
    pub probe: &'a mut dyn ProbeInput,
    pub limits: &'a mut dyn LimitSwitches,
    pub door: &'a mut dyn DoorSwitch,
    pub kinematics: &'a mut dyn Kinematics,
    pub homing: &'a mut dyn HomingDriver,
    pub timer: &'a mut dyn StepTimer,
    pub executor: &'a mut dyn RealtimeExecutor,
    pub reporter: &'a mut dyn Reporter,
}
