//! Machine states and alarms
//!
//! The state decides which realtime requests are honored and whether the
//! segment preparer runs. Alarms are latched until reset.

/// Machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MachineState {
    /// Ready, no motion
    Idle = 0,
    /// Locked out after an alarm; only reset, homing and settings allowed
    Alarm = 1,
    /// G-code is parsed but nothing moves
    CheckMode = 2,
    /// Homing cycle running
    Homing = 3,
    /// Executing queued motion
    Cycle = 4,
    /// Feed hold in progress or complete
    Hold = 5,
    /// Jog motion running
    Jog = 6,
    /// Safety door opened
    SafetyDoor = 7,
    /// Drivers and spindle off until reset
    Sleep = 8,
}

impl MachineState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => MachineState::Alarm,
            2 => MachineState::CheckMode,
            3 => MachineState::Homing,
            4 => MachineState::Cycle,
            5 => MachineState::Hold,
            6 => MachineState::Jog,
            7 => MachineState::SafetyDoor,
            8 => MachineState::Sleep,
            _ => MachineState::Idle,
        }
    }

    /// States in which the segment preparer keeps the ring full
    pub fn prepares_segments(self) -> bool {
        matches!(
            self,
            MachineState::Cycle
                | MachineState::Hold
                | MachineState::SafetyDoor
                | MachineState::Homing
                | MachineState::Sleep
                | MachineState::Jog
        )
    }

    /// States that have motion in flight or suspended
    pub fn is_moving(self) -> bool {
        matches!(
            self,
            MachineState::Cycle | MachineState::Homing | MachineState::Jog
        )
    }

    /// Name used in status reports
    pub fn name(self) -> &'static str {
        match self {
            MachineState::Idle => "Idle",
            MachineState::Alarm => "Alarm",
            MachineState::CheckMode => "Check",
            MachineState::Homing => "Home",
            MachineState::Cycle => "Run",
            MachineState::Hold => "Hold",
            MachineState::Jog => "Jog",
            MachineState::SafetyDoor => "Door",
            MachineState::Sleep => "Sleep",
        }
    }
}

/// Alarm sources, numbered as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Alarm {
    /// Limit switch closed during motion
    HardLimit = 1,
    /// Target outside the machine travel
    SoftLimit = 2,
    /// Reset while in motion, position may be lost
    AbortCycle = 3,
    /// Probe already triggered before the cycle started
    ProbeFailInitial = 4,
    /// Probe did not make contact within the programmed travel
    ProbeFailContact = 5,
    /// Reset during homing
    HomingFailReset = 6,
    /// Safety door opened during homing
    HomingFailDoor = 7,
    /// Pull-off did not clear the limit switch
    HomingFailPulloff = 8,
    /// Limit switch not found within the search distance
    HomingFailApproach = 9,
    /// Spindle failed to reach speed
    SpindleControl = 10,
}

impl Alarm {
    /// Numeric alarm code
    pub fn code(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Alarm::HardLimit,
            2 => Alarm::SoftLimit,
            3 => Alarm::AbortCycle,
            4 => Alarm::ProbeFailInitial,
            5 => Alarm::ProbeFailContact,
            6 => Alarm::HomingFailReset,
            7 => Alarm::HomingFailDoor,
            8 => Alarm::HomingFailPulloff,
            9 => Alarm::HomingFailApproach,
            10 => Alarm::SpindleControl,
            _ => return None,
        })
    }

    /// Limit alarms lock the controller until a reset
    pub fn is_critical(self) -> bool {
        matches!(self, Alarm::HardLimit | Alarm::SoftLimit)
    }
}

/// Probe cycle state shared with the step interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ProbeState {
    /// Probe not monitored
    Off = 0,
    /// Step interrupt samples the probe every tick
    Active = 1,
}

/// Which motors of a squared axis receive steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SquaringMode {
    /// Both motors
    Dual = 0,
    /// First motor only
    A = 1,
    /// Second motor only
    B = 2,
}

impl SquaringMode {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SquaringMode::A,
            2 => SquaringMode::B,
            _ => SquaringMode::Dual,
        }
    }
}
