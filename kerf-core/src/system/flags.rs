//! Atomic flag sets shared between the background and interrupt contexts
//!
//! Each flag enum names its bits; [`AtomicFlags`] stores them in one
//! `AtomicU8` so any context can raise or consume a flag without locking.

use core::marker::PhantomData;

use portable_atomic::{AtomicU8, Ordering};

/// A flag that occupies one bit of an [`AtomicFlags`]
pub trait FlagBit: Copy {
    /// Bit position, 0..8
    fn bit(self) -> u8;

    fn mask(self) -> u8 {
        1 << self.bit()
    }
}

/// Realtime execution requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ExecFlag {
    Reset = 0,
    CycleStart = 1,
    FeedHold = 2,
    MotionCancel = 3,
    StatusReport = 4,
    SafetyDoor = 5,
    Sleep = 6,
}

/// Suspend bookkeeping for holds, doors and cancels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SuspendFlag {
    /// Motion has decelerated to a stop
    HoldComplete = 0,
    /// Spindle and coolant de-energized for a door or sleep
    RetractComplete = 1,
    /// Resume from a door requested
    InitiateRestore = 2,
    /// Door restore finished, cycle start pending
    RestoreComplete = 3,
    /// Door open; resume blocked
    SafetyDoorAjar = 4,
    /// Cancel the rest of the current motion once stopped
    MotionCancel = 5,
    /// Cancel all queued jog motion once stopped
    JogCancel = 6,
}

/// Segment preparer control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StepControl {
    /// Preparer is blocked until the next cycle start
    EndMotion = 0,
    /// Forced deceleration to zero speed
    ExecuteHold = 1,
    /// Executing a homing or parking motion that must stop at its end
    ExecuteSysMotion = 2,
    /// Recompute spindle output for the next segment
    UpdateSpindleRpm = 3,
}

impl FlagBit for ExecFlag {
    fn bit(self) -> u8 {
        self as u8
    }
}

impl FlagBit for SuspendFlag {
    fn bit(self) -> u8 {
        self as u8
    }
}

impl FlagBit for StepControl {
    fn bit(self) -> u8 {
        self as u8
    }
}

/// Snapshot of an [`AtomicFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSet<F> {
    bits: u8,
    _flags: PhantomData<F>,
}

impl<F: FlagBit> FlagSet<F> {
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _flags: PhantomData,
        }
    }

    pub fn contains(&self, flag: F) -> bool {
        self.bits & flag.mask() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn with(mut self, flag: F) -> Self {
        self.bits |= flag.mask();
        self
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }
}

/// Lock-free set of flags of one kind
pub struct AtomicFlags<F> {
    bits: AtomicU8,
    _flags: PhantomData<F>,
}

impl<F: FlagBit> AtomicFlags<F> {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
            _flags: PhantomData,
        }
    }

    pub fn set(&self, flag: F) {
        self.bits.fetch_or(flag.mask(), Ordering::AcqRel);
    }

    pub fn clear(&self, flag: F) {
        self.bits.fetch_and(!flag.mask(), Ordering::AcqRel);
    }

    pub fn contains(&self, flag: F) -> bool {
        self.bits.load(Ordering::Acquire) & flag.mask() != 0
    }

    /// Clear a flag, returning whether it was set
    pub fn take(&self, flag: F) -> bool {
        self.bits.fetch_and(!flag.mask(), Ordering::AcqRel) & flag.mask() != 0
    }

    pub fn load(&self) -> FlagSet<F> {
        FlagSet {
            bits: self.bits.load(Ordering::Acquire),
            _flags: PhantomData,
        }
    }

    /// Replace every flag at once
    pub fn store(&self, flags: FlagSet<F>) {
        self.bits.store(flags.bits, Ordering::Release);
    }

    pub fn clear_all(&self) {
        self.bits.store(0, Ordering::Release);
    }

    pub fn is_empty(&self) -> bool {
        self.bits.load(Ordering::Acquire) == 0
    }
}

impl<F: FlagBit> Default for AtomicFlags<F> {
    fn default() -> Self {
        Self::new()
    }
}
