//! Realtime executor and reporting hooks
//!
//! Every busy-wait in the motion layer calls
//! [`RealtimeExecutor::service_pending_commands`] so realtime input (hold,
//! resume, overrides, reset) keeps flowing while the background context waits.

use crate::gcode::GcodeError;
use crate::system::{Alarm, SystemContext};

/// Identifies the host connection a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientId(pub u8);

impl ClientId {
    /// Primary serial connection
    pub const SERIAL: ClientId = ClientId(0);
    /// Every connected client
    pub const ALL: ClientId = ClientId(0xFF);
}

/// Feedback messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Feedback {
    /// Hard or soft limit tripped; reset required
    CriticalEvent,
    /// Safety door opened
    SafetyDoorAjar,
    /// M2/M30 reached
    ProgramEnd,
    /// Sleep entered
    SleepMode,
    /// Controller locked in the alarm state after power-up or reset
    AlarmLock,
    /// Alarm lock cleared without homing
    AlarmUnlock,
    /// Check mode entered
    Enabled,
    /// Check mode left
    Disabled,
}

pub trait RealtimeExecutor {
    /// Process input received since the last call.
    ///
    /// Realtime bytes are mapped onto [`SystemContext`] requests; nothing
    /// here may block.
    fn service_pending_commands(&mut self, sys: &SystemContext);

    /// Block for `ms` milliseconds
    fn wait_ms(&mut self, ms: u32);
}

/// Status and message output
pub trait Reporter {
    fn alarm(&mut self, _alarm: Alarm) {}

    fn feedback(&mut self, _message: Feedback) {}

    /// Status line for an error outside of a line result
    fn error(&mut self, _client: ClientId, _error: GcodeError) {}

    /// Operator message from a `(MSG,...)` comment or the firmware
    fn message(&mut self, _client: ClientId, _text: &str) {}

    /// Realtime status report requested
    fn status(&mut self, _sys: &SystemContext) {}
}

/// Reporter that discards everything
pub struct NullReporter;

impl Reporter for NullReporter {}
