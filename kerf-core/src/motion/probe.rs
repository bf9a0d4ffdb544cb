//! Probing cycle (G38.x)

use super::control::MotionControl;
use super::position::Position;
use crate::planner::{PlanLineData, Planner};
use crate::system::{Alarm, MachineState, ProbeState};

/// How the parser should update its position after a probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProbeOutcome {
    /// Leave the parser position alone
    None,
    /// The probe move ran to its target (or nothing moved in check mode)
    Target,
    /// Contact made; reload from the machine position
    System,
}

/// Probe cycle options taken from the G38 variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProbeFlags {
    /// Move until the probe opens (G38.4/G38.5)
    pub away: bool,
    /// Reaching the target without contact is not an alarm (G38.3/G38.5)
    pub no_error: bool,
}

impl<P: Planner> MotionControl<'_, P> {
    /// Move toward `target` until the probe changes state.
    ///
    /// The step interrupt latches the contact position and cancels the rest
    /// of the move. Whatever remains queued afterwards is discarded and the
    /// planner is resynchronized to where the machine stopped.
    pub fn run_probe_cycle(
        &mut self,
        target: &Position,
        data: &PlanLineData,
        flags: ProbeFlags,
    ) -> ProbeOutcome {
        if self.sys.state() == MachineState::CheckMode {
            return ProbeOutcome::Target;
        }
        self.buffer_synchronize();
        if self.sys.is_aborted() {
            return ProbeOutcome::None;
        }

        self.sys.set_probe_succeeded(false);
        self.sys.set_probe_away(flags.away);
        if self.io.probe.is_triggered() ^ flags.away {
            self.sys.raise_alarm(Alarm::ProbeFailInitial);
            self.execute_realtime();
            return ProbeOutcome::None;
        }

        let mut data = *data;
        data.condition.no_feed_override = true;
        self.submit_linear_move(target, &data);

        self.sys.set_probe_state(ProbeState::Active);
        self.sys.request_cycle_start();
        loop {
            self.execute_realtime();
            if self.sys.is_aborted() {
                return ProbeOutcome::None;
            }
            if self.sys.state() == MachineState::Idle {
                break;
            }
        }

        if self.sys.probe_state() == ProbeState::Active {
            if flags.no_error {
                self.sys.latch_probe_position();
            } else {
                self.sys.raise_alarm(Alarm::ProbeFailContact);
            }
        } else {
            self.sys.set_probe_succeeded(true);
        }
        self.sys.set_probe_state(ProbeState::Off);
        self.execute_realtime();

        self.reset_stepper();
        self.planner.reset();
        self.planner.sync_position(&self.sys.machine_position());

        if self.sys.probe_succeeded() {
            ProbeOutcome::System
        } else {
            ProbeOutcome::Target
        }
    }
}
