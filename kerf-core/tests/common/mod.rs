//! Simulated machine for pipeline tests
//!
//! The realtime executor doubles as the step timer: every time the motion
//! layer services realtime input, the executor runs a few ticks of the real
//! step interrupt. Motors count pulses into a physical position that the
//! mock limit switches and probe read, so homing and probing see the same
//! motion the interrupt produced.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use kerf_core::config::Settings;
use kerf_core::gcode::line::collapse;
use kerf_core::gcode::{CoordinateTable, GcodeError, Parser};
use kerf_core::motion::position::{AxisMask, MAX_N_AXIS};
use kerf_core::motion::{MotionControl, RealtimeCommand};
use kerf_core::planner::{BlockQueue, Planner};
use kerf_core::stepper::{SegmentPreparer, StepInterrupt, StepperQueues, Tick};
use kerf_core::system::{Alarm, MachineState, SquaringMode, SystemContext};
use kerf_core::traits::{
    Cartesian, ClientId, Coolant, CoolantState, DoorSwitch, Feedback, LimitSwitches, MachineIo,
    NoSpindle, ProbeInput, RealtimeExecutor, Reporter, Spindle, SpindleState, StepOutput,
    StepTimer, SwitchHoming, UserIo,
};

/// Interrupt ticks run per realtime service call
pub const TICKS_PER_SERVICE: u32 = 2;

/// Digital and analog user ports on the rig
pub const USER_PORTS: usize = 4;

const SETTLE_LIMIT: u32 = 500_000;

/// Shared observable state of the simulated machine
#[derive(Default)]
pub struct Rig {
    pub timer_running: Cell<bool>,
    /// Position in steps as the motors actually moved
    pub physical: [Cell<i32>; MAX_N_AXIS],
    pub services: Cell<u32>,
    pub ticks: Cell<u32>,
    pub clock_ms: Cell<u32>,
    /// Realtime bytes delivered once `services` reaches the key
    pub script: RefCell<VecDeque<(u32, u8)>>,
    /// Limit switch closes when the physical position reaches the value
    pub limit_at: [Cell<Option<i32>>; MAX_N_AXIS],
    /// Probe closes when the physical position of the axis drops to the value
    pub probe_at: Cell<Option<(usize, i32)>>,
    /// Door reads ajar until `services` reaches the value
    pub door_open_until: Cell<Option<u32>>,
    pub spindle: Cell<(SpindleState, f32)>,
    pub spindle_log: RefCell<Vec<SpindleState>>,
    pub spindle_rpm: Cell<f32>,
    pub coolant: Cell<CoolantState>,
    pub digital: RefCell<[bool; USER_PORTS]>,
    pub analog: RefCell<[f32; USER_PORTS]>,
    pub alarms: RefCell<Vec<Alarm>>,
    pub feedback: RefCell<Vec<Feedback>>,
    pub messages: RefCell<Vec<String>>,
    pub states: RefCell<Vec<MachineState>>,
    pub ganged_modes: RefCell<Vec<SquaringMode>>,
}

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a realtime byte after `services` realtime checks
    pub fn at(&self, services: u32, byte: u8) {
        self.script.borrow_mut().push_back((services, byte));
    }

    /// Deliver a realtime byte `services` realtime checks from now
    pub fn after(&self, services: u32, byte: u8) {
        self.at(self.services.get() + services, byte);
    }

    pub fn saw_state(&self, state: MachineState) -> bool {
        self.states.borrow().contains(&state)
    }

    fn record_state(&self, state: MachineState) {
        let mut states = self.states.borrow_mut();
        if states.last() != Some(&state) {
            states.push(state);
        }
    }
}

struct RigTimer<'r>(&'r Rig);

impl StepTimer for RigTimer<'_> {
    fn start(&mut self) {
        self.0.timer_running.set(true);
    }

    fn stop(&mut self) {
        self.0.timer_running.set(false);
    }
}

struct RigMotors<'r> {
    rig: &'r Rig,
    negative: AxisMask,
}

impl StepOutput for RigMotors<'_> {
    fn step(&mut self, mask: AxisMask, mode: SquaringMode) {
        if mask.is_empty() {
            return;
        }
        for idx in 0..MAX_N_AXIS {
            if mask.contains_index(idx) {
                let cell = &self.rig.physical[idx];
                let delta = if self.negative.contains_index(idx) { -1 } else { 1 };
                cell.set(cell.get() + delta);
            }
        }
        let mut modes = self.rig.ganged_modes.borrow_mut();
        if modes.last() != Some(&mode) {
            modes.push(mode);
        }
    }

    fn unstep(&mut self) {}

    fn set_direction(&mut self, negative: AxisMask) -> bool {
        let changed = negative != self.negative;
        self.negative = negative;
        changed
    }

    fn set_enable(&mut self, _enabled: bool) {}
}

struct RigProbe<'r>(&'r Rig);

impl ProbeInput for RigProbe<'_> {
    fn is_triggered(&mut self) -> bool {
        self.0
            .probe_at
            .get()
            .is_some_and(|(axis, at)| self.0.physical[axis].get() <= at)
    }
}

struct RigLimits<'r>(&'r Rig);

impl LimitSwitches for RigLimits<'_> {
    fn triggered(&mut self) -> AxisMask {
        let mut mask = AxisMask::NONE;
        for idx in 0..MAX_N_AXIS {
            if let Some(at) = self.0.limit_at[idx].get() {
                if self.0.physical[idx].get() >= at {
                    mask.insert_index(idx);
                }
            }
        }
        mask
    }
}

struct RigDoor<'r>(&'r Rig);

impl DoorSwitch for RigDoor<'_> {
    fn is_ajar(&mut self) -> bool {
        self.0
            .door_open_until
            .get()
            .is_some_and(|until| self.0.services.get() < until)
    }
}

struct RigSpindle<'r>(&'r Rig);

impl Spindle for RigSpindle<'_> {
    fn set_rpm(&mut self, rpm: f32) {
        self.0.spindle_rpm.set(rpm);
    }

    fn set_state(&mut self, state: SpindleState, rpm: f32) {
        self.0.spindle.set((state, rpm));
        self.0.spindle_rpm.set(rpm);
        self.0.spindle_log.borrow_mut().push(state);
    }
}

struct RigCoolant<'r>(&'r Rig);

impl Coolant for RigCoolant<'_> {
    fn set_state(&mut self, state: CoolantState) {
        self.0.coolant.set(state);
    }
}

struct RigUserIo<'r>(&'r Rig);

impl UserIo for RigUserIo<'_> {
    fn set_digital(&mut self, index: u8, on: bool) -> bool {
        match self.0.digital.borrow_mut().get_mut(index as usize) {
            Some(port) => {
                *port = on;
                true
            }
            None => false,
        }
    }

    fn set_analog(&mut self, index: u8, percent: f32) -> bool {
        match self.0.analog.borrow_mut().get_mut(index as usize) {
            Some(port) => {
                *port = percent;
                true
            }
            None => false,
        }
    }

    fn all_off(&mut self) {
        *self.0.digital.borrow_mut() = [false; USER_PORTS];
        *self.0.analog.borrow_mut() = [0.0; USER_PORTS];
    }
}

struct RigReporter<'r>(&'r Rig);

impl Reporter for RigReporter<'_> {
    fn alarm(&mut self, alarm: Alarm) {
        self.0.alarms.borrow_mut().push(alarm);
    }

    fn feedback(&mut self, message: Feedback) {
        self.0.feedback.borrow_mut().push(message);
    }

    fn message(&mut self, _client: ClientId, text: &str) {
        self.0.messages.borrow_mut().push(text.to_string());
    }
}

struct RigExecutor<'q, 'r> {
    rig: &'r Rig,
    interrupt: StepInterrupt<'q>,
    motors: RigMotors<'r>,
    probe: RigProbe<'r>,
}

impl RealtimeExecutor for RigExecutor<'_, '_> {
    fn service_pending_commands(&mut self, sys: &SystemContext) {
        let rig = self.rig;
        let services = rig.services.get() + 1;
        rig.services.set(services);

        {
            let mut script = rig.script.borrow_mut();
            while script.front().is_some_and(|(at, _)| *at <= services) {
                if let Some((_, byte)) = script.pop_front() {
                    if let Some(command) = RealtimeCommand::from_byte(byte) {
                        command.apply(sys);
                    }
                }
            }
        }

        // The host acknowledges limit alarms right away
        if sys.alarm().is_some_and(Alarm::is_critical) {
            sys.request_reset();
        }

        if !rig.timer_running.get() {
            self.interrupt.service_flush(sys);
        } else {
            for _ in 0..TICKS_PER_SERVICE {
                let tick = self.interrupt.on_tick(
                    sys,
                    &mut self.motors,
                    &mut NoSpindle,
                    &mut self.probe,
                );
                match tick {
                    Tick::Continue { .. } => rig.ticks.set(rig.ticks.get() + 1),
                    Tick::Idle | Tick::Busy => {
                        rig.timer_running.set(false);
                        break;
                    }
                }
            }
        }
        rig.record_state(sys.state());
    }

    fn wait_ms(&mut self, ms: u32) {
        self.rig.clock_ms.set(self.rig.clock_ms.get() + ms);
    }
}

/// A powered-up machine: motion control over the simulated rig plus a parser
pub struct Bench<'a, const N: usize> {
    pub mc: MotionControl<'a, BlockQueue<N>>,
    pub parser: Parser,
    pub sys: &'a SystemContext,
    pub rig: &'a Rig,
}

impl<const N: usize> Bench<'_, N> {
    /// Run one line the way the protocol loop does
    pub fn line(&mut self, text: &str) -> Result<(), GcodeError> {
        let collapsed = collapse(text.as_bytes(), |_| {});
        self.parser
            .execute_line(&collapsed, ClientId::SERIAL, &mut self.mc)
    }

    /// Start queued motion and run until the machine comes to rest
    pub fn settle(&mut self) {
        for _ in 0..SETTLE_LIMIT {
            if self.sys.state() == MachineState::Idle {
                self.mc.auto_cycle_start();
            }
            self.mc.execute_realtime();
            if self.sys.is_aborted() {
                return;
            }
            let resting = matches!(
                self.sys.state(),
                MachineState::Idle | MachineState::Alarm | MachineState::CheckMode
            );
            let drained = self.mc.planner().current_block().is_none();
            if resting && drained && !self.rig.timer_running.get() {
                return;
            }
        }
        panic!("machine did not settle, state {:?}", self.sys.state());
    }

    /// Clear an abort the way the main loop does
    pub fn recover(&mut self) {
        self.mc.reinitialize();
        self.parser.reset(&self.mc);
    }

    pub fn steps(&self) -> [i32; 3] {
        let position = self.sys.machine_position();
        [position[0], position[1], position[2]]
    }

    pub fn physical(&self) -> [i32; 3] {
        [
            self.rig.physical[0].get(),
            self.rig.physical[1].get(),
            self.rig.physical[2].get(),
        ]
    }
}

/// Default test settings: three axes at 100 steps/mm
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.homing.debounce_ms = 0;
    settings
}

/// Build a machine around `rig` and hand it to `test`
pub fn with_machine<const N: usize, R>(
    settings: &Settings,
    rig: &Rig,
    test: impl FnOnce(&mut Bench<'_, N>) -> R,
) -> R {
    let sys = SystemContext::new();
    let mut queues = StepperQueues::new();
    let (producer, consumer) = queues.split();

    let mut executor = RigExecutor {
        rig,
        interrupt: StepInterrupt::new(consumer, settings),
        motors: RigMotors {
            rig,
            negative: AxisMask::NONE,
        },
        probe: RigProbe(rig),
    };
    let mut spindle = RigSpindle(rig);
    let mut coolant = RigCoolant(rig);
    let mut user_io = RigUserIo(rig);
    let mut probe = RigProbe(rig);
    let mut limits = RigLimits(rig);
    let mut door = RigDoor(rig);
    let mut kinematics = Cartesian;
    let mut homing = SwitchHoming;
    let mut timer = RigTimer(rig);
    let mut reporter = RigReporter(rig);

    let io = MachineIo {
        spindle: &mut spindle,
        coolant: &mut coolant,
        user_io: &mut user_io,
        probe: &mut probe,
        limits: &mut limits,
        door: &mut door,
        kinematics: &mut kinematics,
        homing: &mut homing,
        timer: &mut timer,
        executor: &mut executor,
        reporter: &mut reporter,
    };

    let planner: BlockQueue<N> = BlockQueue::new(settings);
    let preparer = SegmentPreparer::new(producer, settings);
    let mut mc = MotionControl::new(&sys, settings, planner, preparer, io);
    mc.reinitialize();
    let mut parser = Parser::new(CoordinateTable::new());
    parser.reset(&mc);

    let mut bench = Bench {
        mc,
        parser,
        sys: &sys,
        rig,
    };
    test(&mut bench)
}
