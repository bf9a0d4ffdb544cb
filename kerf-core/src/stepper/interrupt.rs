//! Step pulse interrupt
//!
//! Runs once per timer period. Each tick outputs the step pulse computed on
//! the previous tick, then advances the Bresenham tracer of the executing
//! segment to decide which axes step next. Counting the position here, one
//! tick ahead of the pulse, keeps the pulse timing free of computation jitter.

use super::{Segment, SegmentConsumer, StepperBlock};
use crate::config::{Settings, IDLE_LOCK_FOREVER};
use crate::motion::position::{AxisMask, MAX_N_AXIS};
use crate::system::{ExecFlag, MachineState, ProbeState, SystemContext};
use crate::traits::{ProbeInput, Spindle, StepOutput};

/// What the timer should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tick {
    /// Fire again after `period` timer ticks
    Continue { period: u16 },
    /// Segment ring ran dry; stop the timer
    Idle,
    /// A previous tick is still running
    Busy,
}

/// Interrupt-side step generator
pub struct StepInterrupt<'q> {
    consumer: SegmentConsumer<'q>,
    n_axis: usize,
    idle_lock_forever: bool,

    counter: [u32; MAX_N_AXIS],
    steps: [u32; MAX_N_AXIS],
    step_count: u32,
    step_outbits: AxisMask,
    dir_outbits: AxisMask,
    period: u16,

    exec_segment: Option<Segment>,
    exec_block: Option<StepperBlock>,
    drivers_enabled: bool,
}

impl<'q> StepInterrupt<'q> {
    pub fn new(consumer: SegmentConsumer<'q>, settings: &Settings) -> Self {
        Self {
            consumer,
            n_axis: settings.n_axis(),
            idle_lock_forever: settings.stepper.idle_lock_ms == IDLE_LOCK_FOREVER,
            counter: [0; MAX_N_AXIS],
            steps: [0; MAX_N_AXIS],
            step_count: 0,
            step_outbits: AxisMask::NONE,
            dir_outbits: AxisMask::NONE,
            period: u16::MAX,
            exec_segment: None,
            exec_block: None,
            drivers_enabled: false,
        }
    }

    pub fn update_settings(&mut self, settings: &Settings) {
        self.n_axis = settings.n_axis();
        self.idle_lock_forever = settings.stepper.idle_lock_ms == IDLE_LOCK_FOREVER;
    }

    pub fn drivers_enabled(&self) -> bool {
        self.drivers_enabled
    }

    /// One step timer tick
    pub fn on_tick<M, S, P>(
        &mut self,
        sys: &SystemContext,
        motors: &mut M,
        spindle: &mut S,
        probe: &mut P,
    ) -> Tick
    where
        M: StepOutput + ?Sized,
        S: Spindle + ?Sized,
        P: ProbeInput + ?Sized,
    {
        if !sys.try_enter_step_isr() {
            return Tick::Busy;
        }

        if sys.stepper_flush_pending() {
            self.service_flush(sys);
            self.go_idle(sys, motors);
            sys.exit_step_isr();
            return Tick::Idle;
        }

        if !self.drivers_enabled {
            motors.set_enable(true);
            self.drivers_enabled = true;
        }

        motors.set_direction(self.dir_outbits);
        motors.step(self.step_outbits, sys.ganged_mode());

        if self.exec_segment.is_none() {
            if !self.load_segment(spindle) {
                self.go_idle(sys, motors);
                if sys.state() != MachineState::Jog
                    && self.exec_block.is_some_and(|block| block.is_pwm_rate_adjusted)
                {
                    spindle.set_rpm(0.0);
                }
                sys.signal_cycle_stop();
                sys.exit_step_isr();
                return Tick::Idle;
            }
        }

        if sys.probe_state() == ProbeState::Active && (probe.is_triggered() ^ sys.probe_away()) {
            sys.set_probe_state(ProbeState::Off);
            sys.latch_probe_position();
            sys.exec.set(ExecFlag::MotionCancel);
        }

        let Some(block) = self.exec_block else {
            sys.exit_step_isr();
            return Tick::Idle;
        };

        self.step_outbits = AxisMask::NONE;
        for idx in 0..self.n_axis {
            self.counter[idx] += self.steps[idx];
            if self.counter[idx] > block.step_event_count {
                self.step_outbits.insert_index(idx);
                self.counter[idx] -= block.step_event_count;
                sys.count_step(idx, block.direction_bits.contains_index(idx));
            }
        }

        if sys.state() == MachineState::Homing {
            self.step_outbits = self.step_outbits & sys.homing_axis_lock();
        }

        self.step_count = self.step_count.saturating_sub(1);
        if self.step_count == 0 {
            self.exec_segment = None;
        }

        motors.unstep();
        sys.exit_step_isr();
        Tick::Continue {
            period: self.period,
        }
    }

    /// Pull the next segment and, on a block change, its Bresenham constants
    fn load_segment<S: Spindle + ?Sized>(&mut self, spindle: &mut S) -> bool {
        let Some(segment) = self.consumer.next_segment() else {
            return false;
        };

        if self.exec_block.map(|block| block.tag) != Some(segment.block_tag) {
            self.exec_block = self.consumer.block_for(segment.block_tag);
            let Some(block) = self.exec_block else {
                return false;
            };
            let start = block.step_event_count >> 1;
            self.counter = [start; MAX_N_AXIS];
        }
        let Some(block) = self.exec_block else {
            return false;
        };

        self.dir_outbits = block.direction_bits;
        for idx in 0..self.n_axis {
            self.steps[idx] = block.steps[idx] >> segment.amass_level;
        }
        self.step_count = segment.n_step;
        self.period = segment.period;
        spindle.set_rpm(segment.spindle_rpm);
        self.exec_segment = Some(segment);
        true
    }

    /// Drop every queued segment and block if a flush was requested.
    ///
    /// Must run on the interrupt side, or while the step timer is stopped.
    pub fn service_flush(&mut self, sys: &SystemContext) {
        if !sys.stepper_flush_pending() {
            return;
        }
        self.consumer.drain();
        self.exec_segment = None;
        self.exec_block = None;
        self.step_count = 0;
        self.step_outbits = AxisMask::NONE;
        sys.complete_stepper_flush();
    }

    /// Stop stepping and apply the driver idle policy
    pub fn go_idle<M: StepOutput + ?Sized>(&mut self, sys: &SystemContext, motors: &mut M) {
        let state = sys.state();
        let alarm_pending = sys.alarm().is_some();
        if state != MachineState::Homing
            && (!self.idle_lock_forever || alarm_pending || state == MachineState::Sleep)
        {
            if state == MachineState::Sleep || alarm_pending {
                motors.set_enable(false);
                self.drivers_enabled = false;
            } else {
                sys.set_stepper_idle(true);
            }
        }
        motors.unstep();
        self.step_outbits = AxisMask::NONE;
    }

    /// Disable the drivers once the idle lock time has passed
    pub fn release_drivers<M: StepOutput + ?Sized>(&mut self, sys: &SystemContext, motors: &mut M) {
        if sys.stepper_idle() && self.drivers_enabled {
            motors.set_enable(false);
            self.drivers_enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::{StepperQueues, MAX_AMASS_LEVEL};
    use crate::system::{Alarm, SquaringMode};
    use crate::traits::{NoProbe, NoSpindle};

    #[derive(Default)]
    struct MockMotors {
        pulses: [u32; MAX_N_AXIS],
        enabled: bool,
        direction: AxisMask,
        high: bool,
    }

    impl StepOutput for MockMotors {
        fn step(&mut self, mask: AxisMask, _mode: SquaringMode) {
            for idx in 0..MAX_N_AXIS {
                if mask.contains_index(idx) {
                    self.pulses[idx] += 1;
                }
            }
            self.high = !mask.is_empty();
        }

        fn unstep(&mut self) {
            self.high = false;
        }

        fn set_direction(&mut self, negative: AxisMask) -> bool {
            let changed = negative != self.direction;
            self.direction = negative;
            changed
        }

        fn set_enable(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
    }

    struct TriggeredProbe;

    impl ProbeInput for TriggeredProbe {
        fn is_triggered(&mut self) -> bool {
            true
        }
    }

    fn block(steps: [u32; 3], negative: AxisMask, tag: u8) -> StepperBlock {
        let mut scaled = [0; MAX_N_AXIS];
        for (dst, src) in scaled.iter_mut().zip(steps.iter()) {
            *dst = *src << MAX_AMASS_LEVEL;
        }
        StepperBlock {
            steps: scaled,
            step_event_count: steps.iter().copied().max().unwrap_or(0) << MAX_AMASS_LEVEL,
            direction_bits: negative,
            is_pwm_rate_adjusted: false,
            tag,
        }
    }

    fn segment(tag: u8, n_step: u32, amass_level: u8) -> Segment {
        Segment {
            block_tag: tag,
            n_step: n_step << amass_level,
            period: 100,
            amass_level,
            spindle_rpm: 0.0,
        }
    }

    fn run(interrupt: &mut StepInterrupt, sys: &SystemContext, motors: &mut MockMotors) -> u32 {
        let mut ticks = 0;
        while let Tick::Continue { .. } = interrupt.on_tick(sys, motors, &mut NoSpindle, &mut NoProbe) {
            ticks += 1;
            assert!(ticks < 10_000);
        }
        ticks
    }

    #[test]
    fn test_bresenham_counts_every_step() {
        let sys = SystemContext::new();
        sys.set_state(MachineState::Cycle);
        let settings = Settings::default();
        let mut queues = StepperQueues::new();
        let (mut producer, consumer) = queues.split();
        let mut interrupt = StepInterrupt::new(consumer, &settings);
        let mut motors = MockMotors::default();

        assert!(producer.push_block(block([10, 4, 7], AxisMask::from_bits(0b010), 1)));
        assert!(producer.push_segment(segment(1, 6, 0)));
        assert!(producer.push_segment(segment(1, 4, 2)));

        let ticks = run(&mut interrupt, &sys, &mut motors);
        assert_eq!(ticks, 6 + (4 << 2));
        assert_eq!(sys.machine_position()[..3], [10, -4, 7]);
        assert_eq!(motors.pulses[..3], [10, 4, 7]);
        assert!(sys.cycle_stop());
        assert!(!motors.high);
    }

    #[test]
    fn test_block_change_resets_counters() {
        let sys = SystemContext::new();
        sys.set_state(MachineState::Cycle);
        let settings = Settings::default();
        let mut queues = StepperQueues::new();
        let (mut producer, consumer) = queues.split();
        let mut interrupt = StepInterrupt::new(consumer, &settings);
        let mut motors = MockMotors::default();

        producer.push_block(block([3, 0, 0], AxisMask::NONE, 1));
        producer.push_block(block([0, 5, 0], AxisMask::NONE, 2));
        producer.push_segment(segment(1, 3, 1));
        producer.push_segment(segment(2, 5, 0));

        run(&mut interrupt, &sys, &mut motors);
        assert_eq!(sys.machine_position()[..3], [3, 5, 0]);
    }

    #[test]
    fn test_homing_lock_masks_pulses_only() {
        let sys = SystemContext::new();
        sys.set_state(MachineState::Homing);
        sys.set_homing_axis_lock(AxisMask::from_bits(0b001));
        let settings = Settings::default();
        let mut queues = StepperQueues::new();
        let (mut producer, consumer) = queues.split();
        let mut interrupt = StepInterrupt::new(consumer, &settings);
        let mut motors = MockMotors::default();

        producer.push_block(block([4, 4, 0], AxisMask::NONE, 1));
        producer.push_segment(segment(1, 4, 0));
        run(&mut interrupt, &sys, &mut motors);
        assert_eq!(motors.pulses[..2], [4, 0]);
        // Homing keeps the drivers energized
        assert!(motors.enabled);
    }

    #[test]
    fn test_probe_trigger_latches_position() {
        let sys = SystemContext::new();
        sys.set_state(MachineState::Cycle);
        sys.set_probe_state(ProbeState::Active);
        let settings = Settings::default();
        let mut queues = StepperQueues::new();
        let (mut producer, consumer) = queues.split();
        let mut interrupt = StepInterrupt::new(consumer, &settings);
        let mut motors = MockMotors::default();

        producer.push_block(block([0, 0, 8], AxisMask::from_bits(0b100), 1));
        producer.push_segment(segment(1, 8, 0));
        let tick = interrupt.on_tick(&sys, &mut motors, &mut NoSpindle, &mut TriggeredProbe);
        assert!(matches!(tick, Tick::Continue { period: 100 }));
        assert_eq!(sys.probe_state(), ProbeState::Off);
        assert!(sys.exec.contains(ExecFlag::MotionCancel));
        assert_eq!(sys.probe_position()[2], 0);
    }

    #[test]
    fn test_flush_drops_queued_work() {
        let sys = SystemContext::new();
        let settings = Settings::default();
        let mut queues = StepperQueues::new();
        let (mut producer, consumer) = queues.split();
        let mut interrupt = StepInterrupt::new(consumer, &settings);
        let mut motors = MockMotors::default();

        producer.push_block(block([5, 0, 0], AxisMask::NONE, 1));
        producer.push_segment(segment(1, 5, 0));
        sys.request_stepper_flush();
        let tick = interrupt.on_tick(&sys, &mut motors, &mut NoSpindle, &mut NoProbe);
        assert_eq!(tick, Tick::Idle);
        assert!(!sys.stepper_flush_pending());
        assert!(!sys.cycle_stop());
        assert_eq!(sys.machine_position()[0], 0);
    }

    #[test]
    fn test_idle_policy() {
        let sys = SystemContext::new();
        let mut settings = Settings::default();
        let mut queues = StepperQueues::new();
        let (_, consumer) = queues.split();
        let mut interrupt = StepInterrupt::new(consumer, &settings);
        let mut motors = MockMotors {
            enabled: true,
            ..MockMotors::default()
        };
        interrupt.drivers_enabled = true;

        sys.set_stepper_idle(false);
        interrupt.go_idle(&sys, &mut motors);
        assert!(sys.stepper_idle());
        assert!(motors.enabled);
        interrupt.release_drivers(&sys, &mut motors);
        assert!(!motors.enabled);

        settings.stepper.idle_lock_ms = IDLE_LOCK_FOREVER;
        interrupt.update_settings(&settings);
        motors.enabled = true;
        interrupt.drivers_enabled = true;
        sys.set_stepper_idle(false);
        interrupt.go_idle(&sys, &mut motors);
        assert!(!sys.stepper_idle());
        assert!(motors.enabled);

        sys.raise_alarm(Alarm::HardLimit);
        interrupt.go_idle(&sys, &mut motors);
        assert!(!motors.enabled);
    }
}
