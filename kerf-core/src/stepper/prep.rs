//! Segment preparer
//!
//! Computes the velocity profile of the executing planner block and slices
//! it into segments of roughly [`DT_SEGMENT`] each. Steps per segment are
//! derived from the distance left in the block rather than summed, so float
//! round-off never gains or loses a step; the partial step left at the end
//! of each segment is carried into the next one as time.
//!
//! Units are steps, millimeters and minutes.

use super::{
    Segment, SegmentProducer, StepperBlock, DT_SEGMENT, MAX_AMASS_LEVEL, REQ_MM_INCREMENT_SCALAR,
};
use crate::config::Settings;
use crate::motion::position::MAX_N_AXIS;
use crate::planner::Planner;
use crate::system::{StepControl, SystemContext};
use crate::traits::SpindleState;

/// Velocity ramp the next segment starts in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ramp {
    Accel,
    Cruise,
    Decel,
    /// Entry speed above nominal after an override reduction
    DecelOverride,
}

/// Background-side producer of step segments
pub struct SegmentPreparer<'q> {
    producer: SegmentProducer<'q>,
    n_axis: usize,
    timer_hz: f32,
    amass_threshold: u32,

    /// The planner's current block has been loaded
    block_loaded: bool,
    block_tag: u8,
    is_pwm_rate_adjusted: bool,
    /// Reload only the velocity profile of the loaded block
    recalculate: bool,
    /// Next block must continue a deceleration override
    decel_override: bool,

    dt_remainder: f32,
    steps_remaining: f32,
    step_per_mm: f32,
    req_mm_increment: f32,

    ramp: Ramp,
    /// Profile end, measured from the end of the block (mm)
    mm_complete: f32,
    /// Speed at the end of the last prepared segment (mm/min)
    current_speed: f32,
    maximum_speed: f32,
    exit_speed: f32,
    /// Acceleration ramp end, measured from the end of the block (mm)
    accelerate_until: f32,
    /// Deceleration ramp start, measured from the end of the block (mm)
    decelerate_after: f32,

    inv_rate: f32,
    current_spindle_rpm: f32,
}

impl<'q> SegmentPreparer<'q> {
    pub fn new(producer: SegmentProducer<'q>, settings: &Settings) -> Self {
        Self {
            producer,
            n_axis: settings.n_axis(),
            timer_hz: settings.stepper.timer_hz as f32,
            amass_threshold: settings.stepper.amass_threshold(),
            block_loaded: false,
            block_tag: 0,
            is_pwm_rate_adjusted: false,
            recalculate: false,
            decel_override: false,
            dt_remainder: 0.0,
            steps_remaining: 0.0,
            step_per_mm: 0.0,
            req_mm_increment: 0.0,
            ramp: Ramp::Accel,
            mm_complete: 0.0,
            current_speed: 0.0,
            maximum_speed: 0.0,
            exit_speed: 0.0,
            accelerate_until: 0.0,
            decelerate_after: 0.0,
            inv_rate: 0.0,
            current_spindle_rpm: 0.0,
        }
    }

    /// Forget all preparation state. The queues are flushed by the consumer.
    pub fn reset(&mut self) {
        self.block_loaded = false;
        self.is_pwm_rate_adjusted = false;
        self.recalculate = false;
        self.decel_override = false;
        self.dt_remainder = 0.0;
        self.steps_remaining = 0.0;
        self.step_per_mm = 0.0;
        self.req_mm_increment = 0.0;
        self.ramp = Ramp::Accel;
        self.mm_complete = 0.0;
        self.current_speed = 0.0;
        self.maximum_speed = 0.0;
        self.exit_speed = 0.0;
        self.accelerate_until = 0.0;
        self.decelerate_after = 0.0;
        self.inv_rate = 0.0;
        self.current_spindle_rpm = 0.0;
    }

    /// Speed at the end of the prepared segments (mm/min)
    pub fn get_current_speed(&self) -> f32 {
        self.current_speed
    }

    /// The planner changed the executing block: rewrite its entry speed to
    /// the speed already prepared and recompute its profile on the next call.
    pub fn update_plan_block_parameters<P: Planner + ?Sized>(&mut self, planner: &mut P) {
        if self.block_loaded {
            self.recalculate = true;
            if let Some(block) = planner.current_block_mut() {
                block.entry_speed_sqr = self.current_speed * self.current_speed;
            }
            self.block_loaded = false;
        }
    }

    /// Fill the segment ring from the planner
    pub fn prepare<P: Planner + ?Sized>(
        &mut self,
        planner: &mut P,
        sys: &SystemContext,
        laser_mode: bool,
    ) {
        if sys.step_control.contains(StepControl::EndMotion) || sys.stepper_flush_pending() {
            return;
        }

        while self.producer.has_room() {
            if !self.block_loaded {
                if planner.current_block().is_none() {
                    return;
                }
                if !self.load_block(planner, sys, laser_mode) {
                    return;
                }
            }

            let (segment, mm_remaining, n_steps_remaining, step_dist_remaining, inv_rate) =
                match self.build_segment(planner, sys) {
                    Some(result) => result,
                    None => return,
                };

            if !self.producer.push_segment(segment) {
                return;
            }

            let Some(block) = planner.current_block_mut() else {
                return;
            };
            block.millimeters = mm_remaining;
            self.steps_remaining = n_steps_remaining;
            self.dt_remainder = (n_steps_remaining - step_dist_remaining) * inv_rate;

            if mm_remaining == self.mm_complete {
                if mm_remaining > 0.0 {
                    // Forced deceleration finished mid-block. Hold here until
                    // the protocol reinitializes the cycle.
                    sys.step_control.set(StepControl::EndMotion);
                    return;
                }
                if sys.step_control.contains(StepControl::ExecuteSysMotion) {
                    sys.step_control.set(StepControl::EndMotion);
                    return;
                }
                self.block_loaded = false;
                planner.discard_current_block();
            }
        }
    }

    /// Load the planner's current block or recompute its profile.
    ///
    /// Returns false if the block cache has no room yet.
    fn load_block<P: Planner + ?Sized>(
        &mut self,
        planner: &mut P,
        sys: &SystemContext,
        laser_mode: bool,
    ) -> bool {
        let executing_hold = sys.step_control.contains(StepControl::ExecuteHold);
        let system_motion = sys.step_control.contains(StepControl::ExecuteSysMotion);
        let exit_speed_sqr_planned = if system_motion {
            0.0
        } else {
            planner.exec_block_exit_speed_sqr()
        };
        let nominal_speed = match planner.current_block() {
            Some(block) => planner.profile_nominal_speed(block),
            None => return false,
        };
        let Some(block) = planner.current_block_mut() else {
            return false;
        };

        if self.recalculate {
            self.recalculate = false;
        } else {
            if !self.producer.has_block_room() {
                return false;
            }
            self.block_tag = self.block_tag.wrapping_add(1);
            let mut steps = [0u32; MAX_N_AXIS];
            for (dst, src) in steps.iter_mut().zip(block.steps.iter()).take(self.n_axis) {
                *dst = *src << MAX_AMASS_LEVEL;
            }

            self.steps_remaining = block.step_event_count as f32;
            self.step_per_mm = self.steps_remaining / block.millimeters;
            self.req_mm_increment = REQ_MM_INCREMENT_SCALAR / self.step_per_mm;
            self.dt_remainder = 0.0;

            if executing_hold || self.decel_override {
                // New block loaded mid-hold: continue the deceleration
                self.current_speed = self.exit_speed;
                block.entry_speed_sqr = self.exit_speed * self.exit_speed;
                self.decel_override = false;
            } else {
                self.current_speed = libm::sqrtf(block.entry_speed_sqr);
            }

            self.is_pwm_rate_adjusted = false;
            if laser_mode && block.spindle == SpindleState::Ccw {
                self.inv_rate = 1.0 / block.programmed_rate;
                self.is_pwm_rate_adjusted = true;
            }

            let cached = StepperBlock {
                steps,
                step_event_count: block.step_event_count << MAX_AMASS_LEVEL,
                direction_bits: block.direction_bits,
                is_pwm_rate_adjusted: self.is_pwm_rate_adjusted,
                tag: self.block_tag,
            };
            if !self.producer.push_block(cached) {
                return false;
            }
        }

        self.mm_complete = 0.0;
        let inv_2_accel = 0.5 / block.acceleration;

        if executing_hold {
            // Forced deceleration to zero speed
            self.ramp = Ramp::Decel;
            let decel_dist = block.millimeters - inv_2_accel * block.entry_speed_sqr;
            if decel_dist < 0.0 {
                // Hold does not end within this block
                self.exit_speed = libm::sqrtf(
                    block.entry_speed_sqr - 2.0 * block.acceleration * block.millimeters,
                );
            } else {
                self.mm_complete = decel_dist;
                self.exit_speed = 0.0;
            }
        } else {
            self.ramp = Ramp::Accel;
            self.accelerate_until = block.millimeters;

            let exit_speed_sqr = exit_speed_sqr_planned;
            self.exit_speed = libm::sqrtf(exit_speed_sqr);

            let nominal_speed_sqr = nominal_speed * nominal_speed;
            let intersect_distance = 0.5
                * (block.millimeters + inv_2_accel * (block.entry_speed_sqr - exit_speed_sqr));

            if block.entry_speed_sqr > nominal_speed_sqr {
                // Override reduced the speed below the entry speed
                self.accelerate_until = block.millimeters
                    - inv_2_accel * (block.entry_speed_sqr - nominal_speed_sqr);
                if self.accelerate_until <= 0.0 {
                    // Deceleration only; the next block continues it
                    self.ramp = Ramp::Decel;
                    self.exit_speed = libm::sqrtf(
                        block.entry_speed_sqr - 2.0 * block.acceleration * block.millimeters,
                    );
                    self.decel_override = true;
                } else {
                    // Too short to settle at nominal before the exit ramp
                    self.decelerate_after = (inv_2_accel * (nominal_speed_sqr - exit_speed_sqr))
                        .min(self.accelerate_until);
                    self.maximum_speed = nominal_speed;
                    self.ramp = Ramp::DecelOverride;
                }
            } else if intersect_distance > 0.0 {
                if intersect_distance < block.millimeters {
                    // Trapezoid or triangle
                    self.decelerate_after = inv_2_accel * (nominal_speed_sqr - exit_speed_sqr);
                    if self.decelerate_after < intersect_distance {
                        self.maximum_speed = nominal_speed;
                        if block.entry_speed_sqr == nominal_speed_sqr {
                            // Cruise-decel or cruise only
                            self.ramp = Ramp::Cruise;
                        } else {
                            self.accelerate_until -=
                                inv_2_accel * (nominal_speed_sqr - block.entry_speed_sqr);
                        }
                    } else {
                        // Triangle
                        self.accelerate_until = intersect_distance;
                        self.decelerate_after = intersect_distance;
                        self.maximum_speed = libm::sqrtf(
                            2.0 * block.acceleration * intersect_distance + exit_speed_sqr,
                        );
                    }
                } else {
                    // Deceleration only
                    self.ramp = Ramp::Decel;
                }
            } else {
                // Acceleration only
                self.accelerate_until = 0.0;
                self.maximum_speed = self.exit_speed;
            }
        }

        sys.step_control.set(StepControl::UpdateSpindleRpm);
        self.block_loaded = true;
        true
    }

    /// Advance the profile by one segment.
    ///
    /// Returns the segment plus the bookkeeping to commit once it is queued:
    /// mm remaining, ceil(steps remaining), exact steps remaining, inverse rate.
    fn build_segment<P: Planner + ?Sized>(
        &mut self,
        planner: &mut P,
        sys: &SystemContext,
    ) -> Option<(Segment, f32, f32, f32, f32)> {
        let block = *planner.current_block()?;

        let mut dt_max = DT_SEGMENT;
        let mut dt = 0.0f32;
        let mut time_var = dt_max;
        let mut mm_remaining = block.millimeters;
        let minimum_mm = (mm_remaining - self.req_mm_increment).max(0.0);

        loop {
            match self.ramp {
                Ramp::DecelOverride => {
                    let speed_var = block.acceleration * time_var;
                    let mm_var = time_var * (self.current_speed - 0.5 * speed_var);
                    mm_remaining -= mm_var;
                    if mm_remaining < self.accelerate_until || mm_var <= 0.0 {
                        mm_remaining = self.accelerate_until;
                        time_var = 2.0 * (block.millimeters - mm_remaining)
                            / (self.current_speed + self.maximum_speed);
                        self.ramp = Ramp::Cruise;
                        self.current_speed = self.maximum_speed;
                    } else {
                        self.current_speed -= speed_var;
                    }
                }
                Ramp::Accel => {
                    let speed_var = block.acceleration * time_var;
                    mm_remaining -= time_var * (self.current_speed + 0.5 * speed_var);
                    if mm_remaining < self.accelerate_until {
                        mm_remaining = self.accelerate_until;
                        time_var = 2.0 * (block.millimeters - mm_remaining)
                            / (self.current_speed + self.maximum_speed);
                        self.ramp = if mm_remaining == self.decelerate_after {
                            Ramp::Decel
                        } else {
                            Ramp::Cruise
                        };
                        self.current_speed = self.maximum_speed;
                    } else {
                        self.current_speed += speed_var;
                    }
                }
                Ramp::Cruise => {
                    let mm_var = mm_remaining - self.maximum_speed * time_var;
                    if mm_var < self.decelerate_after {
                        time_var = (mm_remaining - self.decelerate_after) / self.maximum_speed;
                        mm_remaining = self.decelerate_after;
                        self.ramp = Ramp::Decel;
                    } else {
                        mm_remaining = mm_var;
                    }
                }
                Ramp::Decel => {
                    let speed_var = block.acceleration * time_var;
                    let mut in_ramp = false;
                    if self.current_speed > speed_var {
                        let mm_var =
                            mm_remaining - time_var * (self.current_speed - 0.5 * speed_var);
                        if mm_var > self.mm_complete {
                            mm_remaining = mm_var;
                            self.current_speed -= speed_var;
                            in_ramp = true;
                        }
                    }
                    if !in_ramp {
                        // End of block or end of forced deceleration
                        let speed_sum = self.current_speed + self.exit_speed;
                        time_var = if speed_sum > 0.0 {
                            2.0 * (mm_remaining - self.mm_complete) / speed_sum
                        } else {
                            // Already at rest
                            0.0
                        };
                        mm_remaining = self.mm_complete;
                        self.current_speed = self.exit_speed;
                    }
                }
            }

            dt += time_var;
            if dt < dt_max {
                time_var = dt_max - dt;
            } else if mm_remaining > minimum_mm {
                // Too slow for a step this segment; stretch it
                dt_max += DT_SEGMENT;
                time_var = dt_max - dt;
            } else {
                break;
            }

            if mm_remaining <= self.mm_complete {
                break;
            }
        }

        if self.is_pwm_rate_adjusted || sys.step_control.contains(StepControl::UpdateSpindleRpm) {
            if block.spindle != SpindleState::Disable {
                let mut rpm = block.spindle_speed * 0.01 * sys.spindle_override() as f32;
                if self.is_pwm_rate_adjusted {
                    rpm *= self.current_speed * self.inv_rate;
                }
                self.current_spindle_rpm = rpm;
            } else {
                self.current_spindle_rpm = 0.0;
            }
            sys.step_control.clear(StepControl::UpdateSpindleRpm);
        }

        let step_dist_remaining = self.step_per_mm * mm_remaining;
        let n_steps_remaining = libm::ceilf(step_dist_remaining);
        let last_n_steps_remaining = libm::ceilf(self.steps_remaining);
        let mut n_step = (last_n_steps_remaining - n_steps_remaining) as u32;

        if n_step == 0 && sys.step_control.contains(StepControl::ExecuteHold) {
            // Less than a step left to stop; AMASS needs whole steps
            sys.step_control.set(StepControl::EndMotion);
            return None;
        }

        dt += self.dt_remainder;
        let inv_rate = dt / (last_n_steps_remaining - step_dist_remaining);

        let timer_ticks = libm::ceilf(self.timer_hz * 60.0 * inv_rate) as u32;
        let (period, level) = amass_scale(timer_ticks, self.amass_threshold);
        n_step <<= level;

        let segment = Segment {
            block_tag: self.block_tag,
            n_step,
            period,
            amass_level: level,
            spindle_rpm: self.current_spindle_rpm,
        };

        Some((
            segment,
            mm_remaining,
            n_steps_remaining,
            step_dist_remaining,
            inv_rate,
        ))
    }
}

/// Timer period and AMASS level for a base step interval
///
/// Returns `(period, level)` where `period` is already shifted for the level.
pub fn amass_scale(timer_ticks: u32, threshold: u32) -> (u16, u8) {
    let mut ticks = timer_ticks;
    let mut level = 0u32;
    while level < MAX_AMASS_LEVEL && ticks >= threshold {
        ticks >>= 1;
        level += 1;
    }
    (ticks.min(u16::MAX as u32) as u16, level as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{BlockQueue, PlanLineData};
    use crate::stepper::StepperQueues;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.axes[0].steps_per_mm = 100.0;
        settings.axes[0].max_rate = 3000.0;
        settings.axes[0].acceleration = 100.0;
        settings
    }

    #[test]
    fn test_amass_scale_levels() {
        // 1 MHz timer: threshold 125 ticks
        assert_eq!(amass_scale(100, 125), (100, 0));
        assert_eq!(amass_scale(200, 125), (100, 1));
        assert_eq!(amass_scale(600, 125), (75, 3));
        assert_eq!(amass_scale(2_000_000, 125), (u16::MAX, 3));
    }

    #[test]
    fn test_stops_when_queue_full() {
        let settings = settings();
        let sys = SystemContext::new();
        let mut queues = StepperQueues::new();
        let (producer, mut consumer) = queues.split();
        let mut preparer = SegmentPreparer::new(producer, &settings);
        let mut planner: BlockQueue<4> = BlockQueue::new(&settings);
        let data = PlanLineData {
            feed_rate: 1000.0,
            ..PlanLineData::default()
        };
        assert!(planner.buffer_line(&[50.0, 0.0, 0.0, 0.0, 0.0, 0.0], &data));

        preparer.prepare(&mut planner, &sys, false);
        assert_eq!(consumer.len(), super::super::SEGMENT_BUFFER_SIZE - 1);
        assert!(consumer.next_segment().is_some());
        assert!(consumer.block_for(1).is_some());
    }

    #[test]
    fn test_end_motion_blocks_preparation() {
        let settings = settings();
        let sys = SystemContext::new();
        sys.step_control.set(StepControl::EndMotion);
        let mut queues = StepperQueues::new();
        let (producer, consumer) = queues.split();
        let mut preparer = SegmentPreparer::new(producer, &settings);
        let mut planner: BlockQueue<4> = BlockQueue::new(&settings);
        planner.buffer_line(
            &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            &PlanLineData {
                feed_rate: 100.0,
                ..PlanLineData::default()
            },
        );
        preparer.prepare(&mut planner, &sys, false);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_segment_steps_sum_to_block() {
        let settings = settings();
        let sys = SystemContext::new();
        let mut queues = StepperQueues::new();
        let (producer, mut consumer) = queues.split();
        let mut preparer = SegmentPreparer::new(producer, &settings);
        let mut planner: BlockQueue<4> = BlockQueue::new(&settings);
        let data = PlanLineData {
            feed_rate: 600.0,
            ..PlanLineData::default()
        };
        assert!(planner.buffer_line(&[3.37, 0.0, 0.0, 0.0, 0.0, 0.0], &data));

        let mut total = 0u32;
        for _ in 0..10_000 {
            preparer.prepare(&mut planner, &sys, false);
            while let Some(segment) = consumer.next_segment() {
                assert!(segment.n_step > 0);
                total += segment.n_step >> segment.amass_level;
            }
            if planner.current_block().is_none() {
                break;
            }
        }
        assert!(planner.current_block().is_none());
        assert_eq!(total, 337);
    }

    /// Prepare and drain segments until `done` holds, returning the steps
    fn run_until(
        preparer: &mut SegmentPreparer<'_>,
        consumer: &mut crate::stepper::SegmentConsumer<'_>,
        planner: &mut BlockQueue<4>,
        sys: &SystemContext,
        mut done: impl FnMut(&SegmentPreparer<'_>, &BlockQueue<4>) -> bool,
    ) -> u32 {
        let mut total = 0u32;
        for _ in 0..10_000 {
            preparer.prepare(planner, sys, false);
            while let Some(segment) = consumer.next_segment() {
                assert!(segment.period > 0);
                total += segment.n_step >> segment.amass_level;
            }
            if done(&*preparer, &*planner) {
                return total;
            }
        }
        panic!("preparation did not finish");
    }

    #[test]
    fn test_resume_after_hold_inside_block() {
        let settings = settings();
        let sys = SystemContext::new();
        let mut queues = StepperQueues::new();
        let (producer, mut consumer) = queues.split();
        let mut preparer = SegmentPreparer::new(producer, &settings);
        let mut planner: BlockQueue<4> = BlockQueue::new(&settings);
        let data = PlanLineData {
            feed_rate: 3000.0,
            ..PlanLineData::default()
        };
        assert!(planner.buffer_line(&[50.0, 0.0, 0.0, 0.0, 0.0, 0.0], &data));

        let mut total = run_until(&mut preparer, &mut consumer, &mut planner, &sys, |p, _| {
            p.ramp == Ramp::Cruise
        });

        sys.step_control.set(StepControl::ExecuteHold);
        preparer.update_plan_block_parameters(&mut planner);
        total += run_until(&mut preparer, &mut consumer, &mut planner, &sys, |_, _| {
            sys.step_control.contains(StepControl::EndMotion)
        });
        let left = planner.current_block().map_or(0.0, |block| block.millimeters);
        assert!(left > 1.0);

        // Hold complete, then cycle start
        preparer.update_plan_block_parameters(&mut planner);
        sys.step_control.clear_all();
        let entry = planner.current_block().map_or(f32::MAX, |block| block.entry_speed_sqr);
        assert!(entry < 60.0 * 60.0);
        total += run_until(&mut preparer, &mut consumer, &mut planner, &sys, |_, planner| {
            planner.current_block().is_none()
        });
        assert_eq!(total, 5000);
    }

    #[test]
    fn test_override_reduction_decelerates_inside_block() {
        let settings = settings();
        let sys = SystemContext::new();
        let mut queues = StepperQueues::new();
        let (producer, mut consumer) = queues.split();
        let mut preparer = SegmentPreparer::new(producer, &settings);
        let mut planner: BlockQueue<4> = BlockQueue::new(&settings);
        let data = PlanLineData {
            feed_rate: 3000.0,
            ..PlanLineData::default()
        };
        assert!(planner.buffer_line(&[50.0, 0.0, 0.0, 0.0, 0.0, 0.0], &data));

        let mut total = run_until(&mut preparer, &mut consumer, &mut planner, &sys, |p, _| {
            p.ramp == Ramp::Cruise
        });
        let cruise = preparer.get_current_speed();
        assert!((cruise - 3000.0).abs() < 1.0);

        planner.apply_overrides(50, 100);
        preparer.update_plan_block_parameters(&mut planner);
        assert_eq!(
            planner.current_block().map(|block| block.entry_speed_sqr),
            Some(cruise * cruise)
        );

        total += run_until(&mut preparer, &mut consumer, &mut planner, &sys, |_, _| true);
        assert_eq!(preparer.ramp, Ramp::DecelOverride);
        assert!(preparer.get_current_speed() < cruise);
        assert!(preparer.get_current_speed() > 1500.0);

        total += run_until(&mut preparer, &mut consumer, &mut planner, &sys, |_, planner| {
            planner.current_block().is_none()
        });
        assert_eq!(total, 5000);
    }
}
