//! Exact-stop block queue
//!
//! Every block starts and ends at zero speed, so no look-ahead is needed.
//! This keeps the pipeline runnable without a junction-deviation optimizer
//! while honoring the full [`Planner`] contract.

use heapless::Deque;

use super::{
    convert_to_unit_vector, limit_value_by_axis_maximum, PlanBlock, PlanLineData, Planner,
    MINIMUM_FEED_RATE,
};
use crate::config::Settings;
use crate::motion::position::{AxisMask, Position, StepPosition, MAX_N_AXIS};
use crate::system::{feed_override, rapid_override};

/// Fixed-capacity planner queue
pub struct BlockQueue<const N: usize> {
    blocks: Deque<PlanBlock, N>,
    /// Position of the last planned target, in steps
    position: StepPosition,
    n_axis: usize,
    steps_per_mm: [f32; MAX_N_AXIS],
    max_rate: [f32; MAX_N_AXIS],
    /// mm/min²
    acceleration: [f32; MAX_N_AXIS],
    feed_override: u8,
    rapid_override: u8,
}

impl<const N: usize> BlockQueue<N> {
    pub fn new(settings: &Settings) -> Self {
        let mut queue = Self {
            blocks: Deque::new(),
            position: [0; MAX_N_AXIS],
            n_axis: 0,
            steps_per_mm: [0.0; MAX_N_AXIS],
            max_rate: [0.0; MAX_N_AXIS],
            acceleration: [0.0; MAX_N_AXIS],
            feed_override: feed_override::DEFAULT,
            rapid_override: rapid_override::DEFAULT,
        };
        queue.update_settings(settings);
        queue
    }

    /// Reload per-axis limits after a settings change
    pub fn update_settings(&mut self, settings: &Settings) {
        self.n_axis = settings.n_axis();
        for (idx, axis) in settings.axes.iter().enumerate() {
            self.steps_per_mm[idx] = axis.steps_per_mm;
            self.max_rate[idx] = axis.max_rate;
            self.acceleration[idx] = axis.acceleration_mm_per_min2();
        }
    }

    /// Planner position in steps
    pub fn get_position(&self) -> StepPosition {
        self.position
    }

    /// Number of queued blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl<const N: usize> Planner for BlockQueue<N> {
    fn buffer_line(&mut self, target: &Position, data: &PlanLineData) -> bool {
        if self.blocks.is_full() {
            return false;
        }

        let mut target_steps = [0i32; MAX_N_AXIS];
        let mut steps = [0u32; MAX_N_AXIS];
        let mut unit_vec = [0.0f32; MAX_N_AXIS];
        let mut direction_bits = AxisMask::NONE;
        let mut step_event_count = 0;

        for idx in 0..self.n_axis {
            target_steps[idx] = libm::roundf(target[idx] * self.steps_per_mm[idx]) as i32;
            let delta = target_steps[idx] - self.position[idx];
            steps[idx] = delta.unsigned_abs();
            step_event_count = step_event_count.max(steps[idx]);
            unit_vec[idx] = delta as f32 / self.steps_per_mm[idx];
            if unit_vec[idx] < 0.0 {
                direction_bits.insert_index(idx);
            }
        }

        if step_event_count == 0 {
            return false;
        }

        let millimeters = convert_to_unit_vector(&mut unit_vec, self.n_axis);
        let acceleration = limit_value_by_axis_maximum(&self.acceleration, &unit_vec, self.n_axis);
        let rapid_rate = limit_value_by_axis_maximum(&self.max_rate, &unit_vec, self.n_axis);

        let programmed_rate = if data.condition.rapid {
            rapid_rate
        } else if data.condition.inverse_time {
            data.feed_rate * millimeters
        } else {
            data.feed_rate
        };

        let block = PlanBlock {
            steps,
            step_event_count,
            direction_bits,
            condition: data.condition,
            entry_speed_sqr: 0.0,
            max_entry_speed_sqr: 0.0,
            acceleration,
            millimeters,
            rapid_rate,
            programmed_rate,
            spindle: data.spindle,
            spindle_speed: data.spindle_speed,
            coolant: data.coolant,
            is_jog: data.is_jog,
            line_number: data.line_number,
        };

        if self.blocks.push_back(block).is_err() {
            return false;
        }
        self.position = target_steps;
        true
    }

    fn is_full(&self) -> bool {
        self.blocks.is_full()
    }

    fn current_block(&self) -> Option<&PlanBlock> {
        self.blocks.front()
    }

    fn current_block_mut(&mut self) -> Option<&mut PlanBlock> {
        self.blocks.front_mut()
    }

    fn exec_block_exit_speed_sqr(&self) -> f32 {
        self.blocks
            .iter()
            .nth(1)
            .map(|next| next.entry_speed_sqr)
            .unwrap_or(0.0)
    }

    fn profile_nominal_speed(&self, block: &PlanBlock) -> f32 {
        let mut nominal = block.programmed_rate;
        if block.condition.rapid {
            nominal *= 0.01 * self.rapid_override as f32;
        } else {
            if !block.condition.no_feed_override {
                nominal *= 0.01 * self.feed_override as f32;
            }
            if nominal > block.rapid_rate {
                nominal = block.rapid_rate;
            }
        }
        nominal.max(MINIMUM_FEED_RATE)
    }

    fn discard_current_block(&mut self) {
        self.blocks.pop_front();
    }

    fn reset(&mut self) {
        self.blocks.clear();
    }

    fn sync_position(&mut self, steps: &StepPosition) {
        self.position = *steps;
    }

    fn cycle_reinitialize(&mut self) {
        // Blocks after the first always enter at rest; the first one's entry
        // speed was rewritten by the preparer when the hold ended.
    }

    fn apply_overrides(&mut self, feed: u8, rapid: u8) {
        self.feed_override = feed;
        self.rapid_override = rapid;
    }
}
