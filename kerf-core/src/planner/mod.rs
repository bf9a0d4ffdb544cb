//! Planner contract
//!
//! The motion layer submits lines through [`Planner::buffer_line`]; the
//! segment preparer consumes the head block through the rest of the trait.
//! Speeds are in mm/min and accelerations in mm/min².

pub mod queue;

pub use queue::BlockQueue;

use crate::motion::position::{AxisMask, Position, StepPosition, MAX_N_AXIS};
use crate::traits::{CoolantState, SpindleState};

/// Minimum planned speed (mm/min)
pub const MINIMUM_FEED_RATE: f32 = 1.0;

/// Motion conditions attached to a planned line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlanCondition {
    /// G0: runs at the rapid rate under the rapid override
    pub rapid: bool,
    /// Homing or parking motion; stops at its end
    pub system_motion: bool,
    /// Feed override does not apply
    pub no_feed_override: bool,
    /// Feed rate is 1/minutes for the whole move (G93)
    pub inverse_time: bool,
}

/// Parameters of one line submitted to the planner
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlanLineData {
    /// Programmed feed rate (mm/min, or 1/min in inverse time)
    pub feed_rate: f32,
    pub spindle_speed: f32,
    pub condition: PlanCondition,
    pub spindle: SpindleState,
    pub coolant: CoolantState,
    pub is_jog: bool,
    pub line_number: Option<u32>,
}

impl Default for PlanLineData {
    fn default() -> Self {
        Self {
            feed_rate: 0.0,
            spindle_speed: 0.0,
            condition: PlanCondition::default(),
            spindle: SpindleState::Disable,
            coolant: CoolantState::OFF,
            is_jog: false,
            line_number: None,
        }
    }
}

impl PlanLineData {
    /// Line data for homing and other machine-generated motion
    pub fn system_motion(feed_rate: f32) -> Self {
        Self {
            feed_rate,
            condition: PlanCondition {
                system_motion: true,
                no_feed_override: true,
                ..PlanCondition::default()
            },
            ..Self::default()
        }
    }
}

/// A planned linear move
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlanBlock {
    /// Absolute step count per axis
    pub steps: [u32; MAX_N_AXIS],
    /// Largest per-axis step count
    pub step_event_count: u32,
    /// Axes moving toward negative
    pub direction_bits: AxisMask,
    pub condition: PlanCondition,
    /// Entry speed squared; rewritten by the segment preparer on holds
    pub entry_speed_sqr: f32,
    pub max_entry_speed_sqr: f32,
    /// mm/min²
    pub acceleration: f32,
    /// Distance left to execute; decremented by the segment preparer
    pub millimeters: f32,
    /// Fastest speed allowed along this direction
    pub rapid_rate: f32,
    /// Programmed speed before overrides
    pub programmed_rate: f32,
    pub spindle: SpindleState,
    pub spindle_speed: f32,
    pub coolant: CoolantState,
    pub is_jog: bool,
    pub line_number: Option<u32>,
}

/// Block queue consumed by the segment preparer
pub trait Planner {
    /// Plan a line to `target` (mm, motor space).
    ///
    /// Returns false if the move has no steps and was dropped.
    fn buffer_line(&mut self, target: &Position, data: &PlanLineData) -> bool;

    fn is_full(&self) -> bool;

    /// Block currently being executed, if any
    fn current_block(&self) -> Option<&PlanBlock>;

    fn current_block_mut(&mut self) -> Option<&mut PlanBlock>;

    /// Exit speed squared of the executing block (entry of the next one)
    fn exec_block_exit_speed_sqr(&self) -> f32;

    /// Nominal speed of `block` with overrides applied
    fn profile_nominal_speed(&self, block: &PlanBlock) -> f32;

    /// Drop the executing block once all its steps are prepared
    fn discard_current_block(&mut self);

    /// Drop every block. The planner position is left alone.
    fn reset(&mut self);

    /// Set the planner position to the machine position
    fn sync_position(&mut self, steps: &StepPosition);

    /// Replan from a stop after a feed hold
    fn cycle_reinitialize(&mut self);

    /// Feed and rapid overrides changed (percent)
    fn apply_overrides(&mut self, _feed: u8, _rapid: u8) {}
}

/// Scale `max_value` per axis by a unit vector and return the tightest limit
pub fn limit_value_by_axis_maximum(
    max_value: &[f32; MAX_N_AXIS],
    unit_vec: &[f32; MAX_N_AXIS],
    n_axis: usize,
) -> f32 {
    let mut limit = f32::MAX;
    for idx in 0..n_axis.min(MAX_N_AXIS) {
        if unit_vec[idx] != 0.0 {
            limit = limit.min(libm::fabsf(max_value[idx] / unit_vec[idx]));
        }
    }
    limit
}

/// Normalize `vector` in place and return its original length
pub fn convert_to_unit_vector(vector: &mut [f32; MAX_N_AXIS], n_axis: usize) -> f32 {
    let n = n_axis.min(MAX_N_AXIS);
    let magnitude = libm::sqrtf(vector[..n].iter().map(|v| v * v).sum());
    if magnitude > 0.0 {
        let inv = 1.0 / magnitude;
        for value in vector[..n].iter_mut() {
            *value *= inv;
        }
    }
    magnitude
}
