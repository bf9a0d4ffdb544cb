//! Step generation
//!
//! The [`SegmentPreparer`] slices planner blocks into short constant-speed
//! segments; the [`StepInterrupt`] executes them with a Bresenham line
//! tracer. The two sides share nothing but a pair of single-producer,
//! single-consumer queues and the atomics in
//! [`SystemContext`](crate::system::SystemContext).
//!
//! AMASS (adaptive multi-axis step smoothing) raises the interrupt rate and
//! the Bresenham resolution together at low step rates, so non-dominant axes
//! step between dominant-axis steps instead of aliasing onto them.

pub mod interrupt;
pub mod prep;

pub use interrupt::{StepInterrupt, Tick};
pub use prep::SegmentPreparer;

use heapless::spsc::{Consumer, Producer, Queue};

use crate::motion::position::{AxisMask, MAX_N_AXIS};

/// Segment ring capacity (one slot is always free)
pub const SEGMENT_BUFFER_SIZE: usize = 6;

/// Block cache capacity. Every queued segment may reference a distinct
/// block, plus the block being prepared.
pub const BLOCK_CACHE_SIZE: usize = 8;

/// Highest AMASS level; block step counts are pre-shifted by this much
pub const MAX_AMASS_LEVEL: u32 = 3;

/// Segments prepared per second of motion
pub const ACCELERATION_TICKS_PER_SECOND: f32 = 100.0;

/// Nominal segment duration (minutes)
pub const DT_SEGMENT: f32 = 1.0 / (ACCELERATION_TICKS_PER_SECOND * 60.0);

/// Distance, in steps, a segment must cover at minimum
pub const REQ_MM_INCREMENT_SCALAR: f32 = 1.25;

/// Bresenham constants of one planner block, scaled for AMASS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepperBlock {
    /// Per-axis step counts << MAX_AMASS_LEVEL
    pub steps: [u32; MAX_N_AXIS],
    /// Step event count << MAX_AMASS_LEVEL
    pub step_event_count: u32,
    pub direction_bits: AxisMask,
    /// Spindle output scales with speed (laser M4)
    pub is_pwm_rate_adjusted: bool,
    /// Matches [`Segment::block_tag`] of the segments that use this block
    pub tag: u8,
}

/// A short constant-speed slice of a block
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Segment {
    /// Tag of the [`StepperBlock`] this segment executes
    pub block_tag: u8,
    /// Step events to run, already scaled by the AMASS level
    pub n_step: u32,
    /// Step timer period in timer ticks
    pub period: u16,
    pub amass_level: u8,
    pub spindle_rpm: f32,
}

/// Backing storage for the two segment queues
pub struct StepperQueues {
    segments: Queue<Segment, SEGMENT_BUFFER_SIZE>,
    blocks: Queue<StepperBlock, BLOCK_CACHE_SIZE>,
}

impl StepperQueues {
    pub const fn new() -> Self {
        Self {
            segments: Queue::new(),
            blocks: Queue::new(),
        }
    }

    /// Split into the preparer-side and interrupt-side handles
    pub fn split(&mut self) -> (SegmentProducer<'_>, SegmentConsumer<'_>) {
        let (segments_tx, segments_rx) = self.segments.split();
        let (blocks_tx, blocks_rx) = self.blocks.split();
        (
            SegmentProducer {
                segments: segments_tx,
                blocks: blocks_tx,
            },
            SegmentConsumer {
                segments: segments_rx,
                blocks: blocks_rx,
            },
        )
    }
}

impl Default for StepperQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Background-side handle: enqueues blocks and segments
pub struct SegmentProducer<'q> {
    segments: Producer<'q, Segment, SEGMENT_BUFFER_SIZE>,
    blocks: Producer<'q, StepperBlock, BLOCK_CACHE_SIZE>,
}

impl SegmentProducer<'_> {
    /// Room for another segment
    pub fn has_room(&self) -> bool {
        self.segments.ready()
    }

    /// Room for another cached block
    pub fn has_block_room(&self) -> bool {
        self.blocks.ready()
    }

    pub(crate) fn push_block(&mut self, block: StepperBlock) -> bool {
        self.blocks.enqueue(block).is_ok()
    }

    pub(crate) fn push_segment(&mut self, segment: Segment) -> bool {
        self.segments.enqueue(segment).is_ok()
    }
}

/// Interrupt-side handle: dequeues blocks and segments
pub struct SegmentConsumer<'q> {
    segments: Consumer<'q, Segment, SEGMENT_BUFFER_SIZE>,
    blocks: Consumer<'q, StepperBlock, BLOCK_CACHE_SIZE>,
}

impl SegmentConsumer<'_> {
    pub(crate) fn next_segment(&mut self) -> Option<Segment> {
        self.segments.dequeue()
    }

    /// Pop cached blocks until the one with `tag` is found
    pub(crate) fn block_for(&mut self, tag: u8) -> Option<StepperBlock> {
        while let Some(block) = self.blocks.dequeue() {
            if block.tag == tag {
                return Some(block);
            }
        }
        None
    }

    /// Number of segments waiting
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.len() == 0
    }

    pub(crate) fn drain(&mut self) {
        while self.segments.dequeue().is_some() {}
        while self.blocks.dequeue().is_some() {}
    }
}
