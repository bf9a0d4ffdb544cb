//! Limit switch monitoring
//!
//! Polls the limit inputs, publishes their state for homing and status
//! reports, and trips the hard limit alarm when a switch closes while hard
//! limits are armed.

use defmt::*;
use embassy_time::{Duration, Ticker};
use portable_atomic::Ordering;

use kerf_core::motion::position::AxisMask;
use kerf_core::traits::LimitSwitches;

use crate::board::BoardLimits;
use crate::channels::{LIMIT_STATE, SYS};

/// Limit input poll interval
pub const LIMIT_POLL_MS: u64 = 1;

/// Limit state as last published by [`limit_task`]
pub struct PolledLimits;

impl LimitSwitches for PolledLimits {
    fn triggered(&mut self) -> AxisMask {
        AxisMask::from_bits(LIMIT_STATE.load(Ordering::Acquire))
    }
}

#[embassy_executor::task]
pub async fn limit_task(mut limits: BoardLimits) {
    info!("Limit task started");

    let mut ticker = Ticker::every(Duration::from_millis(LIMIT_POLL_MS));
    let mut last = AxisMask::NONE;

    loop {
        ticker.next().await;

        let triggered = limits.triggered();
        LIMIT_STATE.store(triggered.bits(), Ordering::Release);
        if triggered != last {
            debug!("Limits: {=u8:#05b}", triggered.bits());
            last = triggered;
        }

        if !triggered.is_empty() && SYS.hard_limits_armed() {
            SYS.trip_hard_limit();
        }
    }
}
