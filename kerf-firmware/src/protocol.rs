//! Protocol loop
//!
//! Runs in thread mode and never returns. It assembles lines from the
//! inbox, executes them, and answers each with `ok` or `error:N`. Motion
//! commands block inside the motion layer; the realtime executor below keeps
//! the door watched and queue flushes serviced while they do.

use defmt::*;
use embassy_futures::block_on;
use embassy_time::{block_for, Duration};
use portable_atomic::Ordering;

use kerf_core::gcode::line::operator_message;
use kerf_core::gcode::{LineBuffer, LineStatus, Parser};
use kerf_core::motion::MotionControl;
use kerf_core::planner::Planner;
use kerf_core::system::SystemContext;
use kerf_core::traits::{ClientId, DoorSwitch, RealtimeExecutor};

use crate::board::DOOR;
use crate::channels::{INBOX, INBOX_SIZE, STEP_TIMER_RUNNING, STEP_WAKE, SYS};
use crate::config::ConfigPersistence;
use crate::report::{send_fmt, send_line, send_status};

/// Greeting sent after power-up and every reset
pub const BANNER: &str = concat!("Kerf ", env!("CARGO_PKG_VERSION"), " ['$I' for build info]");

/// Realtime executor for the protocol loop
#[derive(Default)]
pub struct SerialExecutor {
    door_was_ajar: bool,
}

impl RealtimeExecutor for SerialExecutor {
    fn service_pending_commands(&mut self, sys: &SystemContext) {
        // Realtime bytes were already applied by the receive task
        let ajar = (&DOOR).is_ajar();
        if ajar && !self.door_was_ajar {
            info!("Safety door opened");
            sys.request_safety_door();
        }
        self.door_was_ajar = ajar;

        if sys.stepper_flush_pending() && !STEP_TIMER_RUNNING.load(Ordering::Acquire) {
            STEP_WAKE.signal(());
        }
    }

    fn wait_ms(&mut self, ms: u32) {
        block_for(Duration::from_millis(ms.into()));
    }
}

/// Power-up sequence: settle the motion layer and greet the host
pub fn start<P: Planner>(mc: &mut MotionControl<'_, P>, parser: &mut Parser) {
    mc.reinitialize();
    parser.reset(mc);
    send_line("");
    send_line(BANNER);
}

pub fn run<P: Planner>(
    mc: &mut MotionControl<'_, P>,
    parser: &mut Parser,
    persistence: &mut ConfigPersistence<'_>,
) -> ! {
    let mut line = LineBuffer::new();
    let mut chunk = [0u8; INBOX_SIZE];

    loop {
        if SYS.is_aborted() {
            info!("Reset");
            line.clear();
            // Bytes queued before the reset belong to the aborted job
            while INBOX.try_read(&mut chunk).is_ok() {}
            start(mc, parser);
        }

        let n = INBOX.try_read(&mut chunk).unwrap_or(0);
        for &byte in &chunk[..n] {
            if line.push(byte) == LineStatus::Pending {
                continue;
            }
            execute_line(&mut line, mc, parser);
            if parser.coords_mut().take_dirty() {
                if let Err(e) = block_on(persistence.store_coordinates(parser.coords())) {
                    warn!("Failed to store coordinates: {:?}", e);
                }
            }
            if SYS.is_aborted() {
                break;
            }
        }

        if n == 0 {
            mc.auto_cycle_start();
        }
        mc.execute_realtime();
    }
}

fn execute_line<P: Planner>(
    line: &mut LineBuffer,
    mc: &mut MotionControl<'_, P>,
    parser: &mut Parser,
) {
    let result = line
        .take_line(|comment| {
            if let Some(text) = operator_message(comment) {
                send_fmt(format_args!("[MSG:{}]", text));
            }
        })
        .and_then(|text| {
            trace!("Line: {=str}", text.as_str());
            parser.execute_line(&text, ClientId::SERIAL, mc)
        });

    if let Err(e) = result {
        debug!("Line rejected: {:?}", e);
    }
    send_status(result);
}
