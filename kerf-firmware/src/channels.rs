//! Inter-task communication
//!
//! The machine state lives in one static [`SystemContext`]; everything else
//! moving between the protocol loop and the interrupt-executor tasks goes
//! through the embassy-sync primitives here.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicBool, AtomicU8};

use kerf_core::system::SystemContext;

/// Line-stream bytes the host may have in flight (character-counting budget)
pub const INBOX_SIZE: usize = 256;

/// Outbound text waiting for the UART
const OUTBOX_SIZE: usize = 512;

/// Machine state shared by the protocol loop and the step task
pub static SYS: SystemContext = SystemContext::new();

/// Non-realtime bytes from the host, in arrival order
pub static INBOX: Pipe<CriticalSectionRawMutex, INBOX_SIZE> = Pipe::new();

/// Responses and reports for the host
pub static OUTBOX: Pipe<CriticalSectionRawMutex, OUTBOX_SIZE> = Pipe::new();

/// Wakes the step task: timer started, or a queue flush is waiting
pub static STEP_WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Step timer running; cleared by the protocol loop or when segments run out
pub static STEP_TIMER_RUNNING: AtomicBool = AtomicBool::new(false);

/// Limit switches last seen closed, as axis mask bits
pub static LIMIT_STATE: AtomicU8 = AtomicU8::new(0);
