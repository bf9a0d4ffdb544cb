//! Host responses and reports
//!
//! Everything written to the host goes through [`send_line`] or
//! [`send_fmt`], which queue text on the UART outbox. Only the protocol loop
//! writes; it spins while the outbox is full, which the transmit task on
//! the interrupt executor drains.

use core::fmt::Write;

use defmt::*;
use heapless::String;

use kerf_core::config::Settings;
use kerf_core::gcode::GcodeError;
use kerf_core::motion::position::steps_to_mpos;
use kerf_core::system::{Alarm, SystemContext};
use kerf_core::traits::{ClientId, DoorSwitch, Feedback, ProbeInput, Reporter};
use portable_atomic::Ordering;

use crate::board::{DOOR, PROBE};
use crate::channels::{LIMIT_STATE, OUTBOX};

/// Longest single report line
const REPORT_SIZE: usize = 160;

const MM_PER_INCH: f32 = 25.4;

/// Queue raw bytes for the host
pub fn send(bytes: &[u8]) {
    let mut rest = bytes;
    while !rest.is_empty() {
        match OUTBOX.try_write(rest) {
            Ok(n) => rest = &rest[n..],
            Err(_) => core::hint::spin_loop(),
        }
    }
}

pub fn send_line(text: &str) {
    send(text.as_bytes());
    send(b"\r\n");
}

/// Format and send one line; text past [`REPORT_SIZE`] is cut
pub fn send_fmt(args: core::fmt::Arguments<'_>) {
    let mut line: String<REPORT_SIZE> = String::new();
    if line.write_fmt(args).is_err() {
        warn!("Report truncated");
    }
    send_line(&line);
}

/// Response to a completed line
pub fn send_status(result: Result<(), GcodeError>) {
    match result {
        Ok(()) => send_line("ok"),
        Err(e) => send_fmt(format_args!("error:{}", e.code())),
    }
}

fn feedback_text(message: Feedback) -> &'static str {
    match message {
        Feedback::CriticalEvent => "Reset to continue",
        Feedback::SafetyDoorAjar => "Check Door",
        Feedback::ProgramEnd => "Pgm End",
        Feedback::SleepMode => "Sleeping",
        Feedback::AlarmLock => "'$H'|'$X' to unlock",
        Feedback::AlarmUnlock => "Caution: Unlocked",
        Feedback::Enabled => "Enabled",
        Feedback::Disabled => "Disabled",
    }
}

/// Reporter writing Grbl-style text to the host UART
pub struct SerialReporter {
    settings: &'static Settings,
}

impl SerialReporter {
    pub fn new(settings: &'static Settings) -> Self {
        Self { settings }
    }

    /// `<State|MPos:x,y,z|Ov:f,r,s|Pn:XYZPD>`
    fn format_status(&self, sys: &SystemContext) -> String<REPORT_SIZE> {
        let mut report: String<REPORT_SIZE> = String::new();
        let n_axis = self.settings.n_axis();
        let mpos = steps_to_mpos(&sys.machine_position(), self.settings);

        let _ = write!(report, "<{}|MPos:", sys.state().name());
        for (idx, value) in mpos.iter().take(n_axis).enumerate() {
            let sep = if idx == 0 { "" } else { "," };
            let _ = if self.settings.report_inches {
                write!(report, "{}{:.4}", sep, value / MM_PER_INCH)
            } else {
                write!(report, "{}{:.3}", sep, value)
            };
        }
        let _ = write!(
            report,
            "|Ov:{},{},{}",
            sys.feed_override(),
            sys.rapid_override(),
            sys.spindle_override()
        );

        let limits = LIMIT_STATE.load(Ordering::Acquire);
        let probe = (&PROBE).is_triggered();
        let door = (&DOOR).is_ajar();
        if limits != 0 || probe || door {
            let _ = report.push_str("|Pn:");
            for (idx, letter) in "XYZABC".chars().take(n_axis).enumerate() {
                if limits & (1 << idx) != 0 {
                    let _ = report.push(letter);
                }
            }
            if probe {
                let _ = report.push('P');
            }
            if door {
                let _ = report.push('D');
            }
        }
        let _ = report.push('>');
        report
    }
}

impl Reporter for SerialReporter {
    fn alarm(&mut self, alarm: Alarm) {
        warn!("Alarm {:?}", alarm);
        send_fmt(format_args!("ALARM:{}", alarm.code()));
    }

    fn feedback(&mut self, message: Feedback) {
        send_fmt(format_args!("[MSG:{}]", feedback_text(message)));
    }

    fn error(&mut self, _client: ClientId, error: GcodeError) {
        send_fmt(format_args!("error:{}", error.code()));
    }

    fn message(&mut self, _client: ClientId, text: &str) {
        send_line(text);
    }

    fn status(&mut self, sys: &SystemContext) {
        let report = self.format_status(sys);
        send_line(&report);
    }
}
