//! Line assembly
//!
//! Bytes from a host connection accumulate in a [`LineBuffer`] until a line
//! ending arrives. The finished line is collapsed before it reaches the
//! parser: whitespace removed, comments cut out and handed to a callback,
//! letters uppercased.

use heapless::{String, Vec};

use super::GcodeError;

/// Longest accepted line, including any comment text
pub const LINE_BUFFER_SIZE: usize = 256;

/// Result of feeding one byte to a [`LineBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineStatus {
    /// More bytes needed
    Pending,
    /// A line ending arrived; collect it with [`LineBuffer::take_line`]
    Complete,
}

/// Raw line accumulator for one host connection
pub struct LineBuffer {
    raw: Vec<u8, LINE_BUFFER_SIZE>,
    overflow: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            raw: Vec::new(),
            overflow: false,
        }
    }

    /// Feed one byte. Backspace erases the previous byte.
    pub fn push(&mut self, byte: u8) -> LineStatus {
        match byte {
            b'\r' | b'\n' => LineStatus::Complete,
            0x08 => {
                self.raw.pop();
                LineStatus::Pending
            }
            _ => {
                if self.raw.push(byte).is_err() {
                    self.overflow = true;
                }
                LineStatus::Pending
            }
        }
    }

    /// Collapse the finished line and clear the buffer.
    ///
    /// Comment text is passed to `on_comment` without its delimiters. An
    /// overflowed line is discarded and reported as
    /// [`GcodeError::LineLengthExceeded`].
    pub fn take_line<F: FnMut(&str)>(
        &mut self,
        on_comment: F,
    ) -> Result<String<LINE_BUFFER_SIZE>, GcodeError> {
        let overflow = core::mem::take(&mut self.overflow);
        let result = if overflow {
            Err(GcodeError::LineLengthExceeded)
        } else {
            Ok(collapse(&self.raw, on_comment))
        };
        self.raw.clear();
        result
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.overflow = false;
    }
}

/// Strip whitespace and comments from `raw` and uppercase the rest.
///
/// `(` starts a comment that runs to the next `)` or the end of the line; a
/// stray `)` is dropped. `;` ends the line and its text is a comment too.
/// `%` is ignored.
pub fn collapse<F: FnMut(&str)>(raw: &[u8], mut on_comment: F) -> String<LINE_BUFFER_SIZE> {
    let mut out: String<LINE_BUFFER_SIZE> = String::new();
    let mut comment: Option<usize> = None;

    for (idx, &byte) in raw.iter().enumerate() {
        if let Some(start) = comment {
            if byte == b')' {
                emit_comment(&raw[start..idx], &mut on_comment);
                comment = None;
            }
            continue;
        }
        match byte {
            b'(' => comment = Some(idx + 1),
            b')' | b'%' => {}
            b';' => {
                emit_comment(&raw[idx + 1..], &mut on_comment);
                return out;
            }
            b if b.is_ascii_whitespace() => {}
            b if b.is_ascii() && !b.is_ascii_control() => {
                // Cannot overflow: the output is never longer than the input
                let _ = out.push(b.to_ascii_uppercase() as char);
            }
            _ => {}
        }
    }
    if let Some(start) = comment {
        emit_comment(&raw[start..], &mut on_comment);
    }
    out
}

fn emit_comment<F: FnMut(&str)>(text: &[u8], on_comment: &mut F) {
    if let Ok(text) = core::str::from_utf8(text) {
        on_comment(text.trim());
    }
}

/// Message text of a `(MSG,...)` comment
pub fn operator_message(comment: &str) -> Option<&str> {
    let head = comment.get(..4)?;
    if head.eq_ignore_ascii_case("MSG,") {
        Some(comment[4..].trim())
    } else {
        None
    }
}
