//! Fixed-point number reader
//!
//! Reads the value of a G-code word without going through a general float
//! parser: digits accumulate into an integer mantissa and the decimal point
//! only moves an exponent. Digits past [`MAX_INT_DIGITS`] are dropped.

/// Significant digits kept in the mantissa
pub const MAX_INT_DIGITS: u8 = 8;

/// Read a signed decimal number starting at `*pos`.
///
/// On success `*pos` points at the first byte after the number. Returns
/// `None` if no digit was found.
pub fn read_number(line: &[u8], pos: &mut usize) -> Option<f32> {
    let mut idx = *pos;
    let mut negative = false;
    match line.get(idx) {
        Some(b'-') => {
            negative = true;
            idx += 1;
        }
        Some(b'+') => idx += 1,
        _ => {}
    }

    let mut intval: u32 = 0;
    let mut exp: i8 = 0;
    let mut ndigit: u8 = 0;
    let mut decimal = false;

    while let Some(&c) = line.get(idx) {
        if c.is_ascii_digit() {
            ndigit = ndigit.saturating_add(1);
            if ndigit <= MAX_INT_DIGITS {
                if decimal {
                    exp -= 1;
                }
                intval = intval * 10 + u32::from(c - b'0');
            } else if !decimal {
                exp = exp.saturating_add(1);
            }
        } else if c == b'.' && !decimal {
            decimal = true;
        } else {
            break;
        }
        idx += 1;
    }

    if ndigit == 0 {
        return None;
    }

    let mut value = intval as f32;
    if value != 0.0 {
        while exp <= -2 {
            value *= 0.01;
            exp += 2;
        }
        if exp < 0 {
            value *= 0.1;
        } else {
            while exp > 0 {
                value *= 10.0;
                exp -= 1;
            }
        }
    }

    *pos = idx;
    Some(if negative { -value } else { value })
}
