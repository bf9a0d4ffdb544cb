//! Simple TOML parser for machine settings
//!
//! Handles only the subset machine.toml uses. build.rs already rejected
//! anything malformed in the embedded copy, so this parser stays small.
//!
//! Supported features:
//! - Key = value pairs (float, integer, boolean, string)
//! - Arrays of strings on one line: `cycles = ["Z", "XY"]`
//! - [section] and [axis.<letter>] headers
//! - Comments (# ...)

use kerf_core::config::Settings;
use kerf_core::motion::position::{AxisMask, MAX_N_AXIS};

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Unknown or malformed section header
    InvalidSection,
    /// Key not valid in its section
    UnknownKey,
    /// Value has the wrong type or is out of range
    InvalidValue,
    /// Line is neither a header nor `key = value`
    Syntax,
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Machine,
    Stepper,
    Axis(usize),
    Homing,
    Arc,
    Spindle,
}

/// Parse machine.toml text into settings, starting from the defaults
pub fn parse_settings(input: &str) -> Result<Settings, ParseError> {
    let mut settings = Settings::default();
    let mut section = Section::Root;

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = parse_section_header(&line[1..line.len() - 1])?;
            continue;
        }

        let (key, value) = parse_key_value(line).ok_or(ParseError::Syntax)?;
        apply_value(&mut settings, section, key, value)?;
    }

    Ok(settings)
}

fn parse_section_header(header: &str) -> Result<Section, ParseError> {
    let header = header.trim();
    if let Some(letter) = header.strip_prefix("axis.") {
        return axis_index(letter).map(Section::Axis);
    }
    match header {
        "machine" => Ok(Section::Machine),
        "stepper" => Ok(Section::Stepper),
        "homing" => Ok(Section::Homing),
        "arc" => Ok(Section::Arc),
        "spindle" => Ok(Section::Spindle),
        _ => Err(ParseError::InvalidSection),
    }
}

fn axis_index(letter: &str) -> Result<usize, ParseError> {
    let mut chars = letter.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return Err(ParseError::InvalidSection);
    };
    "XYZABC"
        .find(c.to_ascii_uppercase())
        .ok_or(ParseError::InvalidSection)
}

/// Parse "key = value" line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Remove inline comments outside strings
    let value = match value.find('#') {
        Some(hash_pos) if value[..hash_pos].matches('"').count() % 2 == 0 => {
            value[..hash_pos].trim()
        }
        _ => value,
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

fn parse_string(value: &str) -> Result<&str, ParseError> {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or(ParseError::InvalidValue)
}

fn parse_int<T: core::str::FromStr>(value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

/// Floats also accept integer literals
fn parse_float(value: &str) -> Result<f32, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

fn parse_bool(value: &str) -> Result<bool, ParseError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::InvalidValue),
    }
}

/// Axis letters in a string value: `"XY"` becomes X and Y
fn parse_axes(value: &str) -> Result<AxisMask, ParseError> {
    let mut mask = AxisMask::NONE;
    for c in parse_string(value)?.chars() {
        let idx = axis_index(c.encode_utf8(&mut [0; 4])).map_err(|_| ParseError::InvalidValue)?;
        mask.insert_index(idx);
    }
    Ok(mask)
}

/// `["Z", "XY"]` as homing cycles in order
fn parse_cycles(value: &str) -> Result<[AxisMask; MAX_N_AXIS], ParseError> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or(ParseError::InvalidValue)?;

    let mut cycles = [AxisMask::NONE; MAX_N_AXIS];
    let mut count = 0;
    for item in inner.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let slot = cycles.get_mut(count).ok_or(ParseError::InvalidValue)?;
        *slot = parse_axes(item)?;
        count += 1;
    }
    Ok(cycles)
}

fn set_axis_bit(mask: &mut AxisMask, axis: usize, on: bool) {
    let mut bits = mask.bits() & !(1 << axis);
    if on {
        bits |= 1 << axis;
    }
    *mask = AxisMask::from_bits(bits);
}

fn apply_value(
    settings: &mut Settings,
    section: Section,
    key: &str,
    value: &str,
) -> Result<(), ParseError> {
    match section {
        Section::Root => return Err(ParseError::UnknownKey),
        Section::Machine => match key {
            "n_axis" => {
                let n: u8 = parse_int(value)?;
                if n == 0 || n as usize > MAX_N_AXIS {
                    return Err(ParseError::InvalidValue);
                }
                settings.n_axis = n;
            }
            "soft_limits" => settings.soft_limits = parse_bool(value)?,
            "hard_limits" => settings.hard_limits = parse_bool(value)?,
            "report_inches" => settings.report_inches = parse_bool(value)?,
            "probe_invert" => settings.probe_invert = parse_bool(value)?,
            _ => return Err(ParseError::UnknownKey),
        },
        Section::Stepper => {
            let stepper = &mut settings.stepper;
            match key {
                "pulse_us" => stepper.pulse_us = parse_int(value)?,
                "direction_delay_us" => stepper.direction_delay_us = parse_int(value)?,
                "timer_hz" => stepper.timer_hz = parse_int(value)?,
                "idle_lock_ms" => stepper.idle_lock_ms = parse_int(value)?,
                "enable_invert" => stepper.enable_invert = parse_bool(value)?,
                _ => return Err(ParseError::UnknownKey),
            }
        }
        Section::Axis(idx) => match key {
            "steps_per_mm" => settings.axes[idx].steps_per_mm = parse_float(value)?,
            "max_rate" => settings.axes[idx].max_rate = parse_float(value)?,
            "acceleration" => settings.axes[idx].acceleration = parse_float(value)?,
            "max_travel" => settings.axes[idx].max_travel = parse_float(value)?,
            "home_mpos" => settings.axes[idx].home_mpos = parse_float(value)?,
            "step_invert" => set_axis_bit(&mut settings.stepper.step_invert, idx, parse_bool(value)?),
            "dir_invert" => set_axis_bit(&mut settings.stepper.dir_invert, idx, parse_bool(value)?),
            "limit_invert" => set_axis_bit(&mut settings.limit_invert, idx, parse_bool(value)?),
            _ => return Err(ParseError::UnknownKey),
        },
        Section::Homing => {
            let homing = &mut settings.homing;
            match key {
                "enabled" => homing.enabled = parse_bool(value)?,
                "cycles" => homing.cycles = parse_cycles(value)?,
                "squared_axes" => homing.squared_axes = parse_axes(value)?,
                "direction_invert" => homing.direction_invert = parse_axes(value)?,
                "locate_cycles" => homing.locate_cycles = parse_int(value)?,
                "seek_rate" => homing.seek_rate = parse_float(value)?,
                "feed_rate" => homing.feed_rate = parse_float(value)?,
                "debounce_ms" => homing.debounce_ms = parse_int(value)?,
                "pulloff" => homing.pulloff = parse_float(value)?,
                _ => return Err(ParseError::UnknownKey),
            }
        }
        Section::Arc => {
            let arc = &mut settings.arc;
            match key {
                "tolerance" => arc.tolerance = parse_float(value)?,
                "correction_interval" => arc.correction_interval = parse_int(value)?,
                "center_error_min" => arc.center_error_min = parse_float(value)?,
                "center_error_max" => arc.center_error_max = parse_float(value)?,
                "center_error_ratio" => arc.center_error_ratio = parse_float(value)?,
                _ => return Err(ParseError::UnknownKey),
            }
        }
        Section::Spindle => {
            let spindle = &mut settings.spindle;
            match key {
                "rpm_max" => spindle.rpm_max = parse_float(value)?,
                "rpm_min" => spindle.rpm_min = parse_float(value)?,
                "laser_mode" => spindle.laser_mode = parse_bool(value)?,
                _ => return Err(ParseError::UnknownKey),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_section_header() {
        assert_eq!(parse_section_header("machine"), Ok(Section::Machine));
        assert_eq!(parse_section_header("axis.z"), Ok(Section::Axis(2)));
        assert_eq!(parse_section_header("axis.C"), Ok(Section::Axis(5)));
        assert_eq!(parse_section_header("axis.q"), Err(ParseError::InvalidSection));
        assert_eq!(parse_section_header("axis.xy"), Err(ParseError::InvalidSection));
        assert_eq!(parse_section_header("display"), Err(ParseError::InvalidSection));
    }

    #[test]
    fn test_parse_cycles() {
        let cycles = parse_cycles(r#"["Z", "XY"]"#).unwrap();
        assert_eq!(cycles[0], AxisMask::from_bits(0b100));
        assert_eq!(cycles[1], AxisMask::from_bits(0b011));
        assert!(cycles[2].is_empty());
        assert_eq!(parse_cycles(r#"["Q"]"#), Err(ParseError::InvalidValue));
        assert_eq!(parse_cycles(r#""XY""#), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_inline_comment_outside_string() {
        assert_eq!(parse_key_value("pulloff = 1.5 # mm"), Some(("pulloff", "1.5")));
        assert_eq!(
            parse_key_value(r##"squared_axes = "#" "##),
            Some(("squared_axes", r##""#""##))
        );
        assert_eq!(parse_key_value("pulloff ="), None);
    }

    #[test]
    fn test_parse_machine_config() {
        let config_str = r#"
# comment
[machine]
n_axis = 3
hard_limits = true

[stepper]
pulse_us = 4
enable_invert = true

[axis.x]
steps_per_mm = 80
max_travel = 250.5
limit_invert = true

[axis.z]
dir_invert = true

[homing]
enabled = true
cycles = ["Z", "XY"]
direction_invert = "XY"
pulloff = 1.5

[spindle]
rpm_max = 12000.0
"#;

        let settings = parse_settings(config_str).unwrap();
        assert_eq!(settings.n_axis, 3);
        assert!(settings.hard_limits);
        assert_eq!(settings.stepper.pulse_us, 4);
        assert!(settings.stepper.enable_invert);
        assert_eq!(settings.axes[0].steps_per_mm, 80.0);
        assert_eq!(settings.axes[0].max_travel, 250.5);
        assert_eq!(settings.limit_invert, AxisMask::from_bits(0b001));
        assert_eq!(settings.stepper.dir_invert, AxisMask::from_bits(0b100));
        assert!(settings.homing.enabled);
        assert_eq!(settings.homing.direction_invert, AxisMask::from_bits(0b011));
        assert_eq!(settings.homing.pulloff, 1.5);
        assert_eq!(settings.spindle.rpm_max, 12000.0);
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_values() {
        assert_eq!(parse_settings("[machine]\nnaxis = 3"), Err(ParseError::UnknownKey));
        assert_eq!(parse_settings("[machine]\nn_axis = 7"), Err(ParseError::InvalidValue));
        assert_eq!(parse_settings("[stepper]\npulse_us = fast"), Err(ParseError::InvalidValue));
        assert_eq!(parse_settings("n_axis = 3"), Err(ParseError::UnknownKey));
        assert_eq!(parse_settings("[machine]\nn_axis"), Err(ParseError::Syntax));
    }

    #[test]
    fn test_embedded_config_is_valid() {
        let settings = parse_settings(include_str!("../../machine.toml")).unwrap();
        assert_eq!(settings.validate(), Ok(()));
    }
}
