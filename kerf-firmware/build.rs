//! Build script for kerf-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates machine.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const AXIS_NAMES: [&str; 6] = ["x", "y", "z", "a", "b", "c"];

/// Keys accepted in each section; anything else is a typo
const MACHINE_KEYS: &[&str] = &[
    "n_axis",
    "soft_limits",
    "hard_limits",
    "report_inches",
    "probe_invert",
];
const STEPPER_KEYS: &[&str] = &[
    "pulse_us",
    "direction_delay_us",
    "timer_hz",
    "idle_lock_ms",
    "enable_invert",
];
const AXIS_KEYS: &[&str] = &[
    "steps_per_mm",
    "max_rate",
    "acceleration",
    "max_travel",
    "home_mpos",
    "step_invert",
    "dir_invert",
    "limit_invert",
];
const HOMING_KEYS: &[&str] = &[
    "enabled",
    "cycles",
    "squared_axes",
    "direction_invert",
    "locate_cycles",
    "seek_rate",
    "feed_rate",
    "debounce_ms",
    "pulloff",
];
const ARC_KEYS: &[&str] = &[
    "tolerance",
    "correction_interval",
    "center_error_min",
    "center_error_max",
    "center_error_ratio",
];
const SPINDLE_KEYS: &[&str] = &["rpm_max", "rpm_min", "laser_mode"];

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate machine.toml configuration at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=machine.toml");

    let config_path = Path::new("machine.toml");
    if !config_path.exists() {
        fail(
            "machine.toml not found",
            &["The firmware embeds machine.toml from the kerf-firmware directory".to_string()],
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => fail("Failed to read machine.toml", &[e.to_string()]),
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => fail(
            "Invalid TOML syntax in machine.toml",
            &e.to_string().lines().map(str::to_string).collect::<Vec<_>>(),
        ),
    };

    let mut errors = Vec::new();
    validate_sections(&config, &mut errors);
    validate_machine(&config, &mut errors);
    validate_stepper(&config, &mut errors);
    validate_axes(&config, &mut errors);
    validate_homing(&config, &mut errors);
    validate_spindle(&config, &mut errors);

    if !errors.is_empty() {
        fail("Invalid machine configuration", &errors);
    }

    println!("cargo:warning=machine.toml validated successfully");
}

/// Abort the build with a boxed error listing
fn fail(title: &str, lines: &[String]) -> ! {
    let body = lines
        .iter()
        .map(|line| {
            let truncated = if line.len() > 62 {
                format!("{}...", &line[..59])
            } else {
                line.clone()
            };
            format!("║  • {:<62} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n");
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title, body
    );
}

fn table<'a>(config: &'a toml::Value, name: &str) -> Option<&'a toml::value::Table> {
    config.get(name).and_then(|v| v.as_table())
}

fn check_keys(section: &str, table: &toml::value::Table, allowed: &[&str], errors: &mut Vec<String>) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.push(format!("[{}] unknown key '{}'", section, key));
        }
    }
}

fn number(table: &toml::value::Table, key: &str) -> Option<f64> {
    match table.get(key) {
        Some(toml::Value::Float(f)) => Some(*f),
        Some(toml::Value::Integer(i)) => Some(*i as f64),
        _ => None,
    }
}

fn check_positive(section: &str, table: &toml::value::Table, key: &str, errors: &mut Vec<String>) {
    if let Some(value) = table.get(key) {
        match number(table, key) {
            Some(n) if n > 0.0 => {}
            Some(_) => errors.push(format!("[{}] {} must be positive", section, key)),
            None => errors.push(format!("[{}] {} must be a number, got {}", section, key, value)),
        }
    }
}

fn check_bool(section: &str, table: &toml::value::Table, key: &str, errors: &mut Vec<String>) {
    if let Some(value) = table.get(key) {
        if !value.is_bool() {
            errors.push(format!("[{}] {} must be true or false", section, key));
        }
    }
}

fn check_axis_letters(section: &str, key: &str, letters: &str, errors: &mut Vec<String>) {
    for c in letters.chars() {
        if !"XYZABC".contains(c.to_ascii_uppercase()) {
            errors.push(format!("[{}] {} has unknown axis '{}'", section, key, c));
        }
    }
}

/// Only known top-level sections
fn validate_sections(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(root) = config.as_table() else {
        return;
    };
    for (name, value) in root {
        if !["machine", "stepper", "axis", "homing", "arc", "spindle"].contains(&name.as_str()) {
            errors.push(format!("unknown section [{}]", name));
        } else if !value.is_table() {
            errors.push(format!("[{}] must be a table", name));
        }
    }
    if let Some(arc) = table(config, "arc") {
        check_keys("arc", arc, ARC_KEYS, errors);
        check_positive("arc", arc, "tolerance", errors);
        check_positive("arc", arc, "correction_interval", errors);
    }
}

fn validate_machine(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(machine) = table(config, "machine") else {
        errors.push("Missing [machine] section".to_string());
        return;
    };
    check_keys("machine", machine, MACHINE_KEYS, errors);
    match machine.get("n_axis") {
        Some(toml::Value::Integer(n)) if (1..=6).contains(n) => {}
        Some(_) => errors.push("[machine] n_axis must be 1-6".to_string()),
        None => errors.push("[machine] missing 'n_axis'".to_string()),
    }
    for key in ["soft_limits", "hard_limits", "report_inches", "probe_invert"] {
        check_bool("machine", machine, key, errors);
    }
}

fn validate_stepper(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(stepper) = table(config, "stepper") else {
        return;
    };
    check_keys("stepper", stepper, STEPPER_KEYS, errors);
    if let Some(toml::Value::Integer(us)) = stepper.get("pulse_us") {
        if *us < 3 {
            errors.push("[stepper] pulse_us must be at least 3".to_string());
        }
    }
    if let Some(toml::Value::Integer(hz)) = stepper.get("timer_hz") {
        if *hz < 8000 {
            errors.push("[stepper] timer_hz must be at least 8000".to_string());
        }
    }
    if let Some(toml::Value::Integer(ms)) = stepper.get("idle_lock_ms") {
        if !(0..=255).contains(ms) {
            errors.push("[stepper] idle_lock_ms must be 0-255".to_string());
        }
    }
    check_bool("stepper", stepper, "enable_invert", errors);
}

fn validate_axes(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(axes) = table(config, "axis") else {
        return;
    };
    for (name, axis) in axes {
        let section = format!("axis.{}", name);
        if !AXIS_NAMES.contains(&name.as_str()) {
            errors.push(format!("[{}] is not an axis (x, y, z, a, b, c)", section));
            continue;
        }
        let Some(axis) = axis.as_table() else {
            errors.push(format!("[{}] must be a table", section));
            continue;
        };
        check_keys(&section, axis, AXIS_KEYS, errors);
        for key in ["steps_per_mm", "max_rate", "acceleration"] {
            check_positive(&section, axis, key, errors);
        }
        if let Some(travel) = number(axis, "max_travel") {
            if travel < 0.0 {
                errors.push(format!("[{}] max_travel cannot be negative", section));
            }
        }
        for key in ["step_invert", "dir_invert", "limit_invert"] {
            check_bool(&section, axis, key, errors);
        }
    }
}

fn validate_homing(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(homing) = table(config, "homing") else {
        return;
    };
    check_keys("homing", homing, HOMING_KEYS, errors);
    check_bool("homing", homing, "enabled", errors);
    for key in ["seek_rate", "feed_rate"] {
        check_positive("homing", homing, key, errors);
    }

    match homing.get("cycles") {
        Some(toml::Value::Array(cycles)) => {
            if cycles.len() > AXIS_NAMES.len() {
                errors.push("[homing] at most 6 cycles".to_string());
            }
            for cycle in cycles {
                match cycle.as_str() {
                    Some(letters) => check_axis_letters("homing", "cycles", letters, errors),
                    None => errors.push("[homing] cycles must be strings like \"XY\"".to_string()),
                }
            }
        }
        Some(_) => errors.push("[homing] cycles must be an array".to_string()),
        None => {}
    }
    for key in ["squared_axes", "direction_invert"] {
        match homing.get(key) {
            Some(toml::Value::String(letters)) => check_axis_letters("homing", key, letters, errors),
            Some(_) => errors.push(format!("[homing] {} must be a string of axis letters", key)),
            None => {}
        }
    }
}

fn validate_spindle(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(spindle) = table(config, "spindle") else {
        return;
    };
    check_keys("spindle", spindle, SPINDLE_KEYS, errors);
    check_positive("spindle", spindle, "rpm_max", errors);
    check_bool("spindle", spindle, "laser_mode", errors);
    if let (Some(max), Some(min)) = (number(spindle, "rpm_max"), number(spindle, "rpm_min")) {
        if min >= max {
            errors.push("[spindle] rpm_min must be below rpm_max".to_string());
        }
    }
}
