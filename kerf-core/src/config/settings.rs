//! Machine settings
//!
//! Everything the motion core reads at runtime: per-axis kinematics, step
//! timing, homing, arc interpolation and limit behaviour. Settings are
//! stored in flash as postcard binary data.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::motion::position::{AxisMask, MAX_N_AXIS};

/// Current settings layout version
pub const SETTINGS_VERSION: u8 = 1;

/// Maximum serialized settings size
pub const MAX_SETTINGS_SIZE: usize = 512;

/// Idle lock value that keeps the drivers energized forever
pub const IDLE_LOCK_FOREVER: u8 = 255;

/// Per-axis settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisSettings {
    /// Steps per millimeter
    pub steps_per_mm: f32,
    /// Maximum rate (mm/min)
    pub max_rate: f32,
    /// Acceleration (mm/s²)
    pub acceleration: f32,
    /// Maximum travel (mm, positive). Zero excludes the axis from soft limits.
    pub max_travel: f32,
    /// Machine position assigned at the homing switch (mm)
    pub home_mpos: f32,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            steps_per_mm: 100.0,
            max_rate: 1000.0,
            acceleration: 200.0,
            max_travel: 300.0,
            home_mpos: 0.0,
        }
    }
}

impl AxisSettings {
    /// Acceleration in mm/min², the unit the planner works in
    pub fn acceleration_mm_per_min2(&self) -> f32 {
        self.acceleration * 60.0 * 60.0
    }
}

/// Step pulse generation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperSettings {
    /// Step pulse width (µs)
    pub pulse_us: u32,
    /// Delay between a direction change and the next step pulse (µs)
    pub direction_delay_us: u32,
    /// Frequency of the step timer (ticks per second)
    pub timer_hz: u32,
    /// Time the drivers stay enabled after motion (ms), 255 = always
    pub idle_lock_ms: u8,
    /// Step pins that are active-low
    pub step_invert: AxisMask,
    /// Direction pins that are inverted
    pub dir_invert: AxisMask,
    /// Enable pin is active-low
    pub enable_invert: bool,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            pulse_us: 3,
            direction_delay_us: 0,
            timer_hz: 1_000_000,
            idle_lock_ms: 250,
            step_invert: AxisMask::NONE,
            dir_invert: AxisMask::NONE,
            enable_invert: false,
        }
    }
}

impl StepperSettings {
    /// Step rate threshold above which AMASS stops smoothing, in timer ticks
    pub fn amass_threshold(&self) -> u32 {
        self.timer_hz / 8000
    }
}

/// Homing cycle settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HomingSettings {
    /// Homing allowed
    pub enabled: bool,
    /// Axis groups homed together, in order. Empty masks are skipped.
    pub cycles: [AxisMask; MAX_N_AXIS],
    /// Axes driven by two motors that are squared during homing
    pub squared_axes: AxisMask,
    /// Axes that home toward the negative end
    pub direction_invert: AxisMask,
    /// Slow locate passes after the initial seek
    pub locate_cycles: u8,
    /// Fast seek rate (mm/min)
    pub seek_rate: f32,
    /// Slow locate rate (mm/min)
    pub feed_rate: f32,
    /// Switch debounce delay (ms)
    pub debounce_ms: u32,
    /// Distance to back off the switches (mm)
    pub pulloff: f32,
}

impl Default for HomingSettings {
    fn default() -> Self {
        let mut cycles = [AxisMask::NONE; MAX_N_AXIS];
        cycles[0] = AxisMask::from_bits(0b100);
        cycles[1] = AxisMask::from_bits(0b011);
        Self {
            enabled: false,
            cycles,
            squared_axes: AxisMask::NONE,
            direction_invert: AxisMask::NONE,
            locate_cycles: 1,
            seek_rate: 2000.0,
            feed_rate: 200.0,
            debounce_ms: 250,
            pulloff: 1.0,
        }
    }
}

/// Arc interpolation settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArcSettings {
    /// Maximum chord-to-arc deviation of one arc segment (mm)
    pub tolerance: f32,
    /// Segments between exact trigonometric corrections
    pub correction_interval: u8,
    /// Start/end radius mismatch always accepted (mm)
    pub center_error_min: f32,
    /// Start/end radius mismatch never accepted (mm)
    pub center_error_max: f32,
    /// Start/end radius mismatch accepted as a fraction of the radius
    pub center_error_ratio: f32,
    /// Angular travel treated as zero when start and end coincide (rad)
    pub angular_epsilon: f32,
}

impl Default for ArcSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.002,
            correction_interval: 12,
            center_error_min: 0.005,
            center_error_max: 0.5,
            center_error_ratio: 0.001,
            angular_epsilon: 5e-7,
        }
    }
}

/// Spindle settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpindleSettings {
    /// Spindle speed at full PWM (rpm)
    pub rpm_max: f32,
    /// Spindle speed at minimum PWM (rpm)
    pub rpm_min: f32,
    /// Laser mode: spindle power follows the feed rate, no sync on S changes
    pub laser_mode: bool,
}

impl Default for SpindleSettings {
    fn default() -> Self {
        Self {
            rpm_max: 1000.0,
            rpm_min: 0.0,
            laser_mode: false,
        }
    }
}

/// Complete machine settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    /// Layout version for migration
    pub version: u8,
    /// Number of axes in use
    pub n_axis: u8,
    /// Per-axis settings
    pub axes: [AxisSettings; MAX_N_AXIS],
    pub stepper: StepperSettings,
    pub homing: HomingSettings,
    pub arc: ArcSettings,
    pub spindle: SpindleSettings,
    /// Reject motion outside the homed travel volume
    pub soft_limits: bool,
    /// Trip an alarm when a limit switch closes during motion
    pub hard_limits: bool,
    /// Probe input is active-low
    pub probe_invert: bool,
    /// Limit inputs that are active-low
    pub limit_invert: AxisMask,
    /// Report positions in inches
    pub report_inches: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            n_axis: 3,
            axes: [AxisSettings::default(); MAX_N_AXIS],
            stepper: StepperSettings::default(),
            homing: HomingSettings::default(),
            arc: ArcSettings::default(),
            spindle: SpindleSettings::default(),
            soft_limits: false,
            hard_limits: false,
            probe_invert: false,
            limit_invert: AxisMask::NONE,
            report_inches: false,
        }
    }
}

/// Settings validation and storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// Axis count outside 1..=6
    AxisCount,
    /// Steps/mm, rate or acceleration not strictly positive
    AxisValue,
    /// Step pulse shorter than the driver minimum
    StepPulseMin,
    /// Step timer too slow for AMASS
    TimerFrequency,
    /// Arc tolerance or correction interval invalid
    ArcValue,
    /// Homing enabled with no cycles or zero rates
    HomingValue,
    /// Serialization buffer too small or data corrupt
    Encoding,
    /// Stored layout version does not match
    VersionMismatch,
}

impl Settings {
    /// Minimum step pulse width (µs)
    pub const MIN_PULSE_US: u32 = 3;

    /// Number of axes in use, as an index bound
    pub fn n_axis(&self) -> usize {
        (self.n_axis as usize).min(MAX_N_AXIS)
    }

    /// Mask of the axes in use
    pub fn axis_mask(&self) -> AxisMask {
        AxisMask::first(self.n_axis())
    }

    /// Minimum machine position reachable by an axis
    pub fn min_position(&self, axis: usize) -> f32 {
        let axis_settings = &self.axes[axis];
        if self.homing.direction_invert.contains_index(axis) {
            axis_settings.home_mpos
        } else {
            axis_settings.home_mpos - axis_settings.max_travel
        }
    }

    /// Maximum machine position reachable by an axis
    pub fn max_position(&self, axis: usize) -> f32 {
        let axis_settings = &self.axes[axis];
        if self.homing.direction_invert.contains_index(axis) {
            axis_settings.home_mpos + axis_settings.max_travel
        } else {
            axis_settings.home_mpos
        }
    }

    /// Check all values are usable by the motion core
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.n_axis == 0 || self.n_axis as usize > MAX_N_AXIS {
            return Err(SettingsError::AxisCount);
        }
        for axis in &self.axes[..self.n_axis()] {
            if !(axis.steps_per_mm > 0.0 && axis.max_rate > 0.0 && axis.acceleration > 0.0) {
                return Err(SettingsError::AxisValue);
            }
            if axis.max_travel < 0.0 {
                return Err(SettingsError::AxisValue);
            }
        }
        if self.stepper.pulse_us < Self::MIN_PULSE_US {
            return Err(SettingsError::StepPulseMin);
        }
        if self.stepper.amass_threshold() == 0 {
            return Err(SettingsError::TimerFrequency);
        }
        if !(self.arc.tolerance > 0.0) || self.arc.correction_interval == 0 {
            return Err(SettingsError::ArcValue);
        }
        if self.homing.enabled {
            let any_cycle = self.homing.cycles.iter().any(|c| !c.is_empty());
            if !any_cycle || !(self.homing.seek_rate > 0.0 && self.homing.feed_rate > 0.0) {
                return Err(SettingsError::HomingValue);
            }
        }
        Ok(())
    }

    /// Serialize into `buf`, returning the used prefix
    #[cfg(feature = "serde")]
    pub fn to_bytes<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], SettingsError> {
        postcard::to_slice(self, buf).map_err(|_| SettingsError::Encoding)
    }

    /// Deserialize and validate stored settings
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SettingsError> {
        let settings: Settings =
            postcard::from_bytes(bytes).map_err(|_| SettingsError::Encoding)?;
        if settings.version != SETTINGS_VERSION {
            return Err(SettingsError::VersionMismatch);
        }
        settings.validate()?;
        Ok(settings)
    }
}
