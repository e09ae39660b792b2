//! Replay Configuration - operator-tunable detection, controller and playback values
//!
//! Every field carries a serde default matching the calibrated Volve 12.25-in
//! tuning, so an empty or partial file behaves exactly like no file at all.
//! Durations are given in seconds and converted to sample counts against the
//! dataset's median sample spacing when the batch parameters are built.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::controller::Nominals;
use crate::detection::IndicatorParams;
use crate::types::{ControllerParams, DetectionParams, DetectionWeights};

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "TVM_CONFIG";
/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "replay_config.toml";

/// Floor on the sustain window when derived from a duration.
const MIN_SUSTAIN_SAMPLES: usize = 3;
/// Sustain window used when the sample spacing is unknown.
const FALLBACK_SUSTAIN_SAMPLES: usize = 5;
/// Holdoff used when the sample spacing is unknown.
const FALLBACK_HOLDOFF_SAMPLES: usize = 5;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n{}", format_errors(.0))]
    Validation(Vec<String>),
}

fn format_errors(errors: &[String]) -> String {
    errors.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n")
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of one replay run.
///
/// Load with `ReplayConfig::load()` which searches:
/// 1. `$TVM_CONFIG`
/// 2. `./replay_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub well: WellInfo,

    /// Rolling indicator windows
    #[serde(default)]
    pub signals: SignalsConfig,

    /// Severity weights and event segmentation
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Auto-driller tuning
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Playback cadence
    #[serde(default)]
    pub playback: PlaybackConfig,
}

impl ReplayConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), well = %config.well.name, "Loaded replay config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(well = %config.well.name, "Loaded replay config from ./{}", CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", CONFIG_FILE_NAME);
                }
            }
        }

        info!("No {} found, using built-in defaults", CONFIG_FILE_NAME);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are warned about, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every section, collecting all problems before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Detection
        let d = &self.detection;
        if let Err(e) = d.weights.to_weights().normalized() {
            errors.push(format!("detection.weights: {e}"));
        }
        if !(0.0..=1.0).contains(&d.threshold) {
            errors.push(format!(
                "detection.threshold ({}) must be within [0, 1]",
                d.threshold
            ));
        }
        if d.min_duration_s <= 0.0 {
            errors.push("detection.min_duration_s must be > 0".to_string());
        }
        if d.min_sustain_samples == Some(0) {
            errors.push("detection.min_sustain_samples must be >= 1".to_string());
        }

        // Signals
        let s = &self.signals;
        if s.window_s <= 0.0 {
            errors.push("signals.window_s must be > 0".to_string());
        }
        if s.min_rpm <= 0.0 {
            errors.push("signals.min_rpm must be > 0 (used as divisor floor)".to_string());
        }
        if s.torque_spike_sigma <= 0.0 {
            errors.push("signals.torque_spike_sigma must be > 0".to_string());
        }

        // Controller
        let c = &self.controller;
        if c.recovery_threshold > c.engage_threshold {
            errors.push(format!(
                "controller.recovery_threshold ({:.2}) must be <= engage_threshold ({:.2})",
                c.recovery_threshold, c.engage_threshold
            ));
        }
        for (name, value) in [
            ("kp_actuator_a", c.kp_actuator_a),
            ("kp_actuator_b", c.kp_actuator_b),
            ("actuator_b_max_delta", c.actuator_b_max_delta),
            ("holdoff_s", c.holdoff_s),
        ] {
            if value < 0.0 {
                errors.push(format!("controller.{name} must be >= 0, got {value}"));
            }
        }
        if c.actuator_a_floor_fraction <= 0.0 || c.actuator_a_floor_fraction > 1.0 {
            errors.push(format!(
                "controller.actuator_a_floor_fraction ({}) must be within (0, 1]",
                c.actuator_a_floor_fraction
            ));
        }
        for (name, value) in [("nominal_a", c.nominal_a), ("nominal_b", c.nominal_b)] {
            if let Some(v) = value {
                if v <= 0.0 {
                    errors.push(format!("controller.{name} must be > 0, got {v}"));
                }
            }
        }

        // Playback
        let p = &self.playback;
        if p.tick_interval_ms == 0 {
            errors.push("playback.tick_interval_ms must be > 0".to_string());
        }
        if p.slow_interval_ms == 0 {
            errors.push("playback.slow_interval_ms must be > 0".to_string());
        }
        if p.speed == 0 {
            errors.push("playback.speed must be >= 1".to_string());
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        // Reject NaN/Inf in the numeric sections (sweep f64 fields via serialization)
        let numeric = [
            toml::to_string(&self.signals),
            toml::to_string(&self.detection),
            toml::to_string(&self.controller),
        ];
        if numeric
            .iter()
            .flatten()
            .any(|s| s.contains("nan") || s.contains("inf"))
        {
            errors.push("Config contains NaN or Inf values; all values must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    // ------------------------------------------------------------------------
    // Batch parameter construction
    // ------------------------------------------------------------------------

    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            window_s: self.signals.window_s,
            min_rpm: self.signals.min_rpm,
            mwd_forward_fill_samples: self.signals.mwd_forward_fill_samples,
            torque_spike_sigma: self.signals.torque_spike_sigma,
        }
    }

    /// Detection parameters for a dataset with median spacing `dt` seconds.
    ///
    /// An explicit `min_sustain_samples` wins over `min_duration_s`.
    pub fn detection_params(&self, dt: Option<f64>) -> DetectionParams {
        let min_sustain_samples = self.detection.min_sustain_samples.unwrap_or_else(|| {
            match dt {
                Some(dt) if dt > 0.0 => ((self.detection.min_duration_s / dt) as usize).max(MIN_SUSTAIN_SAMPLES),
                _ => FALLBACK_SUSTAIN_SAMPLES,
            }
        });
        DetectionParams {
            weights: self.detection.weights.to_weights(),
            threshold: self.detection.threshold,
            min_sustain_samples,
        }
    }

    /// Controller parameters for spacing `dt`; unset nominals come from `estimated`.
    ///
    /// The holdoff rounds up so the confirmation span is never shorter than
    /// `holdoff_s` of recorded time.
    pub fn controller_params(&self, dt: Option<f64>, estimated: Nominals) -> ControllerParams {
        let c = &self.controller;
        let holdoff_samples = match dt {
            Some(dt) if dt > 0.0 => (c.holdoff_s / dt).ceil() as usize,
            _ => FALLBACK_HOLDOFF_SAMPLES,
        };
        ControllerParams {
            engage_threshold: c.engage_threshold,
            recovery_threshold: c.recovery_threshold,
            holdoff_samples,
            kp_actuator_a: c.kp_actuator_a,
            actuator_a_floor_fraction: c.actuator_a_floor_fraction,
            kp_actuator_b: c.kp_actuator_b,
            actuator_b_max_delta: c.actuator_b_max_delta,
            nominal_a: c.nominal_a.unwrap_or(estimated.a),
            nominal_b: c.nominal_b.unwrap_or(estimated.b),
        }
    }
}

// ============================================================================
// Well Info
// ============================================================================

/// Identification metadata; appears in logs and exported reports only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellInfo {
    #[serde(default = "default_well_name")]
    pub name: String,

    #[serde(default = "default_field")]
    pub field: String,

    /// Hole section, e.g. "12.25 in"
    #[serde(default = "default_section")]
    pub section: String,
}

fn default_well_name() -> String {
    "15/9-F-9 A".to_string()
}
fn default_field() -> String {
    "Volve".to_string()
}
fn default_section() -> String {
    "12.25 in".to_string()
}

impl Default for WellInfo {
    fn default() -> Self {
        Self {
            name: default_well_name(),
            field: default_field(),
            section: default_section(),
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Rolling window for RPM / torque statistics (s)
    #[serde(default = "default_window_s")]
    pub window_s: f64,

    /// Below this rolling RPM the string is treated as not rotating
    #[serde(default = "default_min_rpm")]
    pub min_rpm: f64,

    /// Missing MWD readings bridged by forward fill
    #[serde(default = "default_mwd_ffill")]
    pub mwd_forward_fill_samples: usize,

    #[serde(default = "default_spike_sigma")]
    pub torque_spike_sigma: f64,
}

fn default_window_s() -> f64 {
    60.0
}
fn default_min_rpm() -> f64 {
    15.0
}
fn default_mwd_ffill() -> usize {
    8
}
fn default_spike_sigma() -> f64 {
    1.5
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            window_s: default_window_s(),
            min_rpm: default_min_rpm(),
            mwd_forward_fill_samples: default_mwd_ffill(),
            torque_spike_sigma: default_spike_sigma(),
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_w_mwd")]
    pub mwd: f64,
    #[serde(default = "default_w_torque")]
    pub torque: f64,
    #[serde(default = "default_w_rpm")]
    pub rpm: f64,
}

fn default_w_mwd() -> f64 {
    0.60
}
fn default_w_torque() -> f64 {
    0.30
}
fn default_w_rpm() -> f64 {
    0.10
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            mwd: default_w_mwd(),
            torque: default_w_torque(),
            rpm: default_w_rpm(),
        }
    }
}

impl WeightsConfig {
    pub const fn to_weights(&self) -> DetectionWeights {
        DetectionWeights::new(self.mwd, self.torque, self.rpm)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Severity at or above which a sample counts toward an event
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Minimum event duration (s), converted to samples
    #[serde(default = "default_min_duration_s")]
    pub min_duration_s: f64,

    /// Explicit sustain window in samples; overrides `min_duration_s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sustain_samples: Option<usize>,

    #[serde(default)]
    pub weights: WeightsConfig,
}

fn default_threshold() -> f64 {
    0.25
}
fn default_min_duration_s() -> f64 {
    20.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_duration_s: default_min_duration_s(),
            min_sustain_samples: None,
            weights: WeightsConfig::default(),
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_engage")]
    pub engage_threshold: f64,

    #[serde(default = "default_recovery")]
    pub recovery_threshold: f64,

    /// Sustained detection before actuation (s)
    #[serde(default = "default_holdoff_s")]
    pub holdoff_s: f64,

    /// WOB reduction per unit excess severity
    #[serde(default = "default_kp_a")]
    pub kp_actuator_a: f64,

    /// WOB floor as a fraction of nominal
    #[serde(default = "default_floor_fraction")]
    pub actuator_a_floor_fraction: f64,

    #[serde(default = "default_kp_b")]
    pub kp_actuator_b: f64,

    /// Ceiling on RPM increase above nominal (rpm)
    #[serde(default = "default_b_delta")]
    pub actuator_b_max_delta: f64,

    /// Nominal WOB (kkgf); estimated from the data when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal_a: Option<f64>,

    /// Nominal RPM; estimated from the data when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal_b: Option<f64>,
}

fn default_engage() -> f64 {
    0.30
}
fn default_recovery() -> f64 {
    0.20
}
fn default_holdoff_s() -> f64 {
    25.0
}
fn default_kp_a() -> f64 {
    0.30
}
fn default_floor_fraction() -> f64 {
    0.35
}
fn default_kp_b() -> f64 {
    0.15
}
fn default_b_delta() -> f64 {
    25.0
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            engage_threshold: default_engage(),
            recovery_threshold: default_recovery(),
            holdoff_s: default_holdoff_s(),
            kp_actuator_a: default_kp_a(),
            actuator_a_floor_fraction: default_floor_fraction(),
            kp_actuator_b: default_kp_b(),
            actuator_b_max_delta: default_b_delta(),
            nominal_a: None,
            nominal_b: None,
        }
    }
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// External tick period (ms)
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,

    /// Slow-channel throttle (ms)
    #[serde(default = "default_slow_ms")]
    pub slow_interval_ms: u64,

    /// Samples advanced per tick
    #[serde(default = "default_speed")]
    pub speed: u32,
}

fn default_tick_ms() -> u64 {
    super::defaults::TICK_INTERVAL_MS
}
fn default_slow_ms() -> u64 {
    super::defaults::SLOW_CHANNEL_INTERVAL_MS
}
fn default_speed() -> u32 {
    1
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_ms(),
            slow_interval_ms: default_slow_ms(),
            speed: default_speed(),
        }
    }
}
