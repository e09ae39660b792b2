//! Parameter sets for the detection and controller passes.
//!
//! Each set is immutable for the duration of one pass and is validated in
//! full before the pass touches any data.

use serde::{Deserialize, Serialize};

use super::errors::ConfigurationError;

// ============================================================================
// Detection
// ============================================================================

/// Relative weights of the three severity channels.
///
/// Only relative magnitude matters: the triple is divided by its sum before
/// use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionWeights {
    pub mwd: f64,
    pub torque: f64,
    pub rpm: f64,
}

impl Default for DetectionWeights {
    fn default() -> Self {
        Self {
            mwd: 0.60,
            torque: 0.30,
            rpm: 0.10,
        }
    }
}

impl DetectionWeights {
    pub const fn new(mwd: f64, torque: f64, rpm: f64) -> Self {
        Self { mwd, torque, rpm }
    }

    /// Divide the triple by its sum.
    pub fn normalized(&self) -> Result<Self, ConfigurationError> {
        for (name, value) in [("mwd", self.mwd), ("torque", self.torque), ("rpm", self.rpm)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidWeight { name, value });
            }
        }
        let sum = self.mwd + self.torque + self.rpm;
        if sum <= 0.0 {
            return Err(ConfigurationError::ZeroWeights);
        }
        Ok(Self {
            mwd: self.mwd / sum,
            torque: self.torque / sum,
            rpm: self.rpm / sum,
        })
    }
}

/// Parameters of one severity + segmentation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    pub weights: DetectionWeights,
    /// Severity at or above which a sample counts toward an event
    pub threshold: f64,
    /// Trailing window, in samples, that must be entirely above threshold
    pub min_sustain_samples: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            weights: DetectionWeights::default(),
            threshold: 0.25,
            min_sustain_samples: 5,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.weights.normalized()?;
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange(self.threshold));
        }
        if self.min_sustain_samples < 1 {
            return Err(ConfigurationError::InvalidSustainWindow(self.min_sustain_samples));
        }
        Ok(())
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Tuning of the four-state auto-driller.
///
/// Actuator A is the weight-on-bit channel (reduced under severity),
/// actuator B is the rotary-speed channel (raised under severity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerParams {
    /// Enter DETECTING at or above this severity
    pub engage_threshold: f64,
    /// Leave MITIGATING below this severity
    pub recovery_threshold: f64,
    /// Samples of sustained detection before actuation
    pub holdoff_samples: usize,
    /// Fractional A reduction per unit of excess severity
    pub kp_actuator_a: f64,
    /// A never drops below `nominal_a * actuator_a_floor_fraction`
    pub actuator_a_floor_fraction: f64,
    /// B increase gain (scaled by 10 per unit of excess severity)
    pub kp_actuator_b: f64,
    /// Hard ceiling on B above nominal
    pub actuator_b_max_delta: f64,
    /// Undisturbed A setpoint
    pub nominal_a: f64,
    /// Undisturbed B setpoint
    pub nominal_b: f64,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            engage_threshold: 0.30,
            recovery_threshold: 0.20,
            holdoff_samples: 5,
            kp_actuator_a: 0.30,
            actuator_a_floor_fraction: 0.35,
            kp_actuator_b: 0.15,
            actuator_b_max_delta: 25.0,
            nominal_a: 10.0,
            nominal_b: 120.0,
        }
    }
}

impl ControllerParams {
    /// Reject inconsistent tuning before a pass begins.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("engage_threshold", self.engage_threshold),
            ("recovery_threshold", self.recovery_threshold),
            ("kp_actuator_a", self.kp_actuator_a),
            ("actuator_a_floor_fraction", self.actuator_a_floor_fraction),
            ("kp_actuator_b", self.kp_actuator_b),
            ("actuator_b_max_delta", self.actuator_b_max_delta),
            ("nominal_a", self.nominal_a),
            ("nominal_b", self.nominal_b),
        ] {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFinite { name, value });
            }
        }

        for (name, value) in [("nominal_a", self.nominal_a), ("nominal_b", self.nominal_b)] {
            if value <= 0.0 {
                return Err(ConfigurationError::NonPositiveNominal { name, value });
            }
        }

        if self.recovery_threshold > self.engage_threshold {
            return Err(ConfigurationError::InvertedThresholds {
                engage: self.engage_threshold,
                recovery: self.recovery_threshold,
            });
        }

        for (name, value) in [
            ("kp_actuator_a", self.kp_actuator_a),
            ("kp_actuator_b", self.kp_actuator_b),
            ("actuator_b_max_delta", self.actuator_b_max_delta),
        ] {
            if value < 0.0 {
                return Err(ConfigurationError::NegativeParameter { name, value });
            }
        }

        if self.actuator_a_floor_fraction <= 0.0 || self.actuator_a_floor_fraction > 1.0 {
            return Err(ConfigurationError::InvalidFloorFraction(
                self.actuator_a_floor_fraction,
            ));
        }

        Ok(())
    }
}
