//! Composite Severity Score
//!
//! Fuses the downhole MWD indicator with the two surface indicators into a
//! single bounded score. The MWD channel arrives pre-normalised to [0, 1];
//! torque deviation and RPM oscillation are derivative signals with a natural
//! range of roughly [0, 2], so they are halved and clamped before weighting.

use crate::types::{ConfigurationError, DetectionWeights, Sample};

/// Scale applied to the surface indicators before clamping.
const SURFACE_INDICATOR_SCALE: f64 = 0.5;

/// Scores samples against one normalised weight triple.
///
/// Construction validates and normalises the weights once so that scoring a
/// long sequence does not repeat the check per row.
#[derive(Debug, Clone, Copy)]
pub struct SeverityScorer {
    weights: DetectionWeights,
}

impl SeverityScorer {
    pub fn new(weights: &DetectionWeights) -> Result<Self, ConfigurationError> {
        Ok(Self {
            weights: weights.normalized()?,
        })
    }

    /// Normalised weights in use.
    pub const fn weights(&self) -> &DetectionWeights {
        &self.weights
    }

    /// Severity of one row, always within [0, 1].
    pub fn score(&self, sample: &Sample) -> f64 {
        let mwd = channel(sample.mwd_ssi);
        let torque = shaped_surface(channel(sample.torque_deviation));
        let rpm = shaped_surface(channel(sample.rpm_ssi));

        let css = mwd * self.weights.mwd + torque * self.weights.torque + rpm * self.weights.rpm;
        css.clamp(0.0, 1.0)
    }
}

/// One-shot form of [`SeverityScorer::score`].
pub fn score(sample: &Sample, weights: &DetectionWeights) -> Result<f64, ConfigurationError> {
    Ok(SeverityScorer::new(weights)?.score(sample))
}

/// Absent or non-finite readings contribute nothing.
fn channel(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

fn shaped_surface(value: f64) -> f64 {
    (value * SURFACE_INDICATOR_SCALE).clamp(0.0, 1.0)
}
