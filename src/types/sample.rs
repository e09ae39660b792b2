//! Telemetry rows before and after the detection pass.

use serde::{Deserialize, Serialize};

// ============================================================================
// Severity Bands
// ============================================================================

/// Lower bound of the MILD band (dimensionless severity).
pub const SEVERITY_STABLE: f64 = 0.25;
/// Lower bound of the MODERATE band.
pub const SEVERITY_MILD: f64 = 0.50;
/// Lower bound of the SEVERE band.
pub const SEVERITY_MODERATE: f64 = 0.75;

/// Operator-facing severity band.
///
/// - STABLE: no dysfunction
/// - MILD: monitor, no action required
/// - MODERATE: reduce WOB 10-20%
/// - SEVERE: reduce WOB 25-35%, raise RPM
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityLabel {
    #[default]
    Stable,
    Mild,
    Moderate,
    Severe,
}

impl SeverityLabel {
    pub fn from_severity(severity: f64) -> Self {
        if severity >= SEVERITY_MODERATE {
            Self::Severe
        } else if severity >= SEVERITY_MILD {
            Self::Moderate
        } else if severity >= SEVERITY_STABLE {
            Self::Mild
        } else {
            Self::Stable
        }
    }
}

impl std::fmt::Display for SeverityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "STABLE"),
            Self::Mild => write!(f, "MILD"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Severe => write!(f, "SEVERE"),
        }
    }
}

// ============================================================================
// Sample
// ============================================================================

/// One uniformly-sampled telemetry row.
///
/// Every channel is independently nullable. Rows are ordered by `elapsed_s`,
/// which is strictly increasing across a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the first row of the dataset
    pub elapsed_s: f64,

    /// Bit depth (m)
    #[serde(default)]
    pub bit_depth_m: Option<f64>,
    /// Surface rotary speed (rpm)
    #[serde(default)]
    pub rpm: Option<f64>,
    /// Surface torque (kN.m)
    #[serde(default)]
    pub torque_knm: Option<f64>,
    /// Weight on bit (kkgf)
    #[serde(default)]
    pub wob_kkgf: Option<f64>,
    /// Rate of penetration (m/h)
    #[serde(default)]
    pub rop_mh: Option<f64>,
    /// MWD downhole stick-slip peak-to-peak RPM
    #[serde(default)]
    pub mwd_ss_pktopk: Option<f64>,

    /// Normalised MWD stick-slip indicator, already in [0, 1]
    #[serde(default)]
    pub mwd_ssi: Option<f64>,
    /// Fractional torque deviation from its rolling baseline
    #[serde(default)]
    pub torque_deviation: Option<f64>,
    /// Surface stick-slip index (rolling RPM std / mean)
    #[serde(default)]
    pub rpm_ssi: Option<f64>,
    /// Torque exceeded baseline + N sigma
    #[serde(default)]
    pub torque_spike: Option<bool>,
    /// Rolling RPM mean below the rotation floor; indicators were cleared
    #[serde(default)]
    pub not_rotating: bool,
}

impl Sample {
    pub fn at(elapsed_s: f64) -> Self {
        Self {
            elapsed_s,
            ..Default::default()
        }
    }

    /// Builder-style helper for the three scorer indicators.
    pub fn with_indicators(
        mut self,
        mwd_ssi: Option<f64>,
        torque_deviation: Option<f64>,
        rpm_ssi: Option<f64>,
    ) -> Self {
        self.mwd_ssi = mwd_ssi;
        self.torque_deviation = torque_deviation;
        self.rpm_ssi = rpm_ssi;
        self
    }
}

// ============================================================================
// Processed Sample
// ============================================================================

/// A [`Sample`] plus the fields derived by one detection pass.
///
/// Never edited in place: a parameter change produces a fresh array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSample {
    #[serde(flatten)]
    pub sample: Sample,
    /// Composite severity score in [0, 1]
    pub severity: f64,
    /// Severity held at or above threshold for the full trailing window
    pub sustained: bool,
    /// Event identifier, 0 when not part of an event
    pub event_id: u32,
    pub severity_label: SeverityLabel,
}

impl ProcessedSample {
    pub fn elapsed_s(&self) -> f64 {
        self.sample.elapsed_s
    }
}
