//! Error kinds shared by the batch passes and the playback scheduler.

use thiserror::Error;

/// A rejected configuration.
///
/// Raised synchronously before a batch pass runs or before any scheduler
/// state is mutated, so a caller never observes partial output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("severity weights must not all be zero")]
    ZeroWeights,

    #[error("severity weight '{name}' must be a finite non-negative number, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("detection threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("minimum sustain window must be at least 1 sample, got {0}")]
    InvalidSustainWindow(usize),

    #[error("recovery threshold ({recovery}) must not exceed engage threshold ({engage})")]
    InvertedThresholds { engage: f64, recovery: f64 },

    #[error("controller parameter '{name}' must not be negative, got {value}")]
    NegativeParameter { name: &'static str, value: f64 },

    #[error("actuator A floor fraction must be within (0, 1], got {0}")]
    InvalidFloorFraction(f64),

    #[error("controller parameter '{name}' must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("controller nominal '{name}' must be positive, got {value}")]
    NonPositiveNominal { name: &'static str, value: f64 },

    #[error("speed multiplier must be a positive integer, got {0}")]
    InvalidSpeed(u32),

    #[error("sample array has {samples} rows but controller output has {outputs}")]
    LengthMismatch { samples: usize, outputs: usize },
}

/// An index or seek request outside `[0, N-1]`.
///
/// Never surfaced to callers: the scheduler clamps and logs it.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("requested position {requested} outside [0, {max}]")]
pub struct RangeError {
    pub requested: f64,
    pub max: usize,
}
