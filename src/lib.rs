//! TVM Replay: torsional vibration mitigation replay
//!
//! Batch analysis and interactive playback of recorded drilling telemetry.
//!
//! ## Architecture
//!
//! - **Detection**: derives stick-slip indicators, fuses them into a severity
//!   score and segments sustained events
//! - **Controller**: four-state auto-driller producing WOB / RPM setpoints
//! - **Playback**: cursor scheduler with a fast cursor channel and a throttled,
//!   smoothed frame channel, driven by a tokio task
//! - **Volve / Report**: CSV ingestion and JSON export around the core

pub mod analysis;
pub mod config;
pub mod controller;
pub mod detection;
pub mod playback;
pub mod report;
pub mod types;
pub mod volve;

// Re-export configuration
pub use config::ReplayConfig;

// Re-export commonly used types
pub use types::{
    ConfigurationError, ControlAction, ControllerOutput, ControllerParams, ControllerState,
    DetectionParams, DetectionWeights, ProcessedSample, RangeError, Sample, SeverityLabel,
};

// Re-export the batch pipeline
pub use analysis::{analyze, Analysis};
pub use controller::{estimate_nominals, run_controller, ControllerMachine, Nominals};
pub use detection::{compute_severity_and_events, derive_indicators, EventSummary, MwdValidation};

// Re-export playback
pub use playback::{PlaybackHandle, PlaybackScheduler, PlaybackState, SlowFrame};

pub use volve::{VolveConfig, VolveError, VolveReplay};
