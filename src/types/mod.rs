//! Shared data structures for the torsional vibration replay
//!
//! This module defines the types that flow between the batch passes and the
//! playback scheduler:
//! - Sample: one uniformly-sampled telemetry row (ingestion output)
//! - ProcessedSample: Sample + severity, sustained flag, event id
//! - DetectionParams / ControllerParams: immutable per-pass tuning
//! - ControllerOutput: per-sample auto-driller state and setpoints
//! - ConfigurationError / RangeError: the two error kinds of the core

mod control;
mod errors;
mod params;
mod sample;

pub use control::*;
pub use errors::*;
pub use params::*;
pub use sample::*;
