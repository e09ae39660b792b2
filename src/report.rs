//! JSON export of a finished analysis
//!
//! Writes three files into an output directory:
//!
//! - `telemetry.json`: per-row channels, indicators, severity and controller
//!   outputs, keeping every Nth row
//! - `events.json`: one [`EventSummary`] per event
//! - `metadata.json`: well identification, dataset extent, detection and
//!   controller tuning, MWD validation
//!
//! Non-finite floats serialise as `null`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::analysis::Analysis;
use crate::config::{ReplayConfig, WellInfo};
use crate::controller::Nominals;
use crate::detection::{EventSummary, MwdValidation, TorsionalFrequency};
use crate::types::{
    ControllerOutput, ControllerState, DetectionWeights, ProcessedSample, SeverityLabel,
};

pub const TELEMETRY_FILE: &str = "telemetry.json";
pub const EVENTS_FILE: &str = "events.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("JSON serialisation failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Telemetry rows
// ============================================================================

/// Flat telemetry row as written to `telemetry.json`.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRow {
    pub elapsed_s: f64,
    pub bit_depth_m: Option<f64>,
    pub rpm: Option<f64>,
    pub torque_knm: Option<f64>,
    pub wob_kkgf: Option<f64>,
    pub rop_mh: Option<f64>,
    pub rpm_ssi: Option<f64>,
    pub torque_deviation: Option<f64>,
    /// 0/1 for compactness
    pub torque_spike: Option<u8>,
    pub mwd_ss_pktopk: Option<f64>,
    pub mwd_ssi: Option<f64>,
    pub severity: f64,
    pub severity_label: SeverityLabel,
    pub sustained: u8,
    pub event_id: u32,
    pub state: ControllerState,
    pub setpoint_a: f64,
    pub setpoint_b: f64,
}

impl TelemetryRow {
    fn new(p: &ProcessedSample, o: &ControllerOutput) -> Self {
        let s = &p.sample;
        Self {
            elapsed_s: (s.elapsed_s * 10.0).round() / 10.0,
            bit_depth_m: s.bit_depth_m,
            rpm: s.rpm,
            torque_knm: s.torque_knm,
            wob_kkgf: s.wob_kkgf,
            rop_mh: s.rop_mh,
            rpm_ssi: s.rpm_ssi,
            torque_deviation: s.torque_deviation,
            torque_spike: s.torque_spike.map(u8::from),
            mwd_ss_pktopk: s.mwd_ss_pktopk,
            mwd_ssi: s.mwd_ssi,
            severity: p.severity,
            severity_label: p.severity_label,
            sustained: u8::from(p.sustained),
            event_id: p.event_id,
            state: o.state,
            setpoint_a: o.setpoint_a,
            setpoint_b: o.setpoint_b,
        }
    }
}

/// Every `step`-th row, starting at the first (`step` of 0 is treated as 1).
pub fn telemetry_rows(analysis: &Analysis, step: usize) -> Vec<TelemetryRow> {
    analysis
        .processed
        .iter()
        .zip(&analysis.outputs)
        .step_by(step.max(1))
        .map(|(p, o)| TelemetryRow::new(p, o))
        .collect()
}

// ============================================================================
// Metadata
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DetectionMetadata {
    pub threshold: f64,
    pub min_sustain_samples: usize,
    pub weights: DetectionWeights,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerMetadata {
    pub states: [ControllerState; 4],
    pub estimated_nominals: Nominals,
    pub nominal_a: f64,
    pub nominal_b: f64,
    pub engage_threshold: f64,
    pub recovery_threshold: f64,
    pub holdoff_samples: usize,
    pub kp_actuator_a: f64,
    pub actuator_a_floor_fraction: f64,
    pub kp_actuator_b: f64,
    pub actuator_b_max_delta: f64,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub well: WellInfo,
    pub generated_at: DateTime<Utc>,
    pub depth_range_m: Option<(f64, f64)>,
    pub duration_days: f64,
    pub sample_interval_s: Option<f64>,
    pub on_bottom_samples: usize,
    pub downsampled_samples: usize,
    pub n_events: usize,
    pub severe_events: usize,
    pub moderate_events: usize,
    pub flagged_pct: f64,
    pub mwd_max_pktopk_rpm: Option<f64>,
    pub detection: DetectionMetadata,
    pub validation: Option<MwdValidation>,
    pub torsional_frequency: TorsionalFrequency,
    pub controller: ControllerMetadata,
}

impl RunMetadata {
    pub fn build(analysis: &Analysis, config: &ReplayConfig, downsampled_samples: usize) -> Self {
        let depths: Vec<f64> = analysis
            .processed
            .iter()
            .filter_map(|p| p.sample.bit_depth_m)
            .filter(|d| d.is_finite())
            .collect();
        let depth_range_m = (!depths.is_empty()).then(|| {
            (
                depths.iter().copied().fold(f64::INFINITY, f64::min),
                depths.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        });

        let duration_s = match (analysis.processed.first(), analysis.processed.last()) {
            (Some(a), Some(b)) => b.elapsed_s() - a.elapsed_s(),
            _ => 0.0,
        };

        let count_label =
            |label: SeverityLabel| analysis.events.iter().filter(|e| e.severity == label).count();

        let mwd_max_pktopk_rpm = analysis
            .processed
            .iter()
            .filter_map(|p| p.sample.mwd_ss_pktopk)
            .filter(|v| v.is_finite())
            .reduce(f64::max);

        let d = &analysis.detection_params;
        let c = &analysis.controller_params;

        Self {
            well: config.well.clone(),
            generated_at: Utc::now(),
            depth_range_m,
            duration_days: duration_s / 86_400.0,
            sample_interval_s: analysis.sample_interval_s,
            on_bottom_samples: analysis.len(),
            downsampled_samples,
            n_events: analysis.events.len(),
            severe_events: count_label(SeverityLabel::Severe),
            moderate_events: count_label(SeverityLabel::Moderate),
            flagged_pct: analysis.flagged_fraction() * 100.0,
            mwd_max_pktopk_rpm,
            detection: DetectionMetadata {
                threshold: d.threshold,
                min_sustain_samples: d.min_sustain_samples,
                weights: d.weights,
            },
            validation: analysis.validation.clone(),
            torsional_frequency: analysis.torsional,
            controller: ControllerMetadata {
                states: ControllerState::ALL,
                estimated_nominals: analysis.estimated_nominals,
                nominal_a: c.nominal_a,
                nominal_b: c.nominal_b,
                engage_threshold: c.engage_threshold,
                recovery_threshold: c.recovery_threshold,
                holdoff_samples: c.holdoff_samples,
                kp_actuator_a: c.kp_actuator_a,
                actuator_a_floor_fraction: c.actuator_a_floor_fraction,
                kp_actuator_b: c.kp_actuator_b,
                actuator_b_max_delta: c.actuator_b_max_delta,
            },
        }
    }
}

// ============================================================================
// Export
// ============================================================================

/// What [`export`] wrote.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub telemetry_path: PathBuf,
    pub events_path: PathBuf,
    pub metadata_path: PathBuf,
    pub telemetry_rows: usize,
    pub events: usize,
}

/// Write telemetry, events and metadata JSON into `out_dir`, creating it if needed.
pub fn export(
    analysis: &Analysis,
    config: &ReplayConfig,
    out_dir: &Path,
    downsample: usize,
) -> Result<ExportSummary, ReportError> {
    fs::create_dir_all(out_dir).map_err(|e| ReportError::Io(out_dir.to_path_buf(), e))?;

    let rows = telemetry_rows(analysis, downsample);
    let telemetry_path = out_dir.join(TELEMETRY_FILE);
    write_json(&telemetry_path, &serde_json::to_vec(&rows)?)?;

    let events_path = out_dir.join(EVENTS_FILE);
    let events: &[EventSummary] = &analysis.events;
    write_json(&events_path, &serde_json::to_vec(events)?)?;

    let metadata = RunMetadata::build(analysis, config, rows.len());
    let metadata_path = out_dir.join(METADATA_FILE);
    write_json(&metadata_path, &serde_json::to_vec_pretty(&metadata)?)?;

    info!(
        dir = %out_dir.display(),
        telemetry_rows = rows.len(),
        events = events.len(),
        "Report exported"
    );

    Ok(ExportSummary {
        telemetry_path,
        events_path,
        metadata_path,
        telemetry_rows: rows.len(),
        events: events.len(),
    })
}

fn write_json(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    fs::write(path, bytes).map_err(|e| ReportError::Io(path.to_path_buf(), e))
}
