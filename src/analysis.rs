//! Batch analysis pipeline
//!
//! Chains the four batch passes over one loaded dataset:
//!
//! ```text
//! raw Samples → derive_indicators → compute_severity_and_events
//!             → estimate_nominals → run_controller
//!             → summarize_events + validate_against_mwd
//! ```
//!
//! Every stage is pure; re-running with a new [`ReplayConfig`] yields a fresh
//! [`Analysis`] that can be handed to the playback scheduler via `replace`.

use std::time::Instant;

use tracing::info;

use crate::config::ReplayConfig;
use crate::controller::{estimate_nominals, run_controller, Nominals};
use crate::detection::{
    compute_severity_and_events, compute_torsional_frequency, derive_indicators,
    median_sample_interval, summarize_events, validate_against_mwd, EventSummary, MwdValidation,
    TorsionalFrequency,
};
use crate::types::{ConfigurationError, ControllerOutput, ControllerParams, DetectionParams, ProcessedSample, Sample};

/// Everything the batch passes produce for one dataset.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub processed: Vec<ProcessedSample>,
    /// Index-aligned with `processed`
    pub outputs: Vec<ControllerOutput>,
    pub events: Vec<EventSummary>,
    pub validation: Option<MwdValidation>,
    /// Dominant torque oscillation of the most severe event
    pub torsional: TorsionalFrequency,
    /// Nominals estimated from the data (before config overrides)
    pub estimated_nominals: Nominals,
    pub detection_params: DetectionParams,
    pub controller_params: ControllerParams,
    /// Median sample spacing (s)
    pub sample_interval_s: Option<f64>,
}

impl Analysis {
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Fraction of rows flagged as sustained.
    pub fn flagged_fraction(&self) -> f64 {
        if self.processed.is_empty() {
            return 0.0;
        }
        self.processed.iter().filter(|p| p.sustained).count() as f64 / self.processed.len() as f64
    }

    /// Split into the two arrays the playback scheduler takes.
    pub fn into_playback(self) -> (Vec<ProcessedSample>, Vec<ControllerOutput>) {
        (self.processed, self.outputs)
    }
}

/// Run every batch pass over `raw` with the tuning in `config`.
///
/// Fails only on invalid parameters, before any pass produces output.
pub fn analyze(raw: &[Sample], config: &ReplayConfig) -> Result<Analysis, ConfigurationError> {
    let started = Instant::now();

    let dt = median_sample_interval(raw);
    let detection_params = config.detection_params(dt);
    detection_params.validate()?;

    let rows = derive_indicators(raw, &config.indicator_params());
    let processed = compute_severity_and_events(&rows, &detection_params)?;

    let estimated_nominals = estimate_nominals(&processed, config.controller.engage_threshold);
    let controller_params = config.controller_params(dt, estimated_nominals);
    let outputs = run_controller(&processed, &controller_params)?;

    let events = summarize_events(&processed, Some(&outputs));
    let validation = validate_against_mwd(&processed);
    let torsional = compute_torsional_frequency(&processed, dt);

    info!(
        rows = processed.len(),
        events = events.len(),
        dt_s = dt.map(|d| format!("{d:.2}")),
        holdoff_samples = controller_params.holdoff_samples,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Analysis complete"
    );

    Ok(Analysis {
        processed,
        outputs,
        events,
        validation,
        torsional,
        estimated_nominals,
        detection_params,
        controller_params,
        sample_interval_s: dt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControllerState;

    /// Steady drilling at 1 s spacing with a stick-slip burst in the middle.
    fn synthetic(n: usize, burst: std::ops::Range<usize>) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let in_burst = burst.contains(&i);
                Sample {
                    elapsed_s: i as f64,
                    bit_depth_m: Some(2500.0 + i as f64 * 0.01),
                    rpm: Some(if in_burst { 120.0 + if i % 2 == 0 { 40.0 } else { -40.0 } } else { 120.0 }),
                    torque_knm: Some(if in_burst { 18.0 } else { 12.0 }),
                    wob_kkgf: Some(10.0),
                    rop_mh: Some(20.0),
                    mwd_ss_pktopk: Some(if in_burst { 350.0 } else { 10.0 }),
                    ..Default::default()
                }
            })
            .collect()
    }

    #[test]
    fn burst_is_detected_and_mitigated() {
        let raw = synthetic(600, 300..420);
        let analysis = analyze(&raw, &ReplayConfig::default()).unwrap();

        assert_eq!(analysis.len(), 600);
        assert_eq!(analysis.outputs.len(), 600);
        assert!(!analysis.events.is_empty(), "burst should produce an event");
        assert!(analysis.outputs.iter().any(|o| o.state == ControllerState::Mitigating));
        assert_eq!(analysis.sample_interval_s, Some(1.0));
        // 25 s holdoff at 1 s spacing
        assert_eq!(analysis.controller_params.holdoff_samples, 25);
        // 20 s sustain window at 1 s spacing
        assert_eq!(analysis.detection_params.min_sustain_samples, 20);
        assert!((analysis.estimated_nominals.a - 10.0).abs() < 1e-9);
        assert!((analysis.estimated_nominals.b - 120.0).abs() < 1e-9);
        assert!(analysis.validation.is_some());
        // torque steps back down inside the analysed span
        assert!(analysis.torsional.dominant_freq_hz > 0.0);
    }

    #[test]
    fn quiet_data_has_no_events() {
        let raw = synthetic(300, 0..0);
        let analysis = analyze(&raw, &ReplayConfig::default()).unwrap();
        assert!(analysis.events.is_empty());
        assert_eq!(analysis.flagged_fraction(), 0.0);
        assert!(analysis.outputs.iter().all(|o| o.state == ControllerState::Normal));
        assert_eq!(analysis.torsional, TorsionalFrequency::default());
    }

    #[test]
    fn invalid_threshold_fails_before_output() {
        let mut config = ReplayConfig::default();
        config.detection.threshold = 1.5;
        assert!(analyze(&synthetic(50, 0..0), &config).is_err());
    }

    #[test]
    fn config_nominals_override_estimates() {
        let mut config = ReplayConfig::default();
        config.controller.nominal_a = Some(14.0);
        let analysis = analyze(&synthetic(100, 0..0), &config).unwrap();
        assert_eq!(analysis.controller_params.nominal_a, 14.0);
        assert!((analysis.controller_params.nominal_b - 120.0).abs() < 1e-9);
        assert!(analysis.outputs.iter().all(|o| o.setpoint_a == 14.0));
    }

    #[test]
    fn empty_input_is_empty_analysis() {
        let analysis = analyze(&[], &ReplayConfig::default()).unwrap();
        assert!(analysis.is_empty());
        assert!(analysis.events.is_empty());
        assert!(analysis.validation.is_none());
    }
}
