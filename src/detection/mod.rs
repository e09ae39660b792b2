//! Severity Detection
//!
//! The batch pass that turns indicator-bearing rows into processed rows:
//!
//! 1. [`indicators`] derives MWD, torque and RPM indicators from raw channels
//! 2. [`scorer`] fuses the three indicators into one severity in [0, 1]
//! 3. [`segmenter`] flags sustained runs and numbers them as events
//! 4. [`events`] summarises events, cross-checks them against MWD and
//!    estimates the torsional oscillation frequency
//!
//! ## Usage
//!
//! ```ignore
//! let rows = detection::derive_indicators(&raw, &IndicatorParams::default());
//! let processed = detection::compute_severity_and_events(&rows, &DetectionParams::default())?;
//! ```
//!
//! The pass is pure and re-entrant: a parameter change means calling it again
//! over the whole sequence.

pub mod events;
pub mod indicators;
pub mod scorer;
pub mod segmenter;

pub use events::{
    compute_torsional_frequency, summarize_events, validate_against_mwd, EventSummary, MwdValidation,
    TorsionalFrequency,
};
pub use indicators::{derive_indicators, median_sample_interval, seconds_to_samples, IndicatorParams};
pub use scorer::{score, SeverityScorer};
pub use segmenter::{segment, Segmentation};

use tracing::info;

use crate::types::{ConfigurationError, DetectionParams, ProcessedSample, Sample, SeverityLabel};

/// Score every sample and segment the scores into events.
///
/// Parameters are validated before any row is touched, so an error means no
/// output at all.
pub fn compute_severity_and_events(
    samples: &[Sample],
    params: &DetectionParams,
) -> Result<Vec<ProcessedSample>, ConfigurationError> {
    params.validate()?;

    let scorer = SeverityScorer::new(&params.weights)?;
    let severities: Vec<f64> = samples.iter().map(|s| scorer.score(s)).collect();
    let seg = segment(&severities, params.threshold, params.min_sustain_samples)?;

    info!(
        events = seg.event_count(),
        flagged_pct = format!("{:.1}", seg.flagged_fraction() * 100.0),
        threshold = params.threshold,
        min_sustain_samples = params.min_sustain_samples,
        "Detection pass complete"
    );

    Ok(samples
        .iter()
        .zip(severities)
        .zip(seg.sustained.into_iter().zip(seg.event_ids))
        .map(|((sample, severity), (sustained, event_id))| ProcessedSample {
            sample: sample.clone(),
            severity,
            sustained,
            event_id,
            severity_label: SeverityLabel::from_severity(severity),
        })
        .collect())
}
