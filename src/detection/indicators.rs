//! Indicator derivation from raw surface and MWD channels.
//!
//! Surface RPM barely oscillates during MWD-confirmed stick-slip because the
//! top drive holds rotary speed and the drill string absorbs the downhole
//! oscillation. The MWD channel is therefore the authority signal; surface
//! torque deviation is the continuous proxy, and surface RPM oscillation is
//! kept as a weak third indicator.
//!
//! Adds to each row:
//! - `rpm_ssi`: rolling RPM std / max(rolling mean, min_rpm)
//! - `torque_deviation`: (torque - rolling median) / max(rolling median, 0.5)
//! - `torque_spike`: torque above baseline + N rolling sigma
//! - `mwd_ssi`: clamp(PKtoPK / rolling RPM mean, 0, 2) / 2, forward-filled
//!   across short gaps between MWD transmissions

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::info;

use crate::types::Sample;

/// Minimum periods for the RPM and torque-sigma rolling windows.
const MIN_PERIODS_SHORT: usize = 5;
/// Minimum periods for the torque baseline rolling median.
const MIN_PERIODS_BASELINE: usize = 10;
/// Floor on the rolling window when sample spacing is known.
const MIN_WINDOW_SAMPLES: usize = 5;
/// Window used when sample spacing cannot be determined.
const FALLBACK_WINDOW_SAMPLES: usize = 15;
/// Floor on the torque baseline window.
const MIN_BASELINE_SAMPLES: usize = 30;
/// Torque baseline denominator floor (kN.m).
const MIN_TORQUE_BASELINE: f64 = 0.5;
/// Upper clamp on the MWD ratio before rescaling to [0, 1].
const MWD_RATIO_MAX: f64 = 2.0;

/// Tuning of the rolling indicator windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    /// Rolling window length (s)
    pub window_s: f64,
    /// Rows whose rolling RPM mean is below this are treated as not rotating
    pub min_rpm: f64,
    /// Maximum consecutive missing MWD readings bridged by forward fill
    pub mwd_forward_fill_samples: usize,
    /// Sigma multiplier for the torque spike flag
    pub torque_spike_sigma: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            window_s: 60.0,
            min_rpm: 15.0,
            mwd_forward_fill_samples: 8,
            torque_spike_sigma: 1.5,
        }
    }
}

/// Median spacing between consecutive rows (s), if there are at least two.
pub fn median_sample_interval(samples: &[Sample]) -> Option<f64> {
    let diffs: Vec<f64> = samples
        .windows(2)
        .map(|w| w[1].elapsed_s - w[0].elapsed_s)
        .filter(|d| d.is_finite())
        .collect();
    if diffs.is_empty() {
        return None;
    }
    Some(median(&diffs))
}

/// Convert a duration into a whole number of samples, never below `floor`.
///
/// Falls back to `fallback` when the sample spacing is unknown.
pub fn seconds_to_samples(samples: &[Sample], seconds: f64, floor: usize, fallback: usize) -> usize {
    match median_sample_interval(samples) {
        Some(dt) if dt > 0.0 => ((seconds / dt) as usize).max(floor),
        _ => fallback,
    }
}

/// Compute the three scorer indicators (and the torque spike flag) for every row.
///
/// Returns a new vector; the input is left untouched.
pub fn derive_indicators(samples: &[Sample], params: &IndicatorParams) -> Vec<Sample> {
    let n = samples.len();
    let mut out = samples.to_vec();
    if n == 0 {
        return out;
    }

    let dt = median_sample_interval(samples);
    let win = seconds_to_samples(samples, params.window_s, MIN_WINDOW_SAMPLES, FALLBACK_WINDOW_SAMPLES);
    let baseline_win = (win * 3).max(MIN_BASELINE_SAMPLES);

    let rpm: Vec<f64> = samples.iter().map(|s| s.rpm.unwrap_or(0.0)).collect();
    let torque: Vec<f64> = samples.iter().map(|s| s.torque_knm.unwrap_or(0.0)).collect();

    let rpm_mean = rolling(&rpm, win, MIN_PERIODS_SHORT, |w| w.mean());
    let rpm_std = rolling(&rpm, win, MIN_PERIODS_SHORT, |w| w.std_dev());
    let torque_baseline = rolling(&torque, baseline_win, MIN_PERIODS_BASELINE, median);
    let torque_std = rolling(&torque, win, MIN_PERIODS_SHORT, |w| w.std_dev());

    let has_mwd = samples.iter().any(|s| s.mwd_ss_pktopk.is_some());
    let mwd_ssi = if has_mwd {
        let ratio: Vec<Option<f64>> = samples
            .iter()
            .zip(&rpm_mean)
            .map(|(s, mean)| {
                let raw = s.mwd_ss_pktopk.unwrap_or(0.0);
                mean.map(|m| (raw / m.max(params.min_rpm)).clamp(0.0, MWD_RATIO_MAX) / MWD_RATIO_MAX)
            })
            .collect();
        forward_fill_nonzero(&ratio, params.mwd_forward_fill_samples)
    } else {
        vec![0.0; n]
    };

    let mut spikes = 0usize;
    let mut not_rotating = 0usize;

    for (i, row) in out.iter_mut().enumerate() {
        let std = rpm_std[i].unwrap_or(0.0);
        row.rpm_ssi = rpm_mean[i].map(|m| std / m.max(params.min_rpm));

        row.torque_deviation = torque_baseline[i]
            .map(|b| (torque[i] - b) / b.max(MIN_TORQUE_BASELINE));
        let spike = torque_baseline[i].is_some_and(|b| {
            torque[i] > b + params.torque_spike_sigma * torque_std[i].unwrap_or(0.0)
        });
        row.torque_spike = Some(spike);
        if spike {
            spikes += 1;
        }

        row.mwd_ssi = Some(mwd_ssi[i]);

        if rpm_mean[i].unwrap_or(0.0) < params.min_rpm {
            row.rpm_ssi = None;
            row.torque_deviation = None;
            row.mwd_ssi = None;
            row.not_rotating = true;
            not_rotating += 1;
        }
    }

    let mwd_coverage = out
        .iter()
        .filter(|s| s.mwd_ssi.is_some_and(|v| v > 0.0))
        .count() as f64
        / n as f64;

    info!(
        window = win,
        baseline_window = baseline_win,
        dt = dt.unwrap_or(f64::NAN),
        mwd_coverage_pct = format!("{:.1}", mwd_coverage * 100.0),
        torque_spike_pct = format!("{:.1}", spikes as f64 / n as f64 * 100.0),
        not_rotating,
        "Indicators derived"
    );

    out
}

// ============================================================================
// Rolling helpers
// ============================================================================

/// Trailing-window statistic; `None` until `min_periods` rows are available.
fn rolling<F>(values: &[f64], window: usize, min_periods: usize, stat: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if slice.len() < min_periods {
                None
            } else {
                let v = stat(slice);
                v.is_finite().then_some(v)
            }
        })
        .collect()
}

/// Bridge up to `limit` consecutive missing or zero readings with the last
/// non-zero value; anything beyond the limit becomes 0.
fn forward_fill_nonzero(values: &[Option<f64>], limit: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut last: Option<f64> = None;
    let mut gap = 0usize;

    for v in values {
        match v {
            Some(x) if *x != 0.0 && x.is_finite() => {
                last = Some(*x);
                gap = 0;
                out.push(*x);
            }
            _ => {
                gap += 1;
                match last {
                    Some(prev) if gap <= limit => out.push(prev),
                    _ => out.push(0.0),
                }
            }
        }
    }
    out
}

/// Median of a slice (non-destructive, clones and sorts).
pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_rows(n: usize, dt: f64, rpm: f64, torque: f64) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                elapsed_s: i as f64 * dt,
                rpm: Some(rpm),
                torque_knm: Some(torque),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn sample_interval_and_conversion() {
        let rows = steady_rows(10, 5.0, 100.0, 10.0);
        assert_eq!(median_sample_interval(&rows), Some(5.0));
        assert_eq!(seconds_to_samples(&rows, 20.0, 3, 5), 4);
        assert_eq!(seconds_to_samples(&rows, 5.0, 3, 5), 3);
        assert_eq!(seconds_to_samples(&rows[..1], 20.0, 3, 5), 5);
    }

    #[test]
    fn forward_fill_respects_limit() {
        let values = [Some(0.4), None, Some(0.0), None, Some(0.2), None];
        assert_eq!(forward_fill_nonzero(&values, 2), vec![0.4, 0.4, 0.4, 0.0, 0.2, 0.2]);
    }

    #[test]
    fn steady_drilling_has_no_deviation() {
        let rows = steady_rows(60, 5.0, 120.0, 12.0);
        let out = derive_indicators(&rows, &IndicatorParams::default());
        let last = out.last().unwrap();
        assert!(last.rpm_ssi.unwrap().abs() < 1e-12);
        assert!(last.torque_deviation.unwrap().abs() < 1e-12);
        assert_eq!(last.torque_spike, Some(false));
        // no MWD column at all: indicator is zero, not absent
        assert_eq!(last.mwd_ssi, Some(0.0));
    }

    #[test]
    fn warmup_rows_have_no_surface_indicators() {
        let rows = steady_rows(60, 5.0, 120.0, 12.0);
        let out = derive_indicators(&rows, &IndicatorParams::default());
        // fewer than 5 rows of history: rolling mean unavailable -> not rotating
        assert!(out[0].rpm_ssi.is_none());
        assert!(out[3].rpm_ssi.is_none());
        assert!(out[4].rpm_ssi.is_some());
        // torque baseline needs 10 rows
        assert!(out[8].torque_deviation.is_none());
        assert!(out[9].torque_deviation.is_some());
    }

    #[test]
    fn torque_step_raises_deviation_and_spike() {
        let mut rows = steady_rows(80, 5.0, 120.0, 10.0);
        for row in rows.iter_mut().skip(70) {
            row.torque_knm = Some(15.0);
        }
        let out = derive_indicators(&rows, &IndicatorParams::default());
        let dev = out[70].torque_deviation.unwrap();
        assert!((dev - 0.5).abs() < 1e-9, "deviation {dev}");
        assert_eq!(out[70].torque_spike, Some(true));
    }

    #[test]
    fn mwd_ratio_is_normalised_and_filled() {
        let mut rows = steady_rows(40, 5.0, 100.0, 10.0);
        rows[20].mwd_ss_pktopk = Some(100.0); // ratio 1.0 -> 0.5
        rows[30].mwd_ss_pktopk = Some(500.0); // ratio 5.0 -> clamped 2.0 -> 1.0
        let params = IndicatorParams {
            mwd_forward_fill_samples: 3,
            ..Default::default()
        };
        let out = derive_indicators(&rows, &params);
        assert!((out[20].mwd_ssi.unwrap() - 0.5).abs() < 1e-12);
        assert!((out[23].mwd_ssi.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(out[24].mwd_ssi, Some(0.0));
        assert!((out[30].mwd_ssi.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn low_rpm_rows_are_cleared() {
        let rows = steady_rows(30, 5.0, 5.0, 10.0);
        let out = derive_indicators(&rows, &IndicatorParams::default());
        assert!(out.iter().all(|s| s.rpm_ssi.is_none() && s.mwd_ssi.is_none()));
        assert!(out.iter().all(|s| s.not_rotating));

        let rotating = derive_indicators(&steady_rows(30, 5.0, 120.0, 10.0), &IndicatorParams::default());
        assert!(rotating[..4].iter().all(|s| s.not_rotating));
        assert!(rotating[4..].iter().all(|s| !s.not_rotating));
    }
}
