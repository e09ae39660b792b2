//! Event Summaries and MWD Cross-Validation
//!
//! Condenses each segmented event into one row for reporting, and scores the
//! surface-derived severity against the downhole MWD stick-slip measurement.
//!
//! ## Validation metrics
//! - Pearson r between severity and normalised MWD PKtoPK, with a two-tailed
//!   p-value from Student's t-distribution (statrs)
//! - Precision / recall / F1 of the sustained flag against MWD-positive rows
//!
//! ## Torsional frequency
//! Dominant oscillation frequency of surface torque over the first 300 s of
//! the most severe event, from a rustfft spectrum.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{info, warn};

use crate::types::{ControllerOutput, ProcessedSample, SeverityLabel};

/// PKtoPK (rpm) mapped to 1.0 when normalising the MWD channel.
pub const MWD_MAX_PKTOPK: f64 = 400.0;
/// Normalised MWD level at or above which a row counts as MWD-positive.
pub const MWD_POSITIVE_LEVEL: f64 = 0.1;

// ============================================================================
// Event Summaries
// ============================================================================

/// One contiguous event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: u32,
    pub start_elapsed_s: f64,
    pub end_elapsed_s: f64,
    pub duration_s: f64,
    pub samples: usize,
    /// Mean bit depth over the event (m)
    pub depth_m: Option<f64>,
    pub peak_severity: f64,
    pub mean_severity: f64,
    /// Label of the peak-severity sample
    pub severity: SeverityLabel,
    pub mean_wob_kkgf: Option<f64>,
    pub mean_rpm: Option<f64>,
    pub peak_mwd_pktopk: Option<f64>,
    /// Mean recorded WOB minus mean controller A setpoint (kkgf)
    pub wob_reduction_kkgf: Option<f64>,
}

/// Summarise every event in `processed`.
///
/// `outputs`, when given, must be index-aligned with `processed`; it adds
/// the WOB reduction column.
pub fn summarize_events(
    processed: &[ProcessedSample],
    outputs: Option<&[ControllerOutput]>,
) -> Vec<EventSummary> {
    let outputs = outputs.filter(|o| o.len() == processed.len());

    let mut summaries = Vec::new();
    let mut start = 0usize;
    while start < processed.len() {
        let id = processed[start].event_id;
        if id == 0 {
            start += 1;
            continue;
        }
        let mut end = start;
        while end + 1 < processed.len() && processed[end + 1].event_id == id {
            end += 1;
        }
        summaries.push(summarize_range(processed, outputs, start, end));
        start = end + 1;
    }
    summaries
}

fn summarize_range(
    processed: &[ProcessedSample],
    outputs: Option<&[ControllerOutput]>,
    start: usize,
    end: usize,
) -> EventSummary {
    let seg = &processed[start..=end];

    let (peak_idx, peak) = seg
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |(bi, bv), (i, p)| {
            if p.severity > bv { (i, p.severity) } else { (bi, bv) }
        });
    let mean_severity = seg.iter().map(|p| p.severity).sum::<f64>() / seg.len() as f64;

    let mean_wob = mean_of(seg.iter().map(|p| p.sample.wob_kkgf));
    let wob_reduction = outputs.and_then(|o| {
        let setpoint = mean_of(o[start..=end].iter().map(|c| Some(c.setpoint_a)))?;
        Some(mean_wob? - setpoint)
    });

    EventSummary {
        event_id: seg[0].event_id,
        start_elapsed_s: seg[0].elapsed_s(),
        end_elapsed_s: seg[seg.len() - 1].elapsed_s(),
        duration_s: seg[seg.len() - 1].elapsed_s() - seg[0].elapsed_s(),
        samples: seg.len(),
        depth_m: mean_of(seg.iter().map(|p| p.sample.bit_depth_m)),
        peak_severity: peak,
        mean_severity,
        severity: seg[peak_idx].severity_label,
        mean_wob_kkgf: mean_wob,
        mean_rpm: mean_of(seg.iter().map(|p| p.sample.rpm)),
        peak_mwd_pktopk: seg
            .iter()
            .filter_map(|p| p.sample.mwd_ss_pktopk)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))),
        wob_reduction_kkgf: wob_reduction,
    }
}

/// Mean of the present values, `None` if there are none.
fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

// ============================================================================
// MWD Validation
// ============================================================================

/// Agreement between surface severity and downhole MWD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MwdValidation {
    pub pearson_r: f64,
    pub p_value: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub n_samples: usize,
    pub mwd_mean_pktopk_rpm: f64,
    pub mwd_max_pktopk_rpm: f64,
}

/// Compare severity and the sustained flag against rotating rows with MWD readings.
///
/// Returns `None` when no such row exists.
pub fn validate_against_mwd(processed: &[ProcessedSample]) -> Option<MwdValidation> {
    let rows: Vec<(&ProcessedSample, f64)> = processed
        .iter()
        .filter(|p| !p.sample.not_rotating)
        .filter_map(|p| p.sample.mwd_ss_pktopk.filter(|v| v.is_finite()).map(|v| (p, v)))
        .collect();

    if rows.is_empty() {
        warn!("No overlapping severity and MWD data");
        return None;
    }

    let severity: Vec<f64> = rows.iter().map(|(p, _)| p.severity).collect();
    let mwd_norm: Vec<f64> = rows
        .iter()
        .map(|(_, v)| (v / MWD_MAX_PKTOPK).clamp(0.0, 1.0))
        .collect();

    let pearson_r = pearson(&severity, &mwd_norm);
    let p_value = p_value_for_r(pearson_r, rows.len());

    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for ((p, _), &m) in rows.iter().zip(&mwd_norm) {
        let mwd_positive = m >= MWD_POSITIVE_LEVEL;
        match (p.sustained, mwd_positive) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let pktopk = rows.iter().map(|(_, v)| *v);
    let validation = MwdValidation {
        pearson_r,
        p_value,
        precision,
        recall,
        f1,
        n_samples: rows.len(),
        mwd_mean_pktopk_rpm: pktopk.clone().sum::<f64>() / rows.len() as f64,
        mwd_max_pktopk_rpm: pktopk.fold(f64::MIN, f64::max),
    };

    info!(
        r = format!("{:.3}", validation.pearson_r),
        precision = format!("{:.2}", validation.precision),
        recall = format!("{:.2}", validation.recall),
        f1 = format!("{:.2}", validation.f1),
        n = validation.n_samples,
        "MWD validation"
    );

    Some(validation)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Pearson correlation coefficient; 0 when either series is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len()) as f64;
    if n < 2.0 {
        return 0.0;
    }
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();
    let sum_y2: f64 = y.iter().map(|a| a * a).sum();

    let numerator = n * sum_xy - sum_x * sum_y;
    let denominator = ((n * sum_x2 - sum_x.powi(2)) * (n * sum_y2 - sum_y.powi(2))).sqrt();

    if denominator == 0.0 || !denominator.is_finite() {
        0.0
    } else {
        (numerator / denominator).clamp(-1.0, 1.0)
    }
}

/// Two-tailed p-value for `r` over `n` pairs (t with n-2 degrees of freedom).
pub fn p_value_for_r(r: f64, n: usize) -> f64 {
    if n < 3 {
        return 1.0;
    }
    if r.abs() >= 0.9999 {
        return 0.0;
    }

    let df = (n - 2) as f64;
    let t_stat = r * df.sqrt() / (1.0 - r * r).sqrt();

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => 2.0 * (1.0 - t_dist.cdf(t_stat.abs())),
        Err(_) => 1.0,
    }
}

// ============================================================================
// Torsional Frequency
// ============================================================================

/// Torque span analysed from the start of the worst event (s).
pub const TORSIONAL_SEGMENT_S: f64 = 300.0;
/// Fewest torque readings worth transforming.
pub const TORSIONAL_MIN_POINTS: usize = 16;
/// Open band searched for the spectral peak (Hz).
const TORSIONAL_BAND_HZ: (f64, f64) = (0.005, 0.5);

/// Dominant torsional oscillation of the most severe event.
///
/// All zero when there is no event or too little torque to transform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TorsionalFrequency {
    pub dominant_freq_hz: f64,
    pub period_s: f64,
    pub oscillations_per_minute: f64,
}

/// Estimate the torsional frequency from surface torque.
///
/// Picks the event with the highest peak severity (first on ties), takes
/// torque from its first row through `TORSIONAL_SEGMENT_S` later, removes the
/// mean and returns the strongest bin strictly inside 0.005-0.5 Hz.
/// `sample_interval_s` is the median row spacing of the whole dataset.
pub fn compute_torsional_frequency(
    processed: &[ProcessedSample],
    sample_interval_s: Option<f64>,
) -> TorsionalFrequency {
    let Some(dt) = sample_interval_s.filter(|d| d.is_finite() && *d > 0.0) else {
        return TorsionalFrequency::default();
    };

    let mut worst: Option<(u32, f64)> = None;
    for p in processed.iter().filter(|p| p.event_id > 0) {
        if worst.map_or(true, |(_, peak)| p.severity > peak) {
            worst = Some((p.event_id, p.severity));
        }
    }
    let Some((event_id, _)) = worst else {
        return TorsionalFrequency::default();
    };
    let Some(t_start) = processed
        .iter()
        .find(|p| p.event_id == event_id)
        .map(ProcessedSample::elapsed_s)
    else {
        return TorsionalFrequency::default();
    };

    let torque: Vec<f64> = processed
        .iter()
        .filter(|p| (t_start..=t_start + TORSIONAL_SEGMENT_S).contains(&p.elapsed_s()))
        .filter_map(|p| p.sample.torque_knm)
        .filter(|v| v.is_finite())
        .collect();
    if torque.len() < TORSIONAL_MIN_POINTS {
        return TorsionalFrequency::default();
    }

    let n = torque.len();
    let mean = torque.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<Complex<f64>> = torque.iter().map(|&x| Complex::new(x - mean, 0.0)).collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buffer);

    // Positive half of the spectrum, as a real FFT would return it
    let resolution = 1.0 / (n as f64 * dt);
    let peak = buffer
        .iter()
        .take(n / 2 + 1)
        .enumerate()
        .map(|(k, c)| (k as f64 * resolution, c.norm()))
        .filter(|(f, _)| *f > TORSIONAL_BAND_HZ.0 && *f < TORSIONAL_BAND_HZ.1)
        .fold(None, |best: Option<(f64, f64)>, (f, m)| match best {
            Some((_, bm)) if bm >= m => best,
            _ => Some((f, m)),
        });
    let Some((freq, _)) = peak else {
        return TorsionalFrequency::default();
    };

    let result = TorsionalFrequency {
        dominant_freq_hz: round_to(freq, 5),
        period_s: round_to(1.0 / freq, 1),
        oscillations_per_minute: round_to(freq * 60.0, 2),
    };
    info!(
        event_id,
        freq_hz = result.dominant_freq_hz,
        period_s = result.period_s,
        points = n,
        "Torsional FFT"
    );
    result
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
