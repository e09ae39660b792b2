//! Event segmentation over a severity sequence.
//!
//! A sample is *sustained* when every raw flag in the trailing window of
//! `min_sustain_samples` ending at it is set. A maximal run of sustained
//! samples is one event; events are numbered from 1 in order of appearance.

use crate::types::ConfigurationError;

/// Sustained flags and event ids for one severity sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub sustained: Vec<bool>,
    pub event_ids: Vec<u32>,
}

impl Segmentation {
    /// Number of events found.
    pub fn event_count(&self) -> u32 {
        self.event_ids.iter().copied().max().unwrap_or(0)
    }

    /// Fraction of samples flagged as sustained.
    pub fn flagged_fraction(&self) -> f64 {
        if self.sustained.is_empty() {
            return 0.0;
        }
        self.sustained.iter().filter(|&&s| s).count() as f64 / self.sustained.len() as f64
    }
}

/// Segment `severities` into sustained runs.
///
/// Runs in O(n): a running count of consecutive raw flags replaces the
/// trailing-window minimum.
pub fn segment(
    severities: &[f64],
    threshold: f64,
    min_sustain_samples: usize,
) -> Result<Segmentation, ConfigurationError> {
    if min_sustain_samples < 1 {
        return Err(ConfigurationError::InvalidSustainWindow(min_sustain_samples));
    }

    let mut sustained = Vec::with_capacity(severities.len());
    let mut event_ids = Vec::with_capacity(severities.len());

    let mut run = 0usize;
    let mut next_id = 0u32;
    let mut in_event = false;

    for &s in severities {
        // NaN compares false, so a missing score never extends a run
        if s >= threshold {
            run += 1;
        } else {
            run = 0;
        }

        let is_sustained = run >= min_sustain_samples;
        if is_sustained {
            if !in_event {
                next_id += 1;
                in_event = true;
            }
            event_ids.push(next_id);
        } else {
            in_event = false;
            event_ids.push(0);
        }
        sustained.push(is_sustained);
    }

    Ok(Segmentation {
        sustained,
        event_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags_to_severities(flags: &[bool]) -> Vec<f64> {
        flags.iter().map(|&f| if f { 0.9 } else { 0.1 }).collect()
    }

    #[test]
    fn three_sample_window_confirms_on_third() {
        let sev = flags_to_severities(&[false, true, true, true, false]);
        let seg = segment(&sev, 0.25, 3).unwrap();
        assert_eq!(seg.sustained, vec![false, false, false, true, false]);
        assert_eq!(seg.event_ids, vec![0, 0, 0, 1, 0]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let seg = segment(&[], 0.25, 3).unwrap();
        assert!(seg.sustained.is_empty());
        assert!(seg.event_ids.is_empty());
        assert_eq!(seg.event_count(), 0);
        assert_eq!(seg.flagged_fraction(), 0.0);
    }

    #[test]
    fn window_of_one_matches_raw_flags() {
        let sev = [0.1, 0.3, 0.24, 0.25, 0.9, 0.0];
        let seg = segment(&sev, 0.25, 1).unwrap();
        let raw: Vec<bool> = sev.iter().map(|&s| s >= 0.25).collect();
        assert_eq!(seg.sustained, raw);
        assert_eq!(seg.event_ids, vec![0, 1, 0, 2, 2, 0]);
    }

    #[test]
    fn leading_samples_never_sustained() {
        let sev = vec![1.0; 4];
        let seg = segment(&sev, 0.5, 4).unwrap();
        assert_eq!(seg.sustained, vec![false, false, false, true]);
    }

    #[test]
    fn separate_runs_get_increasing_ids() {
        let sev = flags_to_severities(&[
            true, true, false, true, true, true, false, false, true, true,
        ]);
        let seg = segment(&sev, 0.5, 2).unwrap();
        assert_eq!(seg.event_ids, vec![0, 1, 0, 0, 2, 2, 0, 0, 0, 3]);
        assert_eq!(seg.event_count(), 3);
        assert!((seg.flagged_fraction() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn ids_zero_where_not_sustained_and_step_by_one() {
        let sev: Vec<f64> = (0..200)
            .map(|i| ((i as f64) * 0.37).sin().abs())
            .collect();
        let seg = segment(&sev, 0.6, 3).unwrap();

        let mut last_id = 0;
        for i in 0..sev.len() {
            if !seg.sustained[i] {
                assert_eq!(seg.event_ids[i], 0);
                continue;
            }
            let rising = i == 0 || !seg.sustained[i - 1];
            if rising {
                assert_eq!(seg.event_ids[i], last_id + 1);
                last_id = seg.event_ids[i];
            } else {
                assert_eq!(seg.event_ids[i], last_id);
            }
        }
    }

    #[test]
    fn nan_breaks_run() {
        let sev = [0.9, 0.9, f64::NAN, 0.9, 0.9];
        let seg = segment(&sev, 0.5, 2).unwrap();
        assert_eq!(seg.sustained, vec![false, true, false, false, true]);
        assert_eq!(seg.event_ids, vec![0, 1, 0, 0, 2]);
    }

    #[test]
    fn zero_window_rejected() {
        assert_eq!(
            segment(&[0.5], 0.25, 0),
            Err(ConfigurationError::InvalidSustainWindow(0))
        );
    }
}
