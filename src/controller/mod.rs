//! Auto-Driller Controller
//!
//! Runs the four-state [`ControllerMachine`] over a processed sequence and
//! produces one [`ControllerOutput`] per row.
//!
//! ## Usage
//!
//! ```ignore
//! let nominals = controller::estimate_nominals(&processed, params.engage_threshold);
//! let outputs = controller::run_controller(&processed, &params)?;
//! ```

mod machine;

pub use machine::ControllerMachine;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::defaults::{NOMINAL_MIN_ROWS, NOMINAL_RPM_FLOOR, NOMINAL_WINDOW_S, NOMINAL_WOB_FLOOR};
use crate::detection::indicators::median;
use crate::types::{ConfigurationError, ControllerOutput, ControllerParams, ControllerState, ProcessedSample};

/// Run the controller over `processed`, starting from NORMAL at index 0.
///
/// Parameters are validated first; on error nothing is produced.
pub fn run_controller(
    processed: &[ProcessedSample],
    params: &ControllerParams,
) -> Result<Vec<ControllerOutput>, ConfigurationError> {
    let mut machine = ControllerMachine::new(*params)?;

    let outputs: Vec<ControllerOutput> = processed
        .iter()
        .enumerate()
        .map(|(i, p)| machine.step(i, p.severity))
        .collect();

    let mut distribution: HashMap<ControllerState, usize> = HashMap::new();
    for o in &outputs {
        *distribution.entry(o.state).or_insert(0) += 1;
    }
    let count = |s| distribution.get(&s).copied().unwrap_or(0);
    info!(
        normal = count(ControllerState::Normal),
        detecting = count(ControllerState::Detecting),
        mitigating = count(ControllerState::Mitigating),
        recovering = count(ControllerState::Recovering),
        "Controller state distribution"
    );

    Ok(outputs)
}

/// Undisturbed actuator setpoints derived from the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nominals {
    /// Weight on bit (kkgf)
    pub a: f64,
    /// Rotary speed (rpm)
    pub b: f64,
}

/// Estimate nominal WOB / RPM from the leading stable span of the dataset.
///
/// Uses medians over the first 300 s of rotating rows below `engage_threshold`
/// when there are at least 10 of them, otherwise medians over the whole dataset.
/// Results are floored at 2.0 kkgf and 30 rpm.
pub fn estimate_nominals(processed: &[ProcessedSample], engage_threshold: f64) -> Nominals {
    let t0 = processed.first().map_or(0.0, ProcessedSample::elapsed_s);

    let stable_early: Vec<&ProcessedSample> = processed
        .iter()
        .take_while(|p| p.elapsed_s() <= t0 + NOMINAL_WINDOW_S)
        .filter(|p| !p.sample.not_rotating && p.severity < engage_threshold)
        .collect();

    let pool: Vec<&ProcessedSample> = if stable_early.len() >= NOMINAL_MIN_ROWS {
        stable_early
    } else {
        processed.iter().collect()
    };

    let median_of = |f: fn(&ProcessedSample) -> Option<f64>| {
        let values: Vec<f64> = pool.iter().filter_map(|p| f(p)).filter(|v| v.is_finite()).collect();
        (!values.is_empty()).then(|| median(&values))
    };

    let a = median_of(|p| p.sample.wob_kkgf).map_or(NOMINAL_WOB_FLOOR, |v| v.max(NOMINAL_WOB_FLOOR));
    let b = median_of(|p| p.sample.rpm).map_or(NOMINAL_RPM_FLOOR, |v| v.max(NOMINAL_RPM_FLOOR));

    info!(wob = format!("{a:.2}"), rpm = format!("{b:.1}"), "Auto-driller nominals");
    Nominals { a, b }
}
