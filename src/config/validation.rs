//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use crate::types::SEVERITY_MODERATE;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for ReplayConfig.
///
/// Maintained by hand to match the struct hierarchy in replay_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [well]
        "well",
        "well.name",
        "well.field",
        "well.section",
        // [signals]
        "signals",
        "signals.window_s",
        "signals.min_rpm",
        "signals.mwd_forward_fill_samples",
        "signals.torque_spike_sigma",
        // [detection]
        "detection",
        "detection.threshold",
        "detection.min_duration_s",
        "detection.min_sustain_samples",
        "detection.weights",
        "detection.weights.mwd",
        "detection.weights.torque",
        "detection.weights.rpm",
        // [controller]
        "controller",
        "controller.engage_threshold",
        "controller.recovery_threshold",
        "controller.holdoff_s",
        "controller.kp_actuator_a",
        "controller.actuator_a_floor_fraction",
        "controller.kp_actuator_b",
        "controller.actuator_b_max_delta",
        "controller.nominal_a",
        "controller.nominal_b",
        // [playback]
        "playback",
        "playback.tick_interval_ms",
        "playback.slow_interval_ms",
        "playback.speed",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties go to the lexicographically smaller key so the suggestion is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(d, _)| *d <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails: parse errors are reported later by serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed ReplayConfig.
///
/// Returns (errors, warnings): errors are impossible values that must stop
/// the run; warnings are suspicious but allowed.
pub fn validate_physical_ranges(
    config: &super::ReplayConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let c = &config.controller;

    // Nominal WOB: no rig puts 100 t on a bit
    if let Some(a) = c.nominal_a {
        if a > 100.0 {
            errors.push(format!(
                "controller.nominal_a = {a:.1} is outside physical range (0-100 kkgf)"
            ));
        }
    }
    // Nominal RPM: top drives top out well below 400 rpm
    if let Some(b) = c.nominal_b {
        if b > 400.0 {
            errors.push(format!(
                "controller.nominal_b = {b:.1} is outside physical range (0-400 rpm)"
            ));
        }
    }

    if c.engage_threshold > SEVERITY_MODERATE {
        warnings.push(ValidationWarning {
            field: "controller.engage_threshold".to_string(),
            message: format!(
                "engage_threshold = {:.2} only engages on SEVERE stick-slip",
                c.engage_threshold
            ),
            suggestion: None,
        });
    }

    let s = &config.signals;
    if s.window_s < 10.0 || s.window_s > 600.0 {
        warnings.push(ValidationWarning {
            field: "signals.window_s".to_string(),
            message: format!(
                "window_s = {:.0} is outside typical range (10-600 s)",
                s.window_s
            ),
            suggestion: None,
        });
    }
    if s.min_rpm > 200.0 {
        errors.push(format!(
            "signals.min_rpm = {:.0} would mark all drilling as not rotating",
            s.min_rpm
        ));
    }

    let p = &config.playback;
    if p.slow_interval_ms < p.tick_interval_ms {
        warnings.push(ValidationWarning {
            field: "playback.slow_interval_ms".to_string(),
            message: format!(
                "slow_interval_ms ({}) is shorter than tick_interval_ms ({}); every tick will emit a frame",
                p.slow_interval_ms, p.tick_interval_ms
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
