//! Config Validation Tests
//!
//! Typo detection, range validation and the seconds-to-samples conversions,
//! exercised through the public config API.

use tvm_replay::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use tvm_replay::config::{ConfigError, ReplayConfig};
use tvm_replay::controller::Nominals;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_controller_key_warns_with_suggestion() {
    let toml_str = r#"
[controller]
holdof_s = 30.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "controller.holdof_s");
    assert_eq!(warnings[0].suggestion.as_deref(), Some("controller.holdoff_s"));
}

#[test]
fn typo_in_well_section_warns() {
    let toml_str = r#"
[well]
naem = "Test-Well"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    // "naem" is distance 2 from "name"
    assert_eq!(warnings[0].suggestion.as_deref(), Some("well.name"));
}

#[test]
fn full_valid_config_produces_zero_warnings() {
    let toml_str = r#"
[well]
name = "15/9-F-9 A"
field = "Volve"
section = "12.25 in"

[signals]
window_s = 60.0
min_rpm = 15.0
mwd_forward_fill_samples = 8
torque_spike_sigma = 1.5

[detection]
threshold = 0.25
min_duration_s = 20.0
min_sustain_samples = 4

[detection.weights]
mwd = 0.6
torque = 0.3
rpm = 0.1

[controller]
engage_threshold = 0.30
recovery_threshold = 0.20
holdoff_s = 25.0
kp_actuator_a = 0.30
actuator_a_floor_fraction = 0.35
kp_actuator_b = 0.15
actuator_b_max_delta = 25.0
nominal_a = 12.0
nominal_b = 140.0

[playback]
tick_interval_ms = 16
slow_interval_ms = 66
speed = 1
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");

    let config = ReplayConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.detection.min_sustain_samples, Some(4));
    assert_eq!(config.controller.nominal_b, Some(140.0));
}

#[test]
fn every_known_key_is_dotted_under_a_known_section() {
    let keys = known_config_keys();
    for key in &keys {
        if let Some((parent, _)) = key.rsplit_once('.') {
            assert!(keys.contains(parent), "{key} has unknown parent {parent}");
        }
    }
}

#[test]
fn garbage_key_gets_no_suggestion() {
    assert!(suggest_correction("zzzzzzzzzzzzzzzz", &known_config_keys()).is_none());
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn inverted_thresholds_fail_validation() {
    let toml_str = r#"
[controller]
engage_threshold = 0.2
recovery_threshold = 0.4
"#;
    let err = ReplayConfig::from_toml_str(toml_str).unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.contains("recovery_threshold")), "{errors:?}");
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn all_problems_are_collected() {
    let toml_str = r#"
[detection]
threshold = 2.0

[detection.weights]
mwd = 0.0
torque = 0.0
rpm = 0.0

[playback]
speed = 0
"#;
    match ReplayConfig::from_toml_str(toml_str).unwrap_err() {
        ConfigError::Validation(errors) => assert!(errors.len() >= 3, "{errors:?}"),
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn impossible_nominal_rpm_is_an_error() {
    let mut config = ReplayConfig::default();
    config.controller.nominal_b = Some(900.0);
    let (errors, _) = validate_physical_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("nominal_b")));
    assert!(config.validate().is_err());
}

#[test]
fn high_engage_threshold_only_warns() {
    let mut config = ReplayConfig::default();
    config.controller.engage_threshold = 0.8;
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.field == "controller.engage_threshold"));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = ReplayConfig::from_toml_str("[detection\nthreshold = ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReplayConfig::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn config_round_trips_through_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replay_config.toml");
    let mut config = ReplayConfig::default();
    config.well.name = "Test-1".to_string();
    config.detection.threshold = 0.3;
    std::fs::write(&path, config.to_toml().unwrap()).unwrap();

    let loaded = ReplayConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.well.name, "Test-1");
    assert_eq!(loaded.detection.threshold, 0.3);
}

// ============================================================================
// Seconds to samples
// ============================================================================

#[test]
fn durations_convert_with_sample_spacing() {
    let config = ReplayConfig::default();

    // 20 s sustain at 5 s spacing -> 4 samples; 25 s holdoff -> 5 samples
    let d = config.detection_params(Some(5.0));
    assert_eq!(d.min_sustain_samples, 4);
    let c = config.controller_params(Some(5.0), Nominals { a: 10.0, b: 120.0 });
    assert_eq!(c.holdoff_samples, 5);

    // sustain never drops below 3 samples
    assert_eq!(config.detection_params(Some(30.0)).min_sustain_samples, 3);
    // holdoff rounds up
    assert_eq!(config.controller_params(Some(10.0), Nominals { a: 10.0, b: 120.0 }).holdoff_samples, 3);
}

#[test]
fn explicit_sustain_samples_win() {
    let mut config = ReplayConfig::default();
    config.detection.min_sustain_samples = Some(7);
    assert_eq!(config.detection_params(Some(1.0)).min_sustain_samples, 7);
}
