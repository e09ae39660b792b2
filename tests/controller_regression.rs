//! Controller Regression Tests
//!
//! Runs the auto-driller over scripted severity sequences and checks the
//! state trajectory, setpoint bounds and the transitions that must never
//! happen.

use tvm_replay::controller::{estimate_nominals, run_controller, ControllerMachine};
use tvm_replay::types::{
    ConfigurationError, ControlAction, ControllerOutput, ControllerParams, ControllerState,
    ProcessedSample, Sample, SeverityLabel,
};

use ControllerState::{Detecting, Mitigating, Normal, Recovering};

fn processed(severities: &[f64]) -> Vec<ProcessedSample> {
    severities
        .iter()
        .enumerate()
        .map(|(i, &s)| ProcessedSample {
            sample: Sample {
                elapsed_s: i as f64 * 5.0,
                wob_kkgf: Some(12.0),
                rpm: Some(140.0),
                ..Default::default()
            },
            severity: s,
            sustained: false,
            event_id: 0,
            severity_label: SeverityLabel::from_severity(s),
        })
        .collect()
}

fn params() -> ControllerParams {
    ControllerParams {
        engage_threshold: 0.25,
        recovery_threshold: 0.20,
        holdoff_samples: 2,
        nominal_a: 100.0,
        nominal_b: 120.0,
        ..ControllerParams::default()
    }
}

fn states(outputs: &[ControllerOutput]) -> Vec<ControllerState> {
    outputs.iter().map(|o| o.state).collect()
}

#[test]
fn holdoff_then_mitigation() {
    let out = run_controller(&processed(&[0.1, 0.3, 0.3, 0.3]), &params()).unwrap();
    assert_eq!(states(&out), vec![Normal, Detecting, Detecting, Mitigating]);
    assert_eq!(out[1].action, ControlAction::EventDetected);
    assert_eq!(out[3].action, ControlAction::MitigationEngaged);
}

#[test]
fn proportional_wob_reduction() {
    // excess = 0.55 - 0.25 = 0.30 -> A = 100 - 0.3 * 0.30 * 100 = 91
    let out = run_controller(&processed(&[0.1, 0.3, 0.3, 0.3, 0.55]), &params()).unwrap();
    assert_eq!(out[4].state, Mitigating);
    assert!((out[4].setpoint_a - 91.0).abs() < 1e-9, "A = {}", out[4].setpoint_a);
    assert!(out[4].setpoint_b > 120.0);
}

#[test]
fn full_cycle_returns_to_normal() {
    let mut sev = vec![0.1, 0.6, 0.6, 0.6, 0.6, 0.6, 0.1];
    sev.extend(std::iter::repeat(0.1).take(40));
    let out = run_controller(&processed(&sev), &params()).unwrap();
    let s = states(&out);

    assert_eq!(&s[..4], &[Normal, Detecting, Detecting, Mitigating]);
    assert_eq!(s[6], Recovering);
    assert_eq!(*s.last().unwrap(), Normal);
    let back = out.iter().position(|o| o.action == ControlAction::FullyRecovered).unwrap();
    assert!(back > 6);
    assert_eq!(out[back].setpoint_a, 100.0);
    assert_eq!(out[back].setpoint_b, 120.0);
}

#[test]
fn recovery_holds_setpoints_for_twelve_samples() {
    // N, D, D, M (engaged), M (actuate), R at index 5
    let mut sev = vec![0.1, 0.6, 0.6, 0.6, 0.6, 0.1];
    sev.extend(std::iter::repeat(0.1).take(20));
    let out = run_controller(&processed(&sev), &params()).unwrap();

    // last actuating sample: excess 0.35 -> A 89.5, B 120.525
    assert_eq!(out[4].action, ControlAction::Actuate);
    assert!((out[4].setpoint_a - 89.5).abs() < 1e-9);
    assert!((out[4].setpoint_b - 120.525).abs() < 1e-9);

    let entry = 5;
    assert_eq!(out[entry].state, Recovering);
    assert_eq!(out[entry].action, ControlAction::RecoveryPhase);
    let held_a = out[entry].setpoint_a;
    let held_b = out[entry].setpoint_b;

    for o in &out[entry + 1..entry + 12] {
        assert_eq!(o.state, Recovering);
        assert_eq!(o.action, ControlAction::Hold);
        assert_eq!(o.setpoint_a, held_a);
        assert_eq!(o.setpoint_b, held_b);
    }

    // the twelfth sample after entry is the first ramp step
    assert_eq!(out[entry + 12].action, ControlAction::FullyRecovered);
    assert_eq!(out[entry + 12].state, Normal);
    assert_eq!(out[entry + 12].setpoint_b, 120.0);
}

#[test]
fn relapse_during_recovery_hold_reengages() {
    let mut sev = vec![0.1, 0.6, 0.6, 0.6, 0.6, 0.1];
    sev.extend([0.1, 0.1, 0.1, 0.7, 0.7]);
    let out = run_controller(&processed(&sev), &params()).unwrap();

    assert_eq!(out[5].state, Recovering);
    assert_eq!(out[9].state, Mitigating);
    assert_eq!(out[9].action, ControlAction::Relapse);
    // outputs held on the relapse sample, proportional law resumes after
    assert_eq!(out[9].setpoint_b, out[8].setpoint_b);
    assert!(out[10].setpoint_b > 120.0);
    assert!(out[10].setpoint_a < 100.0);
}

#[test]
fn transient_spike_never_actuates() {
    let out = run_controller(&processed(&[0.1, 0.4, 0.1, 0.4, 0.1]), &params()).unwrap();
    assert!(out.iter().all(|o| o.state != Mitigating));
    assert!(out.iter().all(|o| o.setpoint_a == 100.0 && o.setpoint_b == 120.0));
}

#[test]
fn setpoints_respect_floor_and_ceiling() {
    let sev: Vec<f64> = (0..200).map(|i| if i % 37 < 30 { 1.0 } else { 0.05 }).collect();
    let p = params();
    let out = run_controller(&processed(&sev), &p).unwrap();
    for o in &out {
        assert!(o.setpoint_a >= p.nominal_a * p.actuator_a_floor_fraction - 1e-9);
        assert!(o.setpoint_a <= p.nominal_a + 1e-9);
        assert!(o.setpoint_b >= p.nominal_b - 1e-9);
        assert!(o.setpoint_b <= p.nominal_b + p.actuator_b_max_delta + 1e-9);
    }
}

#[test]
fn mitigating_never_jumps_back_to_detecting() {
    let sev: Vec<f64> = (0..500).map(|i| ((i * 7919) % 100) as f64 / 100.0).collect();
    let out = run_controller(&processed(&sev), &params()).unwrap();
    for w in out.windows(2) {
        assert!(
            !(w[0].state == Mitigating && w[1].state == Detecting),
            "MITIGATING -> DETECTING is not a transition"
        );
        assert!(
            !(w[0].state == Normal && w[1].state == Mitigating),
            "NORMAL -> MITIGATING skipped the holdoff"
        );
    }
}

#[test]
fn pass_is_reentrant() {
    let sev: Vec<f64> = (0..300).map(|i| (f64::from(i) * 0.1).sin().abs()).collect();
    let data = processed(&sev);
    let a = run_controller(&data, &params()).unwrap();
    let b = run_controller(&data, &params()).unwrap();
    assert_eq!(a, b);

    let mut machine = ControllerMachine::new(params()).unwrap();
    let stepped: Vec<ControllerOutput> =
        sev.iter().enumerate().map(|(i, &s)| machine.step(i, s)).collect();
    assert_eq!(stepped, a);
}

#[test]
fn inverted_thresholds_rejected() {
    let p = ControllerParams {
        engage_threshold: 0.2,
        recovery_threshold: 0.3,
        ..params()
    };
    assert!(matches!(
        run_controller(&processed(&[0.5]), &p),
        Err(ConfigurationError::InvertedThresholds { .. })
    ));
}

#[test]
fn nominals_from_stable_lead_in() {
    let data = processed(&[0.05; 40]);
    let n = estimate_nominals(&data, 0.30);
    assert_eq!(n.a, 12.0);
    assert_eq!(n.b, 140.0);
}
