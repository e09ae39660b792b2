//! Four-state auto-driller.
//!
//! NORMAL -> DETECTING -> MITIGATING -> RECOVERING -> NORMAL, driven by one
//! severity value per sample. Actuator A (WOB) is reduced and actuator B
//! (RPM) raised in proportion to how far severity exceeds the engage
//! threshold; both ramp back to nominal after the event clears.

use crate::config::defaults::{
    ACTUATOR_B_EXCESS_SCALE, RAMP_A_FRACTION, RAMP_B_STEP, RECOVERED_FRACTION,
    RECOVERY_HOLD_SAMPLES,
};
use crate::types::{ConfigurationError, ControlAction, ControllerOutput, ControllerParams, ControllerState};

/// Controller memory, one variant per state with the index it was entered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Normal,
    Detecting { since: usize },
    Mitigating,
    Recovering { since: usize },
}

impl Phase {
    const fn state(self) -> ControllerState {
        match self {
            Self::Normal => ControllerState::Normal,
            Self::Detecting { .. } => ControllerState::Detecting,
            Self::Mitigating => ControllerState::Mitigating,
            Self::Recovering { .. } => ControllerState::Recovering,
        }
    }
}

/// Accumulator threaded through one left-to-right controller pass.
///
/// Owns all controller memory; two machines never share state, so passes are
/// re-entrant.
#[derive(Debug, Clone)]
pub struct ControllerMachine {
    params: ControllerParams,
    phase: Phase,
    setpoint_a: f64,
    setpoint_b: f64,
}

impl ControllerMachine {
    /// Validate `params` and start in NORMAL at nominal setpoints.
    pub fn new(params: ControllerParams) -> Result<Self, ConfigurationError> {
        params.validate()?;
        Ok(Self {
            setpoint_a: params.nominal_a,
            setpoint_b: params.nominal_b,
            phase: Phase::Normal,
            params,
        })
    }

    pub const fn state(&self) -> ControllerState {
        self.phase.state()
    }

    /// Feed sample `i` with severity `s`; returns the state after the sample.
    ///
    /// Non-finite severities leave the machine untouched.
    pub fn step(&mut self, i: usize, s: f64) -> ControllerOutput {
        if !s.is_finite() {
            return self.output(ControlAction::Hold);
        }

        let p = &self.params;
        let action = match self.phase {
            Phase::Normal => {
                self.setpoint_a = p.nominal_a;
                self.setpoint_b = p.nominal_b;
                if s >= p.engage_threshold {
                    self.phase = Phase::Detecting { since: i };
                    ControlAction::EventDetected
                } else {
                    ControlAction::Hold
                }
            }

            Phase::Detecting { since } => {
                if s < p.engage_threshold {
                    self.phase = Phase::Normal;
                    ControlAction::TransientCleared
                } else if i.saturating_sub(since) >= p.holdoff_samples {
                    self.phase = Phase::Mitigating;
                    ControlAction::MitigationEngaged
                } else {
                    ControlAction::Hold
                }
            }

            Phase::Mitigating => {
                let excess = (s - p.engage_threshold).max(0.0);
                self.setpoint_a = (p.nominal_a * p.actuator_a_floor_fraction)
                    .max(p.nominal_a - p.kp_actuator_a * excess * p.nominal_a);
                self.setpoint_b = (p.nominal_b + p.actuator_b_max_delta)
                    .min(p.nominal_b + p.kp_actuator_b * excess * ACTUATOR_B_EXCESS_SCALE);

                if s < p.recovery_threshold {
                    self.phase = Phase::Recovering { since: i };
                    ControlAction::RecoveryPhase
                } else {
                    ControlAction::Actuate
                }
            }

            Phase::Recovering { since } => {
                if s >= p.engage_threshold {
                    self.phase = Phase::Mitigating;
                    ControlAction::Relapse
                } else if i.saturating_sub(since) < RECOVERY_HOLD_SAMPLES {
                    ControlAction::Hold
                } else {
                    self.setpoint_a = p.nominal_a.min(self.setpoint_a + RAMP_A_FRACTION * p.nominal_a);
                    self.setpoint_b = p.nominal_b.max(self.setpoint_b - RAMP_B_STEP);

                    if self.setpoint_a >= RECOVERED_FRACTION * p.nominal_a {
                        self.setpoint_a = p.nominal_a;
                        self.setpoint_b = p.nominal_b;
                        self.phase = Phase::Normal;
                        ControlAction::FullyRecovered
                    } else {
                        ControlAction::Ramp
                    }
                }
            }
        };

        self.output(action)
    }

    const fn output(&self, action: ControlAction) -> ControllerOutput {
        ControllerOutput {
            state: self.phase.state(),
            setpoint_a: self.setpoint_a,
            setpoint_b: self.setpoint_b,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControllerState::{Detecting, Mitigating, Normal, Recovering};

    fn params() -> ControllerParams {
        ControllerParams {
            engage_threshold: 0.25,
            recovery_threshold: 0.20,
            holdoff_samples: 2,
            kp_actuator_a: 0.3,
            actuator_a_floor_fraction: 0.35,
            kp_actuator_b: 0.15,
            actuator_b_max_delta: 25.0,
            nominal_a: 100.0,
            nominal_b: 120.0,
        }
    }

    fn run(params: ControllerParams, severities: &[f64]) -> Vec<ControllerOutput> {
        let mut m = ControllerMachine::new(params).unwrap();
        severities.iter().enumerate().map(|(i, &s)| m.step(i, s)).collect()
    }

    #[test]
    fn holdoff_confirms_before_mitigating() {
        let out = run(params(), &[0.1, 0.3, 0.3, 0.3]);
        let states: Vec<_> = out.iter().map(|o| o.state).collect();
        assert_eq!(states, vec![Normal, Detecting, Detecting, Mitigating]);
        // no actuation until MITIGATING has processed a sample
        assert_eq!(out[3].setpoint_a, 100.0);
        assert_eq!(out[3].action, ControlAction::MitigationEngaged);
    }

    #[test]
    fn mitigating_setpoints_follow_excess() {
        let out = run(params(), &[0.3, 0.3, 0.3, 0.55]);
        assert_eq!(out[3].state, Mitigating);
        assert!((out[3].setpoint_a - 91.0).abs() < 1e-9);
        // B: 120 + 0.15 * 0.30 * 10 = 120.45
        assert!((out[3].setpoint_b - 120.45).abs() < 1e-9);
    }

    #[test]
    fn setpoints_are_floored_and_capped() {
        let p = ControllerParams {
            kp_actuator_a: 5.0,
            kp_actuator_b: 50.0,
            ..params()
        };
        let out = run(p, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(out[3].setpoint_a, 35.0);
        assert_eq!(out[3].setpoint_b, 145.0);
    }

    #[test]
    fn transient_returns_to_normal() {
        let out = run(params(), &[0.3, 0.1, 0.0]);
        assert_eq!(out[1].state, Normal);
        assert_eq!(out[1].action, ControlAction::TransientCleared);
    }

    #[test]
    fn zero_holdoff_engages_on_next_sample() {
        let p = ControllerParams {
            holdoff_samples: 0,
            ..params()
        };
        let out = run(p, &[0.3, 0.3]);
        assert_eq!(out[0].state, Detecting);
        assert_eq!(out[1].state, Mitigating);
    }

    #[test]
    fn recovery_holds_then_ramps_to_normal() {
        // engage and drive A down to 91
        let mut sev = vec![0.3, 0.3, 0.3, 0.55, 0.1];
        sev.extend(std::iter::repeat(0.1).take(40));
        let out = run(params(), &sev);

        assert_eq!(out[4].state, Recovering);
        assert_eq!(out[4].action, ControlAction::RecoveryPhase);
        // MITIGATING recomputed setpoints on the recovery sample (excess 0)
        assert_eq!(out[4].setpoint_a, 100.0);

        // hold for 12 samples since the recovery sample, ramp at 12
        for o in &out[5..16] {
            assert_eq!(o.state, Recovering);
            assert_eq!(o.action, ControlAction::Hold);
        }
        assert_eq!(out[16].state, Normal);
        assert_eq!(out[16].action, ControlAction::FullyRecovered);
        assert_eq!(out[16].setpoint_b, 120.0);
    }

    #[test]
    fn clearing_sample_restores_nominal_setpoints() {
        let mut m = ControllerMachine::new(params()).unwrap();
        for (i, s) in [0.3, 0.3, 0.3, 0.85].into_iter().enumerate() {
            m.step(i, s);
        }
        let o = m.step(4, 0.85);
        assert!((o.setpoint_a - 82.0).abs() < 1e-9);

        // excess is zero below the recovery threshold
        let o = m.step(5, 0.1);
        assert_eq!(o.state, Recovering);
        assert_eq!(o.setpoint_a, 100.0);
        assert_eq!(o.setpoint_b, 120.0);
    }

    #[test]
    fn relapse_returns_to_mitigating_with_held_outputs() {
        let mut sev = vec![0.3, 0.3, 0.3, 0.55, 0.1, 0.1];
        sev.push(0.9);
        let out = run(params(), &sev);
        assert_eq!(out[5].state, Recovering);
        assert_eq!(out[6].state, Mitigating);
        assert_eq!(out[6].action, ControlAction::Relapse);
        assert_eq!(out[6].setpoint_a, out[5].setpoint_a);
    }

    #[test]
    fn never_mitigating_to_detecting() {
        let sev: Vec<f64> = (0..500).map(|i| ((i as f64) * 0.13).sin().abs()).collect();
        let out = run(params(), &sev);
        for w in out.windows(2) {
            assert!(!(w[0].state == Mitigating && w[1].state == Detecting));
            assert!(!(w[0].state == Recovering && w[1].state == Detecting));
        }
    }

    #[test]
    fn nan_severity_holds_everything() {
        let mut m = ControllerMachine::new(params()).unwrap();
        m.step(0, 0.3);
        let o = m.step(1, f64::NAN);
        assert_eq!(o.state, Detecting);
        assert_eq!(o.action, ControlAction::Hold);
    }

    #[test]
    fn invalid_params_rejected_up_front() {
        let p = ControllerParams {
            recovery_threshold: 0.5,
            ..params()
        };
        assert!(ControllerMachine::new(p).is_err());
    }
}
