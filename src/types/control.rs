//! Controller outputs.

use serde::{Deserialize, Serialize};

/// Auto-driller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerState {
    #[default]
    Normal,
    Detecting,
    Mitigating,
    Recovering,
}

impl ControllerState {
    pub const ALL: [Self; 4] = [
        Self::Normal,
        Self::Detecting,
        Self::Mitigating,
        Self::Recovering,
    ];
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Detecting => write!(f, "DETECTING"),
            Self::Mitigating => write!(f, "MITIGATING"),
            Self::Recovering => write!(f, "RECOVERING"),
        }
    }
}

/// What the controller did on a given sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// No transition, outputs unchanged
    #[default]
    Hold,
    /// NORMAL -> DETECTING
    EventDetected,
    /// DETECTING -> NORMAL
    TransientCleared,
    /// DETECTING -> MITIGATING
    MitigationEngaged,
    /// Proportional setpoints applied while MITIGATING
    Actuate,
    /// MITIGATING -> RECOVERING
    RecoveryPhase,
    /// RECOVERING -> MITIGATING
    Relapse,
    /// Ramp step toward nominal while RECOVERING
    Ramp,
    /// RECOVERING -> NORMAL
    FullyRecovered,
}

/// Controller response for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerOutput {
    pub state: ControllerState,
    /// Actuator A (weight-on-bit) setpoint
    pub setpoint_a: f64,
    /// Actuator B (rotary speed) setpoint
    pub setpoint_b: f64,
    pub action: ControlAction,
}
