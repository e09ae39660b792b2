//! System-wide default constants.
//!
//! Fixed design constants of the replay core, grouped by subsystem. Tunable
//! values live in [`super::ReplayConfig`] instead.

// ============================================================================
// Controller
// ============================================================================

/// Samples after entering RECOVERING during which setpoints hold.
pub const RECOVERY_HOLD_SAMPLES: usize = 12;

/// Fraction of nominal A restored per sample once the recovery hold expires.
pub const RAMP_A_FRACTION: f64 = 0.008;

/// Decrement of B toward nominal per sample during the recovery ramp.
pub const RAMP_B_STEP: f64 = 0.5;

/// A at or above this fraction of nominal counts as fully recovered.
pub const RECOVERED_FRACTION: f64 = 0.98;

/// Scale applied to excess severity in the B setpoint law.
pub const ACTUATOR_B_EXCESS_SCALE: f64 = 10.0;

// ============================================================================
// Nominal Estimation
// ============================================================================

/// Leading span of the dataset searched for stable nominals (seconds).
pub const NOMINAL_WINDOW_S: f64 = 300.0;

/// Minimum stable rows in the leading span before falling back to global medians.
pub const NOMINAL_MIN_ROWS: usize = 10;

/// Lowest plausible nominal WOB (kkgf).
pub const NOMINAL_WOB_FLOOR: f64 = 2.0;

/// Lowest plausible nominal rotary speed (rpm).
pub const NOMINAL_RPM_FLOOR: f64 = 30.0;

// ============================================================================
// Playback
// ============================================================================

/// Minimum wall-clock spacing of slow-channel emissions (ms).
pub const SLOW_CHANNEL_INTERVAL_MS: u64 = 66;

/// External tick period used by the tokio driver (ms). ~60 Hz.
pub const TICK_INTERVAL_MS: u64 = 16;

/// Smoothing filter gain on rising input.
pub const ATTACK_ALPHA: f64 = 0.4;

/// Smoothing filter gain on falling input.
pub const RELEASE_ALPHA: f64 = 0.08;

// ============================================================================
// Ingestion
// ============================================================================

/// On-bottom gate: minimum WOB (kkgf).
pub const ON_BOTTOM_MIN_WOB: f64 = 0.5;

/// On-bottom gate: minimum surface RPM.
pub const ON_BOTTOM_MIN_RPM: f64 = 15.0;

/// Surface torque readings are clipped to +- this value (kN.m).
pub const TORQUE_CLIP_KNM: f64 = 50.0;

// ============================================================================
// Export
// ============================================================================

/// Keep every Nth row in exported telemetry.
pub const TELEMETRY_DOWNSAMPLE: usize = 2;
