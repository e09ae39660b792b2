//! Attack/release smoothing for the display-facing severity.
//!
//! Reacts quickly to rising severity and decays slowly, so a gauge needle
//! does not flicker through brief spikes.

use crate::config::defaults::{ATTACK_ALPHA, RELEASE_ALPHA};

/// Asymmetric exponential filter with one value of memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingFilter {
    y: f64,
}

impl Default for SmoothingFilter {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl SmoothingFilter {
    pub const fn new(initial: f64) -> Self {
        Self { y: initial }
    }

    /// Fold one raw reading into the filter and return the new value.
    pub fn update(&mut self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return self.y;
        }
        let alpha = if raw > self.y { ATTACK_ALPHA } else { RELEASE_ALPHA };
        self.y = alpha * raw + (1.0 - alpha) * self.y;
        self.y
    }

    /// Hard-set the filter, skipping any decay.
    pub fn reset(&mut self, value: f64) {
        self.y = value;
    }

    pub const fn value(&self) -> f64 {
        self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_then_release() {
        let mut f = SmoothingFilter::default();
        assert!((f.update(0.8) - 0.32).abs() < 1e-12);
        assert!((f.update(0.2) - 0.3104).abs() < 1e-12);
    }

    #[test]
    fn reset_skips_decay() {
        let mut f = SmoothingFilter::new(0.9);
        f.reset(0.1);
        assert_eq!(f.value(), 0.1);
        // equal input takes the release branch and stays put
        assert!((f.update(0.1) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn converges_toward_constant_input() {
        let mut f = SmoothingFilter::default();
        for _ in 0..200 {
            f.update(0.6);
        }
        assert!((f.value() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn non_finite_input_ignored() {
        let mut f = SmoothingFilter::new(0.5);
        assert_eq!(f.update(f64::NAN), 0.5);
    }
}
