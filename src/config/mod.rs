//! Replay Configuration Module
//!
//! Provides run configuration loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `TVM_CONFIG` environment variable (path to TOML file)
//! 2. `replay_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(ReplayConfig::load());
//!
//! // Anywhere in the codebase:
//! let threshold = config::get().detection.threshold;
//! ```

mod replay_config;
pub mod defaults;
pub mod validation;

pub use replay_config::*;

use std::sync::OnceLock;

/// Global replay configuration, initialized once at startup.
static REPLAY_CONFIG: OnceLock<ReplayConfig> = OnceLock::new();

/// Initialize the global replay configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: ReplayConfig) {
    if REPLAY_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global replay configuration.
///
/// Falls back to (and pins) the built-in defaults if `init()` was never called.
pub fn get() -> &'static ReplayConfig {
    REPLAY_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() before config::init(), using defaults");
        ReplayConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    REPLAY_CONFIG.get().is_some()
}
