//! Replay Playback
//!
//! - [`smoothing`]: attack/release filter for the display severity
//! - [`scheduler`]: clock-injected cursor scheduler with cursor and frame channels
//! - [`driver`]: tokio task that ticks a scheduler under cancellation
//!
//! ## Usage
//!
//! ```ignore
//! let mut handle = PlaybackHandle::new(processed, outputs, Duration::from_millis(16))?;
//! let mut frames = handle.frames();
//! handle.play().await;
//! while frames.changed().await.is_ok() {
//!     if let Some(frame) = frames.borrow().as_ref() { /* render */ }
//! }
//! ```

pub mod driver;
pub mod scheduler;
pub mod smoothing;

pub use driver::PlaybackHandle;
pub use scheduler::{
    Clock, CursorCallback, FrameCallback, ManualClock, PlaybackScheduler, PlaybackState, SlowFrame,
    SubscriptionId, SystemClock, TokioClock,
};
pub use smoothing::SmoothingFilter;
