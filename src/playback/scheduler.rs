//! Playback Scheduler
//!
//! Advances a cursor over precomputed processed rows and controller outputs
//! under an external tick, and publishes the result on two channels:
//!
//! - **cursor channel**: the cursor index, on every tick while playing
//! - **frame channel**: row, controller output and smoothed severity, at most
//!   once per slow interval (66 ms wall clock) plus once at the end
//!
//! The scheduler itself never sleeps; whoever owns it calls [`tick`] at the
//! display rate. Wall-clock time comes from a [`Clock`] so the throttle law
//! can be driven deterministically in tests.
//!
//! [`tick`]: PlaybackScheduler::tick

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::smoothing::SmoothingFilter;
use crate::config::defaults::SLOW_CHANNEL_INTERVAL_MS;
use crate::types::{ConfigurationError, ControllerOutput, ProcessedSample, RangeError};

// ============================================================================
// Clocks
// ============================================================================

/// Source of wall-clock time for the slow-channel throttle.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Tokio's clock, so a paused test runtime also pauses the throttle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Hand-advanced clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Observable State
// ============================================================================

/// Slow-channel payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowFrame {
    pub cursor_index: usize,
    pub sample: ProcessedSample,
    pub output: ControllerOutput,
    pub smoothed_severity: f64,
}

/// Snapshot of the scheduler-owned playback state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub cursor_index: usize,
    pub is_playing: bool,
    pub speed_multiplier: u32,
    pub smoothed_severity: f64,
}

/// Handle returned by the subscribe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type CursorCallback = Box<dyn FnMut(usize) + Send>;
pub type FrameCallback = Box<dyn FnMut(&SlowFrame) + Send>;

// ============================================================================
// Scheduler
// ============================================================================

/// Single owner of [`PlaybackState`] over one pair of aligned arrays.
pub struct PlaybackScheduler<C: Clock = SystemClock> {
    samples: Vec<ProcessedSample>,
    outputs: Vec<ControllerOutput>,

    cursor: usize,
    playing: bool,
    speed: u32,
    filter: SmoothingFilter,

    clock: C,
    slow_interval: Duration,
    last_slow: Option<Instant>,

    cursor_subs: Vec<(SubscriptionId, CursorCallback)>,
    frame_subs: Vec<(SubscriptionId, FrameCallback)>,
    next_sub: u64,
}

impl<C: Clock> std::fmt::Debug for PlaybackScheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("len", &self.samples.len())
            .field("state", &self.state())
            .field("cursor_subs", &self.cursor_subs.len())
            .field("frame_subs", &self.frame_subs.len())
            .finish_non_exhaustive()
    }
}

impl PlaybackScheduler<SystemClock> {
    /// Scheduler over `samples` / `outputs` on the system clock, stopped at 0.
    pub fn create(
        samples: Vec<ProcessedSample>,
        outputs: Vec<ControllerOutput>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_clock(samples, outputs, SystemClock)
    }
}

impl<C: Clock> PlaybackScheduler<C> {
    pub fn with_clock(
        samples: Vec<ProcessedSample>,
        outputs: Vec<ControllerOutput>,
        clock: C,
    ) -> Result<Self, ConfigurationError> {
        check_lengths(&samples, &outputs)?;
        let filter = SmoothingFilter::new(samples.first().map_or(0.0, |s| s.severity));
        Ok(Self {
            samples,
            outputs,
            cursor: 0,
            playing: false,
            speed: 1,
            filter,
            clock,
            slow_interval: Duration::from_millis(SLOW_CHANNEL_INTERVAL_MS),
            last_slow: None,
            cursor_subs: Vec::new(),
            frame_subs: Vec::new(),
            next_sub: 0,
        })
    }

    /// Override the slow-channel throttle interval.
    #[must_use]
    pub fn with_slow_interval(mut self, interval: Duration) -> Self {
        self.set_slow_interval(interval);
        self
    }

    pub fn set_slow_interval(&mut self, interval: Duration) {
        self.slow_interval = interval;
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub const fn cursor_index(&self) -> usize {
        self.cursor
    }

    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    pub const fn speed(&self) -> u32 {
        self.speed
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            cursor_index: self.cursor,
            is_playing: self.playing,
            speed_multiplier: self.speed,
            smoothed_severity: self.filter.value(),
        }
    }

    /// Frame at the cursor with the current filter value, without updating it.
    pub fn current_frame(&self) -> Option<SlowFrame> {
        self.frame_at(self.cursor, self.filter.value())
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    pub fn subscribe_cursor<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(usize) + Send + 'static,
    {
        let id = self.next_id();
        self.cursor_subs.push((id, Box::new(callback)));
        id
    }

    pub fn subscribe_frames<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&SlowFrame) + Send + 'static,
    {
        let id = self.next_id();
        self.frame_subs.push((id, Box::new(callback)));
        id
    }

    /// Drop a subscription. Returns false if the id was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.cursor_subs.len() + self.frame_subs.len();
        self.cursor_subs.retain(|(sid, _)| *sid != id);
        self.frame_subs.retain(|(sid, _)| *sid != id);
        before != self.cursor_subs.len() + self.frame_subs.len()
    }

    fn next_id(&mut self) -> SubscriptionId {
        self.next_sub += 1;
        SubscriptionId(self.next_sub)
    }

    // ------------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------------

    /// Start playing. Rewinds to 0 first when the cursor is at the end.
    ///
    /// Returns whether the scheduler is playing afterwards; a dataset of one
    /// row or fewer never plays.
    pub fn play(&mut self) -> bool {
        if self.playing {
            return true;
        }
        let n = self.samples.len();
        if n == 0 {
            return false;
        }
        if self.cursor >= n - 1 {
            self.move_to(0);
        }
        if self.cursor < n - 1 {
            self.playing = true;
            debug!(cursor = self.cursor, speed = self.speed, "Playback started");
        }
        self.playing
    }

    /// Stop playing; the cursor stays where it is.
    pub fn pause(&mut self) {
        if self.playing {
            debug!(cursor = self.cursor, "Playback paused");
        }
        self.playing = false;
    }

    /// Seek to a fraction of the dataset; out-of-range fractions are clamped.
    pub fn seek(&mut self, fraction: f64) {
        let n = self.samples.len();
        if n == 0 {
            return;
        }
        if !(0.0..=1.0).contains(&fraction) {
            let err = RangeError { requested: fraction, max: n - 1 };
            debug!(error = %err, "Seek fraction clamped");
        }
        let f = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.seek_index((f * (n - 1) as f64).round() as usize);
    }

    /// Seek to a row index, clamped to `[0, N-1]`. Stops playback.
    pub fn seek_index(&mut self, index: usize) {
        let n = self.samples.len();
        if n == 0 {
            return;
        }
        if index > n - 1 {
            let err = RangeError { requested: index as f64, max: n - 1 };
            debug!(error = %err, "Seek index clamped");
        }
        self.playing = false;
        self.move_to(index.min(n - 1));
    }

    /// Samples advanced per tick, from the next tick on.
    pub fn set_speed(&mut self, multiplier: u32) -> Result<(), ConfigurationError> {
        if multiplier == 0 {
            return Err(ConfigurationError::InvalidSpeed(multiplier));
        }
        self.speed = multiplier;
        Ok(())
    }

    /// Swap in freshly recomputed arrays.
    ///
    /// The cursor is clamped into the new range and both channels re-emit;
    /// play/pause is left alone unless the new dataset is empty.
    pub fn replace_data(
        &mut self,
        samples: Vec<ProcessedSample>,
        outputs: Vec<ControllerOutput>,
    ) -> Result<(), ConfigurationError> {
        check_lengths(&samples, &outputs)?;
        self.samples = samples;
        self.outputs = outputs;

        let n = self.samples.len();
        if n == 0 {
            self.cursor = 0;
            self.playing = false;
            self.filter.reset(0.0);
            self.emit_cursor();
            return Ok(());
        }
        self.move_to(self.cursor.min(n - 1));
        Ok(())
    }

    /// Re-emit both channels at the current cursor without moving it.
    pub fn resync(&mut self) {
        self.emit_cursor();
        let now = self.clock.now();
        if let Some(frame) = self.current_frame() {
            self.publish_frame(&frame, now);
        }
    }

    /// Advance one external tick.
    ///
    /// Returns whether the scheduler is still playing afterwards.
    pub fn tick(&mut self) -> bool {
        if !self.playing || self.samples.is_empty() {
            self.playing = false;
            return false;
        }

        let last = self.samples.len() - 1;
        self.cursor = self.cursor.saturating_add(self.speed as usize).min(last);
        self.emit_cursor();

        let now = self.clock.now();
        let at_end = self.cursor == last;
        let due = self
            .last_slow
            .map_or(true, |t| now.saturating_duration_since(t) >= self.slow_interval);

        if due || at_end {
            let severity = self.samples[self.cursor].severity;
            let smoothed = self.filter.update(severity);
            if let Some(frame) = self.frame_at(self.cursor, smoothed) {
                self.publish_frame(&frame, now);
            }
        }

        if at_end {
            self.playing = false;
            debug!(cursor = self.cursor, "Playback reached end");
        }
        self.playing
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Jump to `index`, hard-reset the filter there and resync both channels.
    fn move_to(&mut self, index: usize) {
        self.cursor = index;
        if let Some(s) = self.samples.get(index) {
            self.filter.reset(s.severity);
        }
        self.resync();
    }

    fn frame_at(&self, index: usize, smoothed: f64) -> Option<SlowFrame> {
        Some(SlowFrame {
            cursor_index: index,
            sample: self.samples.get(index)?.clone(),
            output: *self.outputs.get(index)?,
            smoothed_severity: smoothed,
        })
    }

    fn emit_cursor(&mut self) {
        let cursor = self.cursor;
        for (_, cb) in &mut self.cursor_subs {
            cb(cursor);
        }
    }

    fn publish_frame(&mut self, frame: &SlowFrame, now: Instant) {
        self.last_slow = Some(now);
        for (_, cb) in &mut self.frame_subs {
            cb(frame);
        }
    }
}

fn check_lengths(
    samples: &[ProcessedSample],
    outputs: &[ControllerOutput],
) -> Result<(), ConfigurationError> {
    if samples.len() == outputs.len() {
        Ok(())
    } else {
        Err(ConfigurationError::LengthMismatch {
            samples: samples.len(),
            outputs: outputs.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ControlAction, ControllerState, Sample, SeverityLabel};

    fn dataset(severities: &[f64]) -> (Vec<ProcessedSample>, Vec<ControllerOutput>) {
        let samples = severities
            .iter()
            .enumerate()
            .map(|(i, &s)| ProcessedSample {
                sample: Sample::at(i as f64),
                severity: s,
                sustained: false,
                event_id: 0,
                severity_label: SeverityLabel::from_severity(s),
            })
            .collect();
        let outputs = severities
            .iter()
            .map(|_| ControllerOutput {
                state: ControllerState::Normal,
                setpoint_a: 10.0,
                setpoint_b: 120.0,
                action: ControlAction::Hold,
            })
            .collect();
        (samples, outputs)
    }

    fn scheduler(n: usize) -> (PlaybackScheduler<ManualClock>, ManualClock) {
        let sev: Vec<f64> = (0..n).map(|i| (i % 10) as f64 / 10.0).collect();
        let (s, o) = dataset(&sev);
        let clock = ManualClock::default();
        (PlaybackScheduler::with_clock(s, o, clock.clone()).unwrap(), clock)
    }

    fn record(
        sched: &mut PlaybackScheduler<ManualClock>,
    ) -> (Arc<Mutex<Vec<usize>>>, Arc<Mutex<Vec<SlowFrame>>>) {
        let cursors = Arc::new(Mutex::new(Vec::new()));
        let frames = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&cursors);
        sched.subscribe_cursor(move |i| c.lock().unwrap().push(i));
        let f = Arc::clone(&frames);
        sched.subscribe_frames(move |fr| f.lock().unwrap().push(fr.clone()));
        (cursors, frames)
    }

    #[test]
    fn length_mismatch_rejected() {
        let (s, mut o) = dataset(&[0.1, 0.2]);
        o.pop();
        assert_eq!(
            PlaybackScheduler::create(s, o).unwrap_err(),
            ConfigurationError::LengthMismatch { samples: 2, outputs: 1 }
        );
    }

    #[test]
    fn ticks_advance_by_speed_and_throttle_frames() {
        let (mut sched, clock) = scheduler(100);
        let (cursors, frames) = record(&mut sched);

        assert!(sched.play());
        sched.set_speed(3).unwrap();
        for _ in 0..4 {
            clock.advance(Duration::from_millis(16));
            sched.tick();
        }
        assert_eq!(*cursors.lock().unwrap(), vec![3, 6, 9, 12]);
        // first tick always emits; the next 66 ms are throttled
        let emitted: Vec<usize> = frames.lock().unwrap().iter().map(|f| f.cursor_index).collect();
        assert_eq!(emitted, vec![3]);

        clock.advance(Duration::from_millis(20));
        sched.tick();
        let emitted: Vec<usize> = frames.lock().unwrap().iter().map(|f| f.cursor_index).collect();
        assert_eq!(emitted, vec![3, 15]);
    }

    #[test]
    fn stops_at_end_after_final_frame() {
        let (mut sched, _clock) = scheduler(10);
        let (_cursors, frames) = record(&mut sched);
        sched.set_speed(4).unwrap();
        sched.play();

        assert!(sched.tick()); // 4, first frame
        assert!(sched.tick()); // 8, throttled
        assert!(!sched.tick()); // 9, final frame
        assert_eq!(sched.cursor_index(), 9);
        assert!(!sched.is_playing());

        let emitted: Vec<usize> = frames.lock().unwrap().iter().map(|f| f.cursor_index).collect();
        assert_eq!(emitted, vec![4, 9]);
        // no further ticks once stopped
        assert!(!sched.tick());
        assert_eq!(frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn play_at_end_rewinds() {
        let (mut sched, _clock) = scheduler(10);
        let (cursors, _frames) = record(&mut sched);
        sched.seek_index(9);
        assert!(sched.play());
        assert_eq!(sched.cursor_index(), 0);
        assert_eq!(cursors.lock().unwrap().last(), Some(&0));
    }

    #[test]
    fn single_row_never_plays() {
        let (mut sched, _clock) = scheduler(1);
        assert!(!sched.play());
        assert!(!sched.tick());
        let (mut empty, _) = scheduler(0);
        assert!(!empty.play());
    }

    #[test]
    fn seek_resets_filter_and_stops() {
        let (mut sched, _clock) = scheduler(11);
        let (cursors, frames) = record(&mut sched);
        sched.play();
        sched.seek(0.5);

        assert!(!sched.is_playing());
        assert_eq!(sched.cursor_index(), 5);
        assert_eq!(*cursors.lock().unwrap(), vec![5]);
        let frame = frames.lock().unwrap().last().cloned().unwrap();
        assert_eq!(frame.cursor_index, 5);
        assert!((frame.smoothed_severity - 0.5).abs() < 1e-12);
    }

    #[test]
    fn seek_is_idempotent() {
        let (mut sched, _clock) = scheduler(50);
        let (_cursors, frames) = record(&mut sched);
        sched.play();
        sched.tick();
        sched.seek(0.3);
        sched.seek(0.3);
        let frames = frames.lock().unwrap();
        let n = frames.len();
        assert_eq!(frames[n - 1], frames[n - 2]);
    }

    #[test]
    fn seek_out_of_range_is_clamped() {
        let (mut sched, _clock) = scheduler(20);
        sched.seek(7.0);
        assert_eq!(sched.cursor_index(), 19);
        sched.seek(-1.0);
        assert_eq!(sched.cursor_index(), 0);
        sched.seek(f64::NAN);
        assert_eq!(sched.cursor_index(), 0);
        sched.seek_index(1_000);
        assert_eq!(sched.cursor_index(), 19);
    }

    #[test]
    fn zero_speed_rejected_without_mutation() {
        let (mut sched, _clock) = scheduler(5);
        sched.set_speed(2).unwrap();
        assert_eq!(sched.set_speed(0), Err(ConfigurationError::InvalidSpeed(0)));
        assert_eq!(sched.speed(), 2);
    }

    #[test]
    fn replace_clamps_cursor_and_keeps_play_state() {
        let (mut sched, _clock) = scheduler(100);
        let (cursors, frames) = record(&mut sched);
        sched.seek_index(80);
        sched.play();

        let (s, o) = dataset(&[0.1, 0.2, 0.7, 0.4]);
        sched.replace_data(s, o).unwrap();
        assert_eq!(sched.cursor_index(), 3);
        assert!(sched.is_playing());
        assert_eq!(cursors.lock().unwrap().last(), Some(&3));
        let frame = frames.lock().unwrap().last().cloned().unwrap();
        assert_eq!(frame.cursor_index, 3);
        assert!((frame.smoothed_severity - 0.4).abs() < 1e-12);
    }

    #[test]
    fn replace_with_mismatch_leaves_state_alone() {
        let (mut sched, _clock) = scheduler(10);
        sched.seek_index(4);
        let (s, mut o) = dataset(&[0.1, 0.2]);
        o.pop();
        assert!(sched.replace_data(s, o).is_err());
        assert_eq!(sched.len(), 10);
        assert_eq!(sched.cursor_index(), 4);
    }

    #[test]
    fn replace_with_empty_stops() {
        let (mut sched, _clock) = scheduler(10);
        sched.play();
        sched.replace_data(Vec::new(), Vec::new()).unwrap();
        assert!(!sched.is_playing());
        assert_eq!(sched.cursor_index(), 0);
        assert!(sched.current_frame().is_none());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let (mut sched, _clock) = scheduler(10);
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        let id = sched.subscribe_cursor(move |_| *h.lock().unwrap() += 1);
        sched.seek_index(2);
        assert!(sched.unsubscribe(id));
        assert!(!sched.unsubscribe(id));
        sched.seek_index(3);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn cursor_is_monotone_while_playing() {
        let (mut sched, clock) = scheduler(257);
        let (cursors, frames) = record(&mut sched);
        sched.set_speed(7).unwrap();
        sched.play();
        while sched.tick() {
            clock.advance(Duration::from_millis(16));
        }
        let cursors = cursors.lock().unwrap();
        assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*cursors.last().unwrap(), 256);

        let frames = frames.lock().unwrap();
        assert!(frames.windows(2).all(|w| w[0].cursor_index <= w[1].cursor_index));
        assert_eq!(frames.last().unwrap().cursor_index, 256);
    }
}
