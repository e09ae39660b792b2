//! Tokio driver for the playback scheduler.
//!
//! Owns a [`PlaybackScheduler`] behind a `tokio::sync::Mutex` and runs one
//! tick task per play session. Every control that stops or reshapes playback
//! cancels the current session's [`CancellationToken`] while holding the
//! scheduler lock, so a tick from a stale session can never land.
//!
//! Both scheduler channels are bridged onto `tokio::sync::watch` receivers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::scheduler::{PlaybackScheduler, PlaybackState, SlowFrame, TokioClock};
use crate::types::{ConfigurationError, ControllerOutput, ProcessedSample};

struct Session {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Async front end over a shared scheduler.
pub struct PlaybackHandle {
    scheduler: Arc<Mutex<PlaybackScheduler<TokioClock>>>,
    session: Option<Session>,
    tick_interval: Duration,
    cursor_rx: watch::Receiver<usize>,
    frame_rx: watch::Receiver<Option<SlowFrame>>,
}

impl PlaybackHandle {
    /// Build a stopped handle over the given arrays.
    pub fn new(
        samples: Vec<ProcessedSample>,
        outputs: Vec<ControllerOutput>,
        tick_interval: Duration,
    ) -> Result<Self, ConfigurationError> {
        let mut scheduler = PlaybackScheduler::with_clock(samples, outputs, TokioClock)?;

        let (cursor_tx, cursor_rx) = watch::channel(scheduler.cursor_index());
        let (frame_tx, frame_rx) = watch::channel(scheduler.current_frame());
        scheduler.subscribe_cursor(move |i| {
            cursor_tx.send_replace(i);
        });
        scheduler.subscribe_frames(move |frame| {
            frame_tx.send_replace(Some(frame.clone()));
        });

        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            session: None,
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            cursor_rx,
            frame_rx,
        })
    }

    /// Override the slow-channel throttle interval.
    pub async fn set_slow_interval(&self, interval: Duration) {
        self.scheduler.lock().await.set_slow_interval(interval);
    }

    /// Cursor updates (fast channel).
    pub fn cursor_updates(&self) -> watch::Receiver<usize> {
        self.cursor_rx.clone()
    }

    /// Slow-channel frames.
    pub fn frames(&self) -> watch::Receiver<Option<SlowFrame>> {
        self.frame_rx.clone()
    }

    pub async fn snapshot(&self) -> PlaybackState {
        self.scheduler.lock().await.state()
    }

    pub async fn current_frame(&self) -> Option<SlowFrame> {
        self.scheduler.lock().await.current_frame()
    }

    /// Start (or keep) playing; returns whether playback is running.
    pub async fn play(&mut self) -> bool {
        let scheduler = Arc::clone(&self.scheduler);
        let mut sched = scheduler.lock().await;
        if !sched.play() {
            return false;
        }
        let live = self.session.as_ref().is_some_and(|s| !s.token.is_cancelled() && !s.task.is_finished());
        if !live {
            self.cancel_session();
            self.session = Some(self.spawn_session());
            info!(cursor = sched.cursor_index(), speed = sched.speed(), "Playback session started");
        }
        true
    }

    pub async fn pause(&mut self) {
        let scheduler = Arc::clone(&self.scheduler);
        let mut sched = scheduler.lock().await;
        self.cancel_session();
        sched.pause();
    }

    pub async fn seek(&mut self, fraction: f64) {
        let scheduler = Arc::clone(&self.scheduler);
        let mut sched = scheduler.lock().await;
        self.cancel_session();
        sched.seek(fraction);
    }

    pub async fn seek_index(&mut self, index: usize) {
        let scheduler = Arc::clone(&self.scheduler);
        let mut sched = scheduler.lock().await;
        self.cancel_session();
        sched.seek_index(index);
    }

    pub async fn set_speed(&self, multiplier: u32) -> Result<(), ConfigurationError> {
        self.scheduler.lock().await.set_speed(multiplier)
    }

    /// Swap in recomputed arrays; a running session restarts on the new data.
    pub async fn replace(
        &mut self,
        samples: Vec<ProcessedSample>,
        outputs: Vec<ControllerOutput>,
    ) -> Result<(), ConfigurationError> {
        let scheduler = Arc::clone(&self.scheduler);
        let mut sched = scheduler.lock().await;
        sched.replace_data(samples, outputs)?;
        self.cancel_session();
        if sched.is_playing() {
            self.session = Some(self.spawn_session());
        }
        debug!(len = sched.len(), cursor = sched.cursor_index(), "Playback data replaced");
        Ok(())
    }

    /// Wait for the current session to end on its own (end of data) or be cancelled.
    pub async fn wait_finished(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.task.await;
        }
    }

    /// Cancel any session and wait for its task to exit.
    pub async fn shutdown(&mut self) {
        let scheduler = Arc::clone(&self.scheduler);
        let session = {
            let mut sched = scheduler.lock().await;
            let session = self.session.take();
            if let Some(s) = &session {
                s.token.cancel();
            }
            sched.pause();
            session
        };
        if let Some(session) = session {
            let _ = session.task.await;
        }
    }

    fn spawn_session(&self) -> Session {
        let token = CancellationToken::new();
        let child = token.clone();
        let scheduler = Arc::clone(&self.scheduler);
        let period = self.tick_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {
                        let mut sched = scheduler.lock().await;
                        if child.is_cancelled() || !sched.tick() {
                            break;
                        }
                    }
                }
            }
        });

        Session { token, task }
    }

    fn cancel_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.token.cancel();
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel_session();
    }
}
