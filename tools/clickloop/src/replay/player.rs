//! Playback engine and the thread that drives it.
//!
//! `PlaybackEngine::run_iteration` performs one pass over the routine. The
//! player thread parks in `PlayerControl::wait_for_start` while Idle and
//! calls `run_iteration` repeatedly while Running. Every wait is split into
//! short slices so a stop request is honored promptly.

use crate::errors::ClickError;
use crate::fsm::{PlayerControl, PlayerStatus, StatusSink};
use crate::input::{DeviceFactory, PointerDevice};
use crate::jitter::{hold_secs, randomize_coord, randomize_secs};
use crate::routine::{ClickEvent, EventAction, MouseButton, RoutineStore};
use crate::runtime::Clock;
use crate::types::{DelayMode, PlaybackConfig, PlayerState};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::mpsc;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

pub const SLEEP_SLICE: Duration = Duration::from_millis(20);
pub const MIN_DRAG_SECS: f64 = 0.05;
pub const MIN_DRAG_STEPS: u32 = 10;
pub const DRAG_STEPS_PER_SEC: f64 = 60.0;

/// Routine and settings shared between the launcher and the player thread.
#[derive(Clone, Default)]
pub struct PlaybackFeed {
    routine: RoutineStore,
    config: Arc<RwLock<PlaybackConfig>>,
}

impl PlaybackFeed {
    pub fn new(routine: RoutineStore, config: PlaybackConfig) -> Self {
        Self {
            routine,
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn routine(&self) -> &RoutineStore {
        &self.routine
    }

    pub fn config(&self) -> PlaybackConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes effect at the start of the next loop iteration.
    pub fn set_config(&self, config: PlaybackConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed { completed: u32 },
    LimitReached,
    NothingToPlay,
    Cancelled,
}

pub(crate) fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

fn lerp(from: i32, to: i32, t: f64) -> i32 {
    let (from, to) = (f64::from(from), f64::from(to));
    (from + (to - from) * t).round() as i32
}

pub fn drag_steps(duration: f64) -> u32 {
    ((duration * DRAG_STEPS_PER_SEC).round() as u32).max(MIN_DRAG_STEPS)
}

pub struct PlaybackEngine {
    control: Arc<PlayerControl>,
    device: Box<dyn PointerDevice>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
}

impl PlaybackEngine {
    pub fn new(
        control: Arc<PlayerControl>,
        device: Box<dyn PointerDevice>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            control,
            device,
            clock,
            rng,
        }
    }

    /// One pass over the routine. Settings and routine are sampled once, at
    /// the top; edits made mid-pass apply to the next one.
    pub fn run_iteration(&mut self, feed: &PlaybackFeed) -> Result<LoopOutcome, ClickError> {
        let config = feed.config();
        let routine = feed.routine().snapshot();

        if !config.is_unbounded() && self.control.completed_loops() >= config.max_loops {
            self.control.settle_idle(PlayerStatus::LoopLimitReached {
                max_loops: config.max_loops,
            });
            return Ok(LoopOutcome::LimitReached);
        }
        if routine.is_empty() {
            self.control.settle_idle(PlayerStatus::NothingToPlay);
            return Ok(LoopOutcome::NothingToPlay);
        }

        for event in &routine {
            if !self.control.is_running() {
                return Ok(LoopOutcome::Cancelled);
            }
            if !self.play_event(event, &config)? {
                return Ok(LoopOutcome::Cancelled);
            }
        }
        if !self.control.is_running() {
            return Ok(LoopOutcome::Cancelled);
        }

        let completed = self.control.record_loop();
        if !config.is_unbounded() && completed >= config.max_loops {
            self.control.settle_idle(PlayerStatus::LoopLimitReached {
                max_loops: config.max_loops,
            });
            return Ok(LoopOutcome::Completed { completed });
        }

        let interval = randomize_secs(config.interval, config.jitter_strength, &mut self.rng);
        self.pause(interval);
        Ok(LoopOutcome::Completed { completed })
    }

    /// Returns `false` when a stop request arrived during the pre-delay.
    fn play_event(
        &mut self,
        event: &ClickEvent,
        config: &PlaybackConfig,
    ) -> Result<bool, ClickError> {
        let base = match config.delay_mode {
            DelayMode::UseRecordedDelay => event.delay.unwrap_or(config.fixed_delay),
            DelayMode::UseFixedDelay => config.fixed_delay,
        };
        let wait = randomize_secs(base, config.jitter_strength, &mut self.rng);
        if !self.pause(wait) {
            return Ok(false);
        }

        let strength = config.jitter_strength;
        match event.action {
            EventAction::Click => self.click(event.button, (event.x, event.y), strength)?,
            EventAction::Drag {
                end_x,
                end_y,
                duration,
            } => self.drag(
                event.button,
                (event.x, event.y),
                (end_x, end_y),
                duration,
                strength,
            )?,
        }
        Ok(true)
    }

    fn jitter_point(&mut self, (x, y): (i32, i32), strength: f64) -> (i32, i32) {
        (
            randomize_coord(x, strength, &mut self.rng),
            randomize_coord(y, strength, &mut self.rng),
        )
    }

    fn click(
        &mut self,
        button: MouseButton,
        at: (i32, i32),
        strength: f64,
    ) -> Result<(), ClickError> {
        let (x, y) = self.jitter_point(at, strength);
        self.device.move_to(x, y)?;
        self.device.press(button)?;
        let hold = hold_secs(strength, &mut self.rng);
        self.clock.sleep(secs(hold));
        self.device.release(button)
    }

    /// The button is released wherever the pointer stopped, even when the
    /// path was cut short or a move failed.
    fn drag(
        &mut self,
        button: MouseButton,
        start: (i32, i32),
        end: (i32, i32),
        duration: f64,
        strength: f64,
    ) -> Result<(), ClickError> {
        let (x1, y1) = self.jitter_point(start, strength);
        let (x2, y2) = self.jitter_point(end, strength);
        let duration = duration.max(MIN_DRAG_SECS);
        let steps = drag_steps(duration);
        let step_sleep = secs(duration / f64::from(steps));

        self.device.move_to(x1, y1)?;
        self.device.press(button)?;

        let travelled = self.drag_path((x1, y1), (x2, y2), steps, step_sleep);
        let released = self.device.release(button);
        travelled?;
        released
    }

    fn drag_path(
        &mut self,
        (x1, y1): (i32, i32),
        (x2, y2): (i32, i32),
        steps: u32,
        step_sleep: Duration,
    ) -> Result<(), ClickError> {
        for step in 0..=steps {
            if !self.control.is_running() {
                break;
            }
            let t = f64::from(step) / f64::from(steps);
            self.device.move_to(lerp(x1, x2, t), lerp(y1, y2, t))?;
            self.clock.sleep(step_sleep);
        }
        Ok(())
    }

    /// Sleeps in slices; `false` means playback was stopped meanwhile.
    fn pause(&self, seconds: f64) -> bool {
        let mut remaining = secs(seconds);
        while !remaining.is_zero() {
            if !self.control.is_running() {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
        self.control.is_running()
    }
}

/// Drives the engine until shutdown. A device failure ends the loop: the
/// status sink sees `Failed`, the control is shut down and the error is
/// returned to whoever joins the thread.
pub fn run_control_loop(
    engine: &mut PlaybackEngine,
    feed: &PlaybackFeed,
) -> Result<(), ClickError> {
    loop {
        if engine.control.wait_for_start() == PlayerState::ShuttingDown {
            return Ok(());
        }
        if let Err(err) = engine.run_iteration(feed) {
            engine
                .control
                .settle_idle(PlayerStatus::Failed(err.to_string()));
            engine.control.shutdown();
            return Err(err);
        }
    }
}

/// Background player: one control loop on its own thread.
pub struct Player {
    control: Arc<PlayerControl>,
    feed: PlaybackFeed,
    handle: Option<JoinHandle<Result<(), ClickError>>>,
}

impl Player {
    pub fn spawn(
        feed: PlaybackFeed,
        device: DeviceFactory,
        clock: Arc<dyn Clock>,
        status: Option<StatusSink>,
    ) -> Result<Self, ClickError> {
        Self::spawn_with_rng(feed, device, clock, status, Box::new(StdRng::from_entropy()))
    }

    /// Waits until the device has been built so construction errors surface
    /// here rather than at shutdown.
    pub fn spawn_with_rng(
        feed: PlaybackFeed,
        device: DeviceFactory,
        clock: Arc<dyn Clock>,
        status: Option<StatusSink>,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Self, ClickError> {
        let control = Arc::new(PlayerControl::new(status));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), ClickError>>(1);

        let thread_control = Arc::clone(&control);
        let thread_feed = feed.clone();
        let handle = std::thread::Builder::new()
            .name("clickloop-player".to_string())
            .spawn(move || {
                let device = match device() {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(()));
                        device
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.clone()));
                        return Err(err);
                    }
                };
                let mut engine = PlaybackEngine::new(thread_control, device, clock, rng);
                run_control_loop(&mut engine, &thread_feed)
            })
            .map_err(|e| ClickError::Player(format!("cannot spawn player thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                control,
                feed,
                handle: Some(handle),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(ClickError::Player(
                    "player thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    pub fn control(&self) -> Arc<PlayerControl> {
        Arc::clone(&self.control)
    }

    pub fn state(&self) -> PlayerState {
        self.control.state()
    }

    pub fn start_clicking(&self) -> bool {
        self.control.start_clicking()
    }

    pub fn stop_clicking(&self) -> bool {
        self.control.stop_clicking()
    }

    pub fn toggle(&self) -> PlayerState {
        self.control.toggle()
    }

    /// Replaces the routine and restarts loop counting.
    pub fn replace_routine(&self, routine: Vec<ClickEvent>) {
        self.feed.routine().replace(routine);
        self.control.reset_loops();
    }

    /// Requests shutdown and waits for the loop to exit. Returns the error
    /// that ended playback, if any.
    pub fn shutdown(mut self) -> Result<(), ClickError> {
        self.join()
    }

    fn join(&mut self) -> Result<(), ClickError> {
        self.control.shutdown();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ClickError::Player("player thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.join();
    }
}
