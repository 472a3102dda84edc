use crate::config::AppConfig;
use crate::errors::ClickError;
use crate::fsm::{PlayerStatus, StatusSink};
use crate::hotkeys::{capture_next_trigger, HotkeyAction, HotkeyBindings, HotkeyListener, Trigger};
use crate::input::{DeviceFactory, InputSource};
use crate::logging::{structured_fallback_line, JsonlLogger};
use crate::replay::player::{PlaybackFeed, Player};
use crate::replay::recorder::{Recorder, RecorderStatus};
use crate::replay::routine_file::{routine_fingerprint, save_routine, ClickEventRecord};
use crate::routine::{Routine, RoutineStore};
use crate::runtime::{Clock, FileSystem, ProductionRuntime, Terminal};
use crate::timeline::{live_feed_header, live_feed_line, render_timeline};
use crate::types::PlayerState;
use serde_json::{json, Value};
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

const ACTION_POLL: Duration = Duration::from_millis(50);
const TIMELINE_WIDTH: u16 = 80;
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Hotkey assigned by `Session::capture_hotkey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeySlot {
    PlayPause,
    StopRecord,
}

impl HotkeySlot {
    /// Field name under `[hotkeys]` in the config file.
    pub fn config_field(self) -> &'static str {
        match self {
            Self::PlayPause => "play_pause",
            Self::StopRecord => "stop_record",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::PlayPause => "play/pause key",
            Self::StopRecord => "stop-recording key (or middle click)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayRefusal {
    Recording,
    EmptyRoutine,
}

impl fmt::Display for PlayRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recording => write!(f, "Stop recording before playing."),
            Self::EmptyRoutine => write!(f, "Record or load a routine first."),
        }
    }
}

/// Launcher-side state shared by the record and play flows.
pub struct Launcher {
    feed: PlaybackFeed,
    player: Option<Player>,
    recording: bool,
}

impl Launcher {
    pub fn new(feed: PlaybackFeed) -> Self {
        Self {
            feed,
            player: None,
            recording: false,
        }
    }

    pub fn attach_player(&mut self, player: Player) {
        self.player = Some(player);
    }

    pub fn routine(&self) -> &RoutineStore {
        self.feed.routine()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn player_state(&self) -> PlayerState {
        self.player
            .as_ref()
            .map_or(PlayerState::Idle, Player::state)
    }

    /// Pauses playback and drops the current routine.
    pub fn begin_recording(&mut self) {
        if let Some(player) = &self.player {
            player.stop_clicking();
            player.replace_routine(Vec::new());
        } else {
            self.feed.routine().clear();
        }
        self.recording = true;
    }

    pub fn finish_recording(&mut self, routine: Routine) {
        self.load_routine(routine);
        self.recording = false;
    }

    /// Replacing the routine restarts loop counting.
    pub fn load_routine(&mut self, routine: Routine) {
        match &self.player {
            Some(player) => player.replace_routine(routine),
            None => self.feed.routine().replace(routine),
        }
    }

    pub fn check_playable(&self) -> Result<(), PlayRefusal> {
        if self.recording {
            return Err(PlayRefusal::Recording);
        }
        if self.feed.routine().is_empty() {
            return Err(PlayRefusal::EmptyRoutine);
        }
        Ok(())
    }

    /// Pausing is always allowed; starting goes through `check_playable`.
    pub fn toggle_play(&self) -> Result<PlayerState, PlayRefusal> {
        if self.player_state() != PlayerState::Running {
            self.check_playable()?;
        }
        Ok(self
            .player
            .as_ref()
            .map_or(PlayerState::Idle, Player::toggle))
    }

    pub fn shutdown(&mut self) -> Result<(), ClickError> {
        match self.player.take() {
            Some(player) => player.shutdown(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Exited,
    LimitReached,
    NothingToPlay,
}

pub struct Session {
    clock: Arc<dyn Clock>,
    file_system: Arc<dyn FileSystem>,
    terminal: Arc<dyn Terminal>,
    logger: Option<JsonlLogger>,
    config: AppConfig,
    bindings: HotkeyBindings,
}

impl Session {
    pub fn new(runtime: &ProductionRuntime, config: AppConfig) -> Result<Self, ClickError> {
        let bindings = config.hotkey_bindings()?;
        Ok(Self {
            clock: Arc::clone(&runtime.clock),
            file_system: Arc::clone(&runtime.file_system),
            terminal: Arc::clone(&runtime.terminal),
            logger: None,
            config,
            bindings,
        })
    }

    pub fn with_logger(mut self, logger: JsonlLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn bindings(&self) -> HotkeyBindings {
        self.bindings
    }

    /// Records until the stop trigger fires, then saves the routine to the
    /// configured path.
    pub fn record(&self, source: &dyn InputSource) -> Result<Routine, ClickError> {
        let (done_tx, done_rx) = mpsc::channel::<Routine>();

        let feed_terminal = Arc::clone(&self.terminal);
        let feed_logger = self.logger.clone();
        let status_terminal = Arc::clone(&self.terminal);
        let status_logger = self.logger.clone();

        let mut recorder = Recorder::new(Arc::clone(&self.clock), self.bindings.stop_record)
            .on_event(move |event, index| {
                let _ = feed_terminal.write_line(&live_feed_line(event, index));
                log_info(
                    feed_logger.as_ref(),
                    "recorder",
                    "event_recorded",
                    json!({"index": index, "event": ClickEventRecord::from(event)}),
                );
            })
            .on_done(move |routine| {
                let _ = done_tx.send(routine);
            })
            .with_status(Arc::new(move |status: &RecorderStatus| {
                let _ = status_terminal.write_line(&status.to_string());
                log_info(
                    status_logger.as_ref(),
                    "recorder",
                    "status",
                    json!({"status": status.to_string()}),
                );
            }));

        self.terminal.write_line(&live_feed_header())?;
        if let Err(err) = recorder.start(source) {
            self.log_error("recorder", "start_failed", &err);
            return Err(err);
        }

        let routine = done_rx.recv().map_err(|_| {
            ClickError::Player("recording ended without a result".to_string())
        })?;

        let path = &self.config.routine.path;
        save_routine(self.file_system.as_ref(), path, &routine)?;
        self.terminal.draw(&render_timeline(&routine, "Recorded", TIMELINE_WIDTH)?)?;
        self.terminal.write_line(&format!(
            "Saved {} event(s) to {}",
            routine.len(),
            path.display()
        ))?;
        log_info(
            self.logger.as_ref(),
            "recorder",
            "saved",
            json!({"path": path.display().to_string(), "events": routine.len()}),
        );
        Ok(routine)
    }

    /// Waits for the next key press and prints the config line that binds it
    /// to `slot`. The middle button is accepted only for the stop trigger.
    pub fn capture_hotkey(
        &self,
        source: &dyn InputSource,
        slot: HotkeySlot,
        timeout: Duration,
    ) -> Result<Option<Trigger>, ClickError> {
        self.terminal
            .write_line(&format!("Press the new {}...", slot.label()))?;
        let captured = capture_next_trigger(source, slot == HotkeySlot::StopRecord, timeout)?;
        let Some(trigger) = captured else {
            self.terminal.write_line(&format!(
                "Nothing pressed within {timeout:?}; hotkeys unchanged."
            ))?;
            return Ok(None);
        };

        let name = trigger.name();
        self.terminal.write_line(&format!("Captured {name}. Add to the config:"))?;
        self.terminal.write_line("[hotkeys]")?;
        self.terminal
            .write_line(&format!("{} = \"{name}\"", slot.config_field()))?;
        if trigger == Trigger::Key(self.bindings.exit) {
            self.terminal
                .write_line(&format!("Warning: {name} is also the exit key."))?;
        }
        log_info(
            self.logger.as_ref(),
            "hotkeys",
            "captured",
            json!({"slot": slot.config_field(), "key": name}),
        );
        Ok(Some(trigger))
    }

    /// Plays `routine` until the exit hotkey, the loop limit, or a failure.
    pub fn play(
        &self,
        routine: Routine,
        source: &dyn InputSource,
        device: DeviceFactory,
    ) -> Result<PlayOutcome, ClickError> {
        let fingerprint = routine_fingerprint(&routine)?;
        let events = routine.len();
        let playback = self.config.playback_config();
        let feed = PlaybackFeed::new(RoutineStore::new(routine), playback);

        let (status_tx, status_rx) = mpsc::channel::<PlayerStatus>();
        let sink: StatusSink = Arc::new(move |status: &PlayerStatus| {
            let _ = status_tx.send(status.clone());
        });

        let mut launcher = Launcher::new(feed.clone());
        if let Err(refusal) = launcher.check_playable() {
            self.terminal.write_line(&refusal.to_string())?;
            return Ok(PlayOutcome::NothingToPlay);
        }

        let player = Player::spawn(feed, device, Arc::clone(&self.clock), Some(sink))?;
        launcher.attach_player(player);

        let (listener, actions) = match HotkeyListener::start(source, self.bindings) {
            Ok(started) => started,
            Err(err) => {
                self.log_error("hotkeys", "start_failed", &err);
                launcher.shutdown()?;
                return Err(err);
            }
        };

        log_info(
            self.logger.as_ref(),
            "player",
            "playback_start",
            json!({
                "fingerprint": fingerprint,
                "events": events,
                "delay_mode": playback.delay_mode.as_str(),
                "max_loops": playback.max_loops,
                "randomness": playback.jitter_strength,
            }),
        );
        self.terminal.write_line(&format!(
            "Playing {events} event(s) [{fingerprint}]. {}",
            self.bindings.controls_legend()
        ))?;

        if let Err(refusal) = launcher.toggle_play() {
            self.terminal.write_line(&refusal.to_string())?;
        }

        let outcome = self.drive(&launcher, &status_rx, &actions);
        listener.stop();
        let shutdown = launcher.shutdown();
        self.drain_statuses(&status_rx);
        if let Err(err) = shutdown {
            self.log_error("player", "failed", &err);
            return Err(err);
        }
        Ok(outcome)
    }

    fn drive(
        &self,
        launcher: &Launcher,
        statuses: &Receiver<PlayerStatus>,
        actions: &Receiver<HotkeyAction>,
    ) -> PlayOutcome {
        loop {
            if let Some(outcome) = self.drain_statuses(statuses) {
                return outcome;
            }
            match actions.recv_timeout(ACTION_POLL) {
                Ok(HotkeyAction::TogglePlay) => {
                    let state = launcher.toggle_play();
                    log_info(
                        self.logger.as_ref(),
                        "hotkeys",
                        "toggle_play",
                        json!({"result": match state {
                            Ok(state) => state.as_str().to_string(),
                            Err(refusal) => refusal.to_string(),
                        }}),
                    );
                    if let Err(refusal) = state {
                        let _ = self.terminal.write_line(&refusal.to_string());
                    }
                }
                Ok(HotkeyAction::Exit) => {
                    log_info(self.logger.as_ref(), "hotkeys", "exit", Value::Null);
                    return PlayOutcome::Exited;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return PlayOutcome::Exited,
            }
        }
    }

    /// Reports every pending status; returns an outcome once the player has
    /// settled for good.
    fn drain_statuses(&self, statuses: &Receiver<PlayerStatus>) -> Option<PlayOutcome> {
        let mut outcome = None;
        while let Ok(status) = statuses.try_recv() {
            self.report_status(&status);
            outcome = match status {
                PlayerStatus::LoopLimitReached { .. } => Some(PlayOutcome::LimitReached),
                PlayerStatus::NothingToPlay => Some(PlayOutcome::NothingToPlay),
                PlayerStatus::Failed(_) => Some(PlayOutcome::Exited),
                _ => outcome,
            };
        }
        outcome
    }

    fn report_status(&self, status: &PlayerStatus) {
        let line = if self.terminal.stdin_is_tty() {
            status.to_string()
        } else {
            structured_fallback_line("player", status_state(status), &status.to_string())
        };
        let _ = self.terminal.write_line(&line);
        let payload = json!({"status": status.to_string()});
        if matches!(status, PlayerStatus::Failed(_)) {
            if let Some(logger) = &self.logger {
                let _ = logger.error("player", "status", payload);
            }
        } else {
            log_info(self.logger.as_ref(), "player", "status", payload);
        }
    }

    fn log_error(&self, component: &str, event_type: &str, err: &ClickError) {
        if let Some(logger) = &self.logger {
            let _ = logger.error(component, event_type, json!({"error": err.to_string()}));
        }
    }
}

fn status_state(status: &PlayerStatus) -> &'static str {
    match status {
        PlayerStatus::Playing | PlayerStatus::LoopCompleted { .. } => "running",
        PlayerStatus::ShuttingDown => "shutting_down",
        _ => "idle",
    }
}

fn log_info(logger: Option<&JsonlLogger>, component: &str, event_type: &str, payload: Value) {
    if let Some(logger) = logger {
        let _ = logger.info(component, event_type, payload);
    }
}
