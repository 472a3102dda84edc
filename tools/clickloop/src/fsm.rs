use crate::errors::ClickError;
use crate::types::PlayerState;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStatus {
    Playing,
    Paused,
    LoopCompleted { completed: u32 },
    LoopLimitReached { max_loops: u32 },
    NothingToPlay,
    Failed(String),
    ShuttingDown,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "Playing"),
            Self::Paused => write!(f, "Paused"),
            Self::LoopCompleted { completed } => write!(f, "Completed loop {completed}"),
            Self::LoopLimitReached { .. } => write!(f, "Reached max loop limit."),
            Self::NothingToPlay => write!(f, "No events to play."),
            Self::Failed(reason) => write!(f, "Playback failed: {reason}"),
            Self::ShuttingDown => write!(f, "Shutting down"),
        }
    }
}

pub type StatusSink = Arc<dyn Fn(&PlayerStatus) + Send + Sync>;

pub fn validate_transition(from: PlayerState, to: PlayerState) -> Result<(), ClickError> {
    use PlayerState as S;

    let allowed = match from {
        S::Idle => matches!(to, S::Running | S::ShuttingDown),
        S::Running => matches!(to, S::Idle | S::ShuttingDown),
        S::ShuttingDown => false,
    };

    if !allowed {
        return Err(ClickError::Player(format!(
            "illegal transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

/// Idle ⇄ Running, any state → ShuttingDown. Shared by the player thread and
/// hotkey callbacks.
pub struct PlayerControl {
    state: Mutex<PlayerState>,
    wake: Condvar,
    completed_loops: AtomicU32,
    status: Option<StatusSink>,
}

impl PlayerControl {
    pub fn new(status: Option<StatusSink>) -> Self {
        Self {
            state: Mutex::new(PlayerState::Idle),
            wake: Condvar::new(),
            completed_loops: AtomicU32::new(0),
            status,
        }
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state() == PlayerState::Running
    }

    /// Idle → Running. Returns `false` once shut down.
    pub fn start_clicking(&self) -> bool {
        if !self.transition(PlayerState::Running) {
            return self.is_running();
        }
        self.wake.notify_all();
        self.emit(&PlayerStatus::Playing);
        true
    }

    /// Running → Idle; honored at the loop's next suspension point.
    pub fn stop_clicking(&self) -> bool {
        if !self.transition(PlayerState::Idle) {
            return false;
        }
        self.emit(&PlayerStatus::Paused);
        true
    }

    pub fn toggle(&self) -> PlayerState {
        if self.is_running() {
            self.stop_clicking();
        } else {
            self.start_clicking();
        }
        self.state()
    }

    pub fn shutdown(&self) {
        if self.transition(PlayerState::ShuttingDown) {
            self.emit(&PlayerStatus::ShuttingDown);
        }
        self.wake.notify_all();
    }

    /// Blocks while Idle. Returns the state that released the wait.
    pub fn wait_for_start(&self) -> PlayerState {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while *guard == PlayerState::Idle {
            guard = self
                .wake
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *guard
    }

    /// Running → Idle on the loop's own initiative, reporting why.
    pub fn settle_idle(&self, status: PlayerStatus) {
        self.transition(PlayerState::Idle);
        self.emit(&status);
    }

    pub fn completed_loops(&self) -> u32 {
        self.completed_loops.load(Ordering::SeqCst)
    }

    pub fn record_loop(&self) -> u32 {
        let completed = self.completed_loops.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit(&PlayerStatus::LoopCompleted { completed });
        completed
    }

    pub fn reset_loops(&self) {
        self.completed_loops.store(0, Ordering::SeqCst);
    }

    fn emit(&self, status: &PlayerStatus) {
        if let Some(sink) = &self.status {
            sink(status);
        }
    }

    fn transition(&self, next: PlayerState) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if validate_transition(*guard, next).is_err() {
            return false;
        }
        *guard = next;
        true
    }
}

impl Default for PlayerControl {
    fn default() -> Self {
        Self::new(None)
    }
}
