use serde::{Deserialize, Serialize};

pub const DEFAULT_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_RANDOMNESS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelayMode {
    /// Wait for the gap captured at record time, falling back to the fixed delay.
    #[serde(rename = "recorded")]
    UseRecordedDelay,
    /// Always wait for the fixed delay.
    #[serde(rename = "settings")]
    UseFixedDelay,
}

impl DelayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UseRecordedDelay => "recorded",
            Self::UseFixedDelay => "settings",
        }
    }
}

/// Settings read by the player at the top of every loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    pub delay_mode: DelayMode,
    pub fixed_delay: f64,
    pub interval: f64,
    pub max_loops: u32,
    pub jitter_strength: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            delay_mode: DelayMode::UseRecordedDelay,
            fixed_delay: DEFAULT_DELAY_SECS,
            interval: DEFAULT_INTERVAL_SECS,
            max_loops: 0,
            jitter_strength: DEFAULT_RANDOMNESS,
        }
    }
}

impl PlaybackConfig {
    pub fn is_unbounded(&self) -> bool {
        self.max_loops == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Idle,
    Running,
    ShuttingDown,
}

impl PlayerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
        }
    }
}
