use crate::errors::ClickError;
use crate::hotkeys::{parse_key, parse_trigger, HotkeyBindings};
use crate::replay::routine_file::DEFAULT_ROUTINE_FILENAME;
use crate::runtime::FileSystem;
use crate::types::{
    DelayMode, PlaybackConfig, DEFAULT_DELAY_SECS, DEFAULT_INTERVAL_SECS, DEFAULT_RANDOMNESS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILENAME: &str = "clickloop.toml";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub routine_path: Option<PathBuf>,
    pub delay: Option<f64>,
    pub interval: Option<f64>,
    pub max_loops: Option<u32>,
    pub randomness: Option<f64>,
    pub delay_mode: Option<DelayMode>,
    pub play_key: Option<String>,
    pub stop_record_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub playback: PlaybackSettings,
    pub hotkeys: HotkeyConfig,
    pub routine: RoutineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSettings {
    pub delay_mode: DelayMode,
    pub delay: f64,
    pub interval: f64,
    pub max_loops: u32,
    pub randomness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HotkeyConfig {
    pub play_pause: String,
    pub stop_record: String,
    pub exit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutineConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackSettings {
                delay_mode: DelayMode::UseRecordedDelay,
                delay: DEFAULT_DELAY_SECS,
                interval: DEFAULT_INTERVAL_SECS,
                max_loops: 0,
                randomness: DEFAULT_RANDOMNESS,
            },
            hotkeys: HotkeyConfig {
                play_pause: "f9".to_string(),
                stop_record: "middle".to_string(),
                exit: "esc".to_string(),
            },
            routine: RoutineConfig {
                path: PathBuf::from(DEFAULT_ROUTINE_FILENAME),
            },
            logging: LoggingConfig {
                path: PathBuf::from(".cache/clickloop/session.jsonl"),
                max_payload_bytes: 4096,
                budget_bytes: 50 * 1024 * 1024,
            },
        }
    }
}

impl AppConfig {
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            delay_mode: self.playback.delay_mode,
            fixed_delay: self.playback.delay,
            interval: self.playback.interval,
            max_loops: self.playback.max_loops,
            jitter_strength: self.playback.randomness,
        }
    }

    pub fn hotkey_bindings(&self) -> Result<HotkeyBindings, ClickError> {
        let play_pause = parse_key(&self.hotkeys.play_pause).ok_or_else(|| {
            ClickError::InvalidConfig(format!(
                "hotkeys.play_pause: unknown key `{}`",
                self.hotkeys.play_pause
            ))
        })?;
        let exit = parse_key(&self.hotkeys.exit).ok_or_else(|| {
            ClickError::InvalidConfig(format!("hotkeys.exit: unknown key `{}`", self.hotkeys.exit))
        })?;
        let stop_record = parse_trigger(&self.hotkeys.stop_record).ok_or_else(|| {
            ClickError::InvalidConfig(format!(
                "hotkeys.stop_record: unknown key `{}`",
                self.hotkeys.stop_record
            ))
        })?;
        Ok(HotkeyBindings {
            play_pause,
            exit,
            stop_record,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    playback: Option<PartialPlaybackSettings>,
    hotkeys: Option<PartialHotkeyConfig>,
    routine: Option<PartialRoutineConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialPlaybackSettings {
    delay_mode: Option<DelayMode>,
    delay: Option<f64>,
    interval: Option<f64>,
    max_loops: Option<u32>,
    randomness: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialHotkeyConfig {
    play_pause: Option<String>,
    stop_record: Option<String>,
    exit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialRoutineConfig {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(overrides: &CliOverrides, fs: &dyn FileSystem) -> Result<AppConfig, ClickError> {
    let mut cfg = AppConfig::default();

    let config_path = match &overrides.config_path {
        Some(path) => Some(path.clone()),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILENAME);
            fs.exists(&fallback).then_some(fallback)
        }
    };

    if let Some(path) = config_path {
        let file_contents = fs.read_to_string(&path)?;
        let partial = parse_partial(&file_contents, &path)?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn parse_partial(raw: &str, path: &Path) -> Result<PartialAppConfig, ClickError> {
    toml::from_str(raw).map_err(|e| ClickError::ConfigParse(format!("{}: {e}", path.display())))
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(playback) = partial.playback {
        if let Some(value) = playback.delay_mode {
            cfg.playback.delay_mode = value;
        }
        if let Some(value) = playback.delay {
            cfg.playback.delay = value;
        }
        if let Some(value) = playback.interval {
            cfg.playback.interval = value;
        }
        if let Some(value) = playback.max_loops {
            cfg.playback.max_loops = value;
        }
        if let Some(value) = playback.randomness {
            cfg.playback.randomness = value;
        }
    }

    if let Some(hotkeys) = partial.hotkeys {
        if let Some(value) = hotkeys.play_pause {
            cfg.hotkeys.play_pause = value;
        }
        if let Some(value) = hotkeys.stop_record {
            cfg.hotkeys.stop_record = value;
        }
        if let Some(value) = hotkeys.exit {
            cfg.hotkeys.exit = value;
        }
    }

    if let Some(routine) = partial.routine {
        if let Some(path) = routine.path {
            cfg.routine.path = path;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = path;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(path) = &overrides.routine_path {
        cfg.routine.path = path.clone();
    }
    if let Some(value) = overrides.delay {
        cfg.playback.delay = value;
    }
    if let Some(value) = overrides.interval {
        cfg.playback.interval = value;
    }
    if let Some(value) = overrides.max_loops {
        cfg.playback.max_loops = value;
    }
    if let Some(value) = overrides.randomness {
        cfg.playback.randomness = value;
    }
    if let Some(value) = overrides.delay_mode {
        cfg.playback.delay_mode = value;
    }
    if let Some(value) = &overrides.play_key {
        cfg.hotkeys.play_pause = value.clone();
    }
    if let Some(value) = &overrides.stop_record_key {
        cfg.hotkeys.stop_record = value.clone();
    }
}

fn non_negative_seconds(name: &str, value: f64) -> Result<(), ClickError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ClickError::InvalidConfig(format!(
            "{name} must be a non-negative number of seconds, got {value}"
        )));
    }
    Ok(())
}

fn validate_config(cfg: &AppConfig) -> Result<(), ClickError> {
    non_negative_seconds("playback.delay", cfg.playback.delay)?;
    non_negative_seconds("playback.interval", cfg.playback.interval)?;

    let randomness = cfg.playback.randomness;
    if !(0.0..=1.0).contains(&randomness) {
        return Err(ClickError::InvalidConfig(format!(
            "playback.randomness must be between 0 and 1, got {randomness}"
        )));
    }

    let bindings = cfg.hotkey_bindings()?;
    if bindings.play_pause == bindings.exit {
        return Err(ClickError::InvalidConfig(
            "hotkeys.play_pause and hotkeys.exit must differ".to_string(),
        ));
    }

    if cfg.routine.path.as_os_str().is_empty() {
        return Err(ClickError::InvalidConfig(
            "routine.path must not be empty".to_string(),
        ));
    }

    Ok(())
}
