pub mod config;
pub mod errors;
pub mod fsm;
pub mod hotkeys;
pub mod input;
pub mod jitter;
pub mod log_retention;
pub mod logging;
pub mod platform;
pub mod replay;
pub mod routine;
pub mod runtime;
pub mod session;
pub mod timeline;
pub mod types;

use clap::{error::ErrorKind, ArgGroup, Parser, ValueEnum};
use config::{load_config, AppConfig, CliOverrides};
use errors::ClickError;
use logging::JsonlLogger;
use platform::{native_input, native_pointer_factory};
use replay::routine_file::{load_routine, save_routine};
use routine::RoutineStore;
use runtime::ProductionRuntime;
use session::{HotkeySlot, PlayOutcome, PlayRefusal, Session, CAPTURE_TIMEOUT};
use std::ffi::OsString;
use std::path::PathBuf;
use timeline::render_timeline;
use types::DelayMode;

const SHOW_WIDTH: u16 = 100;

#[derive(Debug, Clone, Parser)]
#[command(name = "clickloop")]
#[command(about = "Record mouse click routines and replay them in a loop")]
#[command(group(
    ArgGroup::new("mode").args(["record", "play", "show", "delete_event", "clear", "capture_key"])
))]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub routine: Option<PathBuf>,
    /// Record a new routine, replacing the saved one.
    #[arg(long, default_value_t = false)]
    pub record: bool,
    /// Replay the saved routine until the exit hotkey or the loop limit.
    #[arg(long, default_value_t = false)]
    pub play: bool,
    /// Print the saved routine as a table.
    #[arg(long, default_value_t = false)]
    pub show: bool,
    /// Remove the N-th event (1-based) from the saved routine.
    #[arg(long, value_name = "N")]
    pub delete_event: Option<usize>,
    /// Remove every event from the saved routine.
    #[arg(long, default_value_t = false)]
    pub clear: bool,
    /// Press a key to print the config line that binds it.
    #[arg(long, value_enum, value_name = "HOTKEY")]
    pub capture_key: Option<CliHotkeySlot>,
    #[arg(long)]
    pub delay: Option<f64>,
    #[arg(long)]
    pub interval: Option<f64>,
    /// 0 loops forever.
    #[arg(long)]
    pub max_loops: Option<u32>,
    #[arg(long)]
    pub randomness: Option<f64>,
    #[arg(long, value_enum)]
    pub delay_mode: Option<CliDelayMode>,
    #[arg(long)]
    pub play_key: Option<String>,
    /// A key name, or `middle` for the middle mouse button.
    #[arg(long)]
    pub stop_record_key: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliDelayMode {
    Recorded,
    Settings,
}

impl From<CliDelayMode> for DelayMode {
    fn from(value: CliDelayMode) -> Self {
        match value {
            CliDelayMode::Recorded => DelayMode::UseRecordedDelay,
            CliDelayMode::Settings => DelayMode::UseFixedDelay,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliHotkeySlot {
    Play,
    StopRecord,
}

impl From<CliHotkeySlot> for HotkeySlot {
    fn from(value: CliHotkeySlot) -> Self {
        match value {
            CliHotkeySlot::Play => HotkeySlot::PlayPause,
            CliHotkeySlot::StopRecord => HotkeySlot::StopRecord,
        }
    }
}

pub fn run() -> Result<i32, ClickError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &runtime)
}

pub fn run_with_runtime(args: &[OsString], runtime: &ProductionRuntime) -> Result<i32, ClickError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(ClickError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        routine_path: cli.routine.clone(),
        delay: cli.delay,
        interval: cli.interval,
        max_loops: cli.max_loops,
        randomness: cli.randomness,
        delay_mode: cli.delay_mode.map(Into::into),
        play_key: cli.play_key.clone(),
        stop_record_key: cli.stop_record_key.clone(),
    };
    let cfg = load_config(&overrides, runtime.file_system.as_ref())?;

    if cli.record {
        let source = native_input()?;
        let logger = JsonlLogger::from_config(&cfg.logging);
        Session::new(runtime, cfg)?
            .with_logger(logger)
            .record(source.as_ref())?;
        return Ok(0);
    }

    if cli.play {
        return run_play(runtime, cfg);
    }

    if let Some(slot) = cli.capture_key {
        let source = native_input()?;
        let logger = JsonlLogger::from_config(&cfg.logging);
        let captured = Session::new(runtime, cfg)?.with_logger(logger).capture_hotkey(
            source.as_ref(),
            slot.into(),
            CAPTURE_TIMEOUT,
        )?;
        return Ok(if captured.is_some() { 0 } else { 1 });
    }

    if cli.show {
        return run_show(runtime, &cfg);
    }

    if let Some(position) = cli.delete_event {
        return run_delete_event(runtime, &cfg, position);
    }

    if cli.clear {
        save_routine(runtime.file_system.as_ref(), &cfg.routine.path, &[])?;
        runtime.terminal.write_line(&format!(
            "Cleared routine at {}",
            cfg.routine.path.display()
        ))?;
        return Ok(0);
    }

    print_overview(runtime, &cfg)?;
    Ok(0)
}

fn run_play(runtime: &ProductionRuntime, cfg: AppConfig) -> Result<i32, ClickError> {
    let routine = load_routine(runtime.file_system.as_ref(), &cfg.routine.path)?;
    if routine.is_empty() {
        runtime
            .terminal
            .write_line(&PlayRefusal::EmptyRoutine.to_string())?;
        return Ok(1);
    }

    let source = native_input()?;
    let logger = JsonlLogger::from_config(&cfg.logging);
    let outcome = Session::new(runtime, cfg)?.with_logger(logger).play(
        routine,
        source.as_ref(),
        native_pointer_factory(),
    )?;
    Ok(match outcome {
        PlayOutcome::Exited | PlayOutcome::LimitReached => 0,
        PlayOutcome::NothingToPlay => 1,
    })
}

fn run_show(runtime: &ProductionRuntime, cfg: &AppConfig) -> Result<i32, ClickError> {
    let path = &cfg.routine.path;
    let routine = load_routine(runtime.file_system.as_ref(), path)?;
    if routine.is_empty() {
        runtime
            .terminal
            .write_line(&format!("{} has no events.", path.display()))?;
        return Ok(0);
    }
    let title = path.display().to_string();
    runtime
        .terminal
        .draw(&render_timeline(&routine, &title, SHOW_WIDTH)?)?;
    Ok(0)
}

fn run_delete_event(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    position: usize,
) -> Result<i32, ClickError> {
    let path = &cfg.routine.path;
    let store = RoutineStore::new(load_routine(runtime.file_system.as_ref(), path)?);
    let removed = position
        .checked_sub(1)
        .and_then(|index| store.remove(index));
    if removed.is_none() {
        return Err(ClickError::Cli(format!(
            "no event {position}; routine has {} event(s)",
            store.len()
        )));
    }
    save_routine(runtime.file_system.as_ref(), path, &store.snapshot())?;
    runtime.terminal.write_line(&format!(
        "Deleted event {position}; {} event(s) remain.",
        store.len()
    ))?;
    Ok(0)
}

fn print_overview(runtime: &ProductionRuntime, cfg: &AppConfig) -> Result<(), ClickError> {
    let bindings = cfg.hotkey_bindings()?;
    let playback = cfg.playback_config();
    let max_loops = if playback.is_unbounded() {
        "unlimited".to_string()
    } else {
        playback.max_loops.to_string()
    };
    runtime.terminal.write_line(&bindings.controls_legend())?;
    runtime
        .terminal
        .write_line(&format!("routine: {}", cfg.routine.path.display()))?;
    runtime.terminal.write_line(&format!(
        "delay mode: {}  delay: {:.3}s  interval: {:.3}s  max loops: {max_loops}  randomness: {:.2}",
        playback.delay_mode.as_str(),
        playback.fixed_delay,
        playback.interval,
        playback.jitter_strength,
    ))?;
    runtime
        .terminal
        .write_line("Run with --record, --play, --show, --delete-event N, --clear or --capture-key.")?;
    Ok(())
}
