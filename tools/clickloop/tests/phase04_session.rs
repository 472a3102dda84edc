use clickloop::config::AppConfig;
use clickloop::errors::ClickError;
use clickloop::input::{FakeInputSource, FakePointer, Key, PointerButton};
use clickloop::logging::JsonlLogger;
use clickloop::replay::routine_file::load_routine;
use clickloop::routine::{ClickEvent, EventKind, MouseButton, Routine};
use clickloop::runtime::{
    Clock, FakeClock, FakeFileSystem, FakeTerminal, ProductionClock, ProductionRuntime,
};
use clickloop::hotkeys::Trigger;
use clickloop::session::{HotkeySlot, PlayOutcome, Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const ROUTINE_PATH: &str = "/routines/take.json";

struct Fixture {
    fs: FakeFileSystem,
    terminal: FakeTerminal,
    runtime: ProductionRuntime,
}

fn fixture(clock: Arc<dyn Clock>, is_tty: bool) -> Fixture {
    let fs = FakeFileSystem::default();
    let terminal = FakeTerminal::new(is_tty);
    let runtime = ProductionRuntime {
        clock,
        file_system: Arc::new(fs.clone()),
        terminal: Arc::new(terminal.clone()),
    };
    Fixture {
        fs,
        terminal,
        runtime,
    }
}

fn config(max_loops: u32, interval: f64) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.routine.path = PathBuf::from(ROUTINE_PATH);
    cfg.playback.max_loops = max_loops;
    cfg.playback.interval = interval;
    cfg.playback.delay = 0.0;
    cfg.playback.randomness = 0.0;
    cfg
}

fn wait_for_subscriber(source: &FakeInputSource) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while source.active_subscribers() == 0 {
        assert!(Instant::now() < deadline, "nothing subscribed to input");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Drives `script` against `source` once the session under test has subscribed.
fn operator(
    source: &FakeInputSource,
    script: impl FnOnce(&FakeInputSource) + Send + 'static,
) -> JoinHandle<()> {
    let source = source.clone();
    thread::spawn(move || {
        wait_for_subscriber(&source);
        script(&source);
    })
}

fn two_clicks() -> Routine {
    vec![
        ClickEvent::click(MouseButton::Left, 10, 10, Some(0.0)),
        ClickEvent::click(MouseButton::Right, 20, 20, Some(0.0)),
    ]
}

#[test]
fn recording_saves_the_take_and_draws_the_timeline() {
    let clock = FakeClock::new();
    let fx = fixture(Arc::new(clock.clone()), true);
    let session = Session::new(&fx.runtime, config(0, 0.0)).expect("session");
    let source = FakeInputSource::new();

    let driver = operator(&source, move |input| {
        clock.advance(Duration::from_millis(300));
        input.press(PointerButton::Left, 50, 60);
        clock.advance(Duration::from_millis(90));
        input.release(PointerButton::Left, 51, 60);
        clock.advance(Duration::from_millis(500));
        input.press(PointerButton::Left, 0, 0);
        clock.advance(Duration::from_millis(400));
        input.release(PointerButton::Left, 200, 0);
        input.press(PointerButton::Middle, 0, 0);
    });

    let routine = session.record(&source).expect("record");
    driver.join().expect("driver");

    let kinds = routine.iter().map(ClickEvent::kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![EventKind::Click, EventKind::Drag]);
    assert_eq!(routine[0].delay, Some(0.3));
    assert_eq!(
        load_routine(&fx.fs, Path::new(ROUTINE_PATH)).expect("saved routine"),
        routine
    );

    let lines = fx.terminal.written_lines();
    assert!(lines[0].starts_with("Index"), "{lines:?}");
    assert!(lines.iter().any(|l| l.starts_with("1     click")), "{lines:?}");
    assert!(lines.iter().any(|l| l.starts_with("2     drag")), "{lines:?}");
    assert!(lines.contains(&"Recording... Middle Click to stop.".to_string()));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Saved 2 event(s) to /routines/take.json")
    );

    let frames = fx.terminal.drawn_frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("Recorded"));
    assert_eq!(source.active_subscribers(), 0);
}

#[test]
fn recording_fails_cleanly_when_input_is_unavailable() {
    let fx = fixture(Arc::new(FakeClock::new()), true);
    let session = Session::new(&fx.runtime, config(0, 0.0)).expect("session");
    let source = FakeInputSource::new();
    source.set_fail_next(ClickError::InputUnavailable("no display".to_string()));

    let err = session.record(&source).expect_err("no input");
    assert!(matches!(err, ClickError::InputUnavailable(_)));
    assert!(fx.fs.contents(Path::new(ROUTINE_PATH)).is_none());
}

#[test]
fn play_stops_at_the_loop_limit() {
    let fx = fixture(Arc::new(FakeClock::new()), true);
    let session = Session::new(&fx.runtime, config(3, 0.25)).expect("session");
    let source = FakeInputSource::new();
    let pointer = FakePointer::new();

    let outcome = session
        .play(two_clicks(), &source, pointer.factory())
        .expect("play");

    assert_eq!(outcome, PlayOutcome::LimitReached);
    assert_eq!(pointer.presses(), 6);
    assert_eq!(pointer.releases(), 6);
    assert_eq!(source.active_subscribers(), 0);

    let lines = fx.terminal.written_lines();
    assert!(lines[0].starts_with("Playing 2 event(s) ["), "{lines:?}");
    assert!(lines.contains(&"Completed loop 3".to_string()), "{lines:?}");
    assert!(lines.contains(&"Reached max loop limit.".to_string()), "{lines:?}");
}

#[test]
fn exit_hotkey_ends_unbounded_playback() {
    let fx = fixture(Arc::new(ProductionClock), true);
    let session = Session::new(&fx.runtime, config(0, 0.01)).expect("session");
    let source = FakeInputSource::new();
    let pointer = FakePointer::new();

    let watched = pointer.clone();
    let driver = operator(&source, move |input| {
        let deadline = Instant::now() + Duration::from_secs(5);
        while watched.presses() < 4 {
            assert!(Instant::now() < deadline, "player never clicked");
            thread::sleep(Duration::from_millis(2));
        }
        input.key(Key::Escape);
    });

    let outcome = session
        .play(two_clicks(), &source, pointer.factory())
        .expect("play");
    driver.join().expect("driver");

    assert_eq!(outcome, PlayOutcome::Exited);
    assert_eq!(pointer.presses(), pointer.releases());
    assert!(fx
        .terminal
        .written_lines()
        .iter()
        .any(|line| line == "Shutting down"));
}

#[test]
fn play_pause_hotkey_pauses_before_exit() {
    let fx = fixture(Arc::new(ProductionClock), true);
    let session = Session::new(&fx.runtime, config(0, 0.01)).expect("session");
    let source = FakeInputSource::new();
    let pointer = FakePointer::new();

    let terminal = fx.terminal.clone();
    let driver = operator(&source, move |input| {
        input.key(Key::F(9));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !terminal.written_lines().iter().any(|l| l == "Paused") {
            assert!(Instant::now() < deadline, "player never paused");
            thread::sleep(Duration::from_millis(2));
        }
        input.key(Key::Escape);
    });

    let outcome = session
        .play(two_clicks(), &source, pointer.factory())
        .expect("play");
    driver.join().expect("driver");

    assert_eq!(outcome, PlayOutcome::Exited);
    assert_eq!(pointer.presses(), pointer.releases());
}

#[test]
fn empty_routine_is_refused_before_the_player_starts() {
    let fx = fixture(Arc::new(FakeClock::new()), true);
    let session = Session::new(&fx.runtime, config(0, 0.0)).expect("session");
    let source = FakeInputSource::new();
    let pointer = FakePointer::new();

    let outcome = session
        .play(Vec::new(), &source, pointer.factory())
        .expect("play");

    assert_eq!(outcome, PlayOutcome::NothingToPlay);
    assert!(pointer.actions().is_empty());
    assert_eq!(
        fx.terminal.written_lines(),
        vec!["Record or load a routine first.".to_string()]
    );
}

#[test]
fn device_failure_is_returned_and_logged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("session.jsonl");
    let fx = fixture(Arc::new(FakeClock::new()), false);
    let session = Session::new(&fx.runtime, config(0, 0.0))
        .expect("session")
        .with_logger(JsonlLogger::new(&log_path));
    let source = FakeInputSource::new();
    let pointer = FakePointer::new().failing_on_call(3);

    let err = session
        .play(two_clicks(), &source, pointer.factory())
        .expect_err("device failure");
    assert!(matches!(err, ClickError::Device(_)));

    let lines = fx.terminal.written_lines();
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("component=player state=idle message=Playback failed")),
        "{lines:?}"
    );

    let log = std::fs::read_to_string(&log_path).expect("log written");
    assert!(log.contains("\"playback_start\""));
    assert!(log.contains("\"level\":\"error\""));
}

#[test]
fn invalid_hotkey_config_is_rejected_by_the_session() {
    let fx = fixture(Arc::new(FakeClock::new()), true);
    let mut cfg = config(0, 0.0);
    cfg.hotkeys.exit = "hyper".to_string();

    let err = Session::new(&fx.runtime, cfg).err().expect("bad key");
    assert!(matches!(err, ClickError::InvalidConfig(message) if message.contains("hotkeys.exit")));
}

#[test]
fn captured_play_key_is_printed_as_a_config_line() {
    let fx = fixture(Arc::new(FakeClock::new()), true);
    let session = Session::new(&fx.runtime, config(0, 0.0)).expect("session");
    let source = FakeInputSource::new();

    let driver = operator(&source, |input| {
        input.press(PointerButton::Middle, 0, 0);
        input.key(Key::F(7));
    });
    let captured = session
        .capture_hotkey(&source, HotkeySlot::PlayPause, Duration::from_secs(5))
        .expect("capture");
    driver.join().expect("driver");

    assert_eq!(captured, Some(Trigger::Key(Key::F(7))));
    let lines = fx.terminal.written_lines();
    assert!(lines.contains(&"[hotkeys]".to_string()), "{lines:?}");
    assert_eq!(lines.last().map(String::as_str), Some("play_pause = \"f7\""));
    assert_eq!(source.active_subscribers(), 0);
}

#[test]
fn stop_trigger_capture_accepts_middle_click_and_warns_on_exit_clash() {
    let fx = fixture(Arc::new(FakeClock::new()), true);
    let session = Session::new(&fx.runtime, config(0, 0.0)).expect("session");
    let source = FakeInputSource::new();

    let driver = operator(&source, |input| input.press(PointerButton::Middle, 3, 3));
    let captured = session
        .capture_hotkey(&source, HotkeySlot::StopRecord, Duration::from_secs(5))
        .expect("capture");
    driver.join().expect("driver");
    assert_eq!(captured, Some(Trigger::MiddleButton));
    assert!(fx
        .terminal
        .written_lines()
        .contains(&"stop_record = \"middle\"".to_string()));

    let driver = operator(&source, |input| input.key(Key::Escape));
    session
        .capture_hotkey(&source, HotkeySlot::StopRecord, Duration::from_secs(5))
        .expect("capture");
    driver.join().expect("driver");
    assert_eq!(
        fx.terminal.written_lines().last().map(String::as_str),
        Some("Warning: esc is also the exit key.")
    );
}

#[test]
fn capture_timeout_leaves_hotkeys_unchanged() {
    let fx = fixture(Arc::new(FakeClock::new()), true);
    let session = Session::new(&fx.runtime, config(0, 0.0)).expect("session");
    let source = FakeInputSource::new();

    let captured = session
        .capture_hotkey(&source, HotkeySlot::PlayPause, Duration::from_millis(20))
        .expect("capture");
    assert_eq!(captured, None);
    assert_eq!(
        fx.terminal.written_lines().last().map(String::as_str),
        Some("Nothing pressed within 20ms; hotkeys unchanged.")
    );
}
