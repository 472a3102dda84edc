use clickloop::errors::ClickError;
use clickloop::fsm::{PlayerControl, PlayerStatus};
use clickloop::input::{FakePointer, PointerAction};
use clickloop::replay::player::{LoopOutcome, PlaybackEngine, PlaybackFeed, Player, SLEEP_SLICE};
use clickloop::routine::{ClickEvent, MouseButton, Routine, RoutineStore};
use clickloop::runtime::{Clock, FakeClock};
use clickloop::types::{DelayMode, PlaybackConfig, PlayerState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn config(max_loops: u32) -> PlaybackConfig {
    PlaybackConfig {
        delay_mode: DelayMode::UseRecordedDelay,
        fixed_delay: 0.0,
        interval: 0.0,
        max_loops,
        jitter_strength: 0.0,
    }
}

fn clicks(n: i32) -> Routine {
    (0..n)
        .map(|i| ClickEvent::click(MouseButton::Left, 10 * i, 20, Some(0.0)))
        .collect()
}

fn feed(routine: Routine, cfg: PlaybackConfig) -> PlaybackFeed {
    PlaybackFeed::new(RoutineStore::new(routine), cfg)
}

fn engine(control: &Arc<PlayerControl>, pointer: &FakePointer, clock: Arc<dyn Clock>) -> PlaybackEngine {
    PlaybackEngine::new(
        Arc::clone(control),
        Box::new(pointer.clone()),
        clock,
        Box::new(StdRng::seed_from_u64(42)),
    )
}

fn wait_for(control: &PlayerControl, state: PlayerState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while control.state() != state {
        assert!(Instant::now() < deadline, "player never reached {state:?}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn max_loops_two_runs_exactly_two_passes_then_idles() {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new();
    let mut engine = engine(&control, &pointer, Arc::new(FakeClock::new()));
    let feed = feed(clicks(3), config(2));

    control.start_clicking();
    let mut outcomes = Vec::new();
    while control.is_running() && outcomes.len() < 10 {
        outcomes.push(engine.run_iteration(&feed).expect("iteration"));
    }

    assert_eq!(
        outcomes,
        vec![
            LoopOutcome::Completed { completed: 1 },
            LoopOutcome::Completed { completed: 2 }
        ]
    );
    assert_eq!(control.state(), PlayerState::Idle);
    assert_eq!(pointer.presses(), 6);
    assert_eq!(pointer.releases(), 6);

    control.start_clicking();
    assert_eq!(
        engine.run_iteration(&feed).expect("iteration"),
        LoopOutcome::LimitReached
    );
    assert_eq!(control.state(), PlayerState::Idle);
    assert_eq!(pointer.presses(), 6);
}

#[test]
fn unbounded_playback_never_settles_on_its_own() {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new();
    let mut engine = engine(&control, &pointer, Arc::new(FakeClock::new()));
    let feed = feed(clicks(2), config(0));

    control.start_clicking();
    for expected in 1..=25 {
        assert_eq!(
            engine.run_iteration(&feed).expect("iteration"),
            LoopOutcome::Completed { completed: expected }
        );
    }
    assert_eq!(control.state(), PlayerState::Running);
    assert_eq!(control.completed_loops(), 25);
}

#[test]
fn settings_changed_between_loops_apply_to_the_next_pass() {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new();
    let mut engine = engine(&control, &pointer, Arc::new(FakeClock::new()));
    let feed = feed(clicks(1), config(0));

    control.start_clicking();
    for _ in 0..3 {
        engine.run_iteration(&feed).expect("iteration");
    }
    feed.set_config(config(4));

    assert_eq!(
        engine.run_iteration(&feed).expect("iteration"),
        LoopOutcome::Completed { completed: 4 }
    );
    assert_eq!(control.state(), PlayerState::Idle);
    assert_eq!(pointer.presses(), 4);
}

#[test]
fn empty_routine_settles_idle_without_touching_the_pointer() {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new();
    let mut engine = engine(&control, &pointer, Arc::new(FakeClock::new()));

    control.start_clicking();
    assert_eq!(
        engine.run_iteration(&feed(Vec::new(), config(0))).expect("iteration"),
        LoopOutcome::NothingToPlay
    );
    assert_eq!(control.state(), PlayerState::Idle);
    assert!(pointer.actions().is_empty());
}

#[test]
fn stopping_mid_drag_releases_exactly_once() {
    let control = Arc::new(PlayerControl::default());
    let stopper = Arc::clone(&control);
    let pointer = FakePointer::new().with_move_hook(move |moves| {
        if moves == 4 {
            stopper.stop_clicking();
        }
    });
    let mut engine = engine(&control, &pointer, Arc::new(FakeClock::new()));
    let routine = vec![ClickEvent::drag(
        MouseButton::Left,
        (0, 0),
        (100, 0),
        1.0,
        Some(0.0),
    )];

    control.start_clicking();
    let outcome = engine
        .run_iteration(&feed(routine, config(0)))
        .expect("iteration");

    assert_eq!(outcome, LoopOutcome::Cancelled);
    assert_eq!(control.completed_loops(), 0);
    assert_eq!(pointer.presses(), 1);
    assert_eq!(pointer.releases(), 1);

    let actions = pointer.actions();
    assert_eq!(actions.last(), Some(&PointerAction::Release(MouseButton::Left)));
    let last_x = actions
        .iter()
        .rev()
        .find_map(|action| match action {
            PointerAction::MoveTo(x, _) => Some(*x),
            _ => None,
        })
        .expect("a move");
    assert!(last_x < 100, "drag should stop short, ended at {last_x}");
}

#[test]
fn failing_move_during_drag_still_releases_the_button() {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new().failing_on_call(4);
    let mut engine = engine(&control, &pointer, Arc::new(FakeClock::new()));
    let routine = vec![ClickEvent::drag(
        MouseButton::Right,
        (0, 0),
        (50, 50),
        0.5,
        Some(0.0),
    )];

    control.start_clicking();
    let err = engine
        .run_iteration(&feed(routine, config(0)))
        .expect_err("device failure");

    assert!(matches!(err, ClickError::Device(_)));
    assert_eq!(
        pointer.actions(),
        vec![
            PointerAction::MoveTo(0, 0),
            PointerAction::Press(MouseButton::Right),
            PointerAction::MoveTo(0, 0),
            PointerAction::Release(MouseButton::Right),
        ]
    );
}

fn slept_for(mode: DelayMode) -> f64 {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new();
    let clock = FakeClock::new();
    let mut engine = engine(&control, &pointer, Arc::new(clock.clone()));
    let routine = vec![
        ClickEvent::click(MouseButton::Left, 1, 1, Some(0.5)),
        ClickEvent::click(MouseButton::Left, 2, 2, None),
    ];
    let cfg = PlaybackConfig {
        delay_mode: mode,
        fixed_delay: 2.0,
        ..config(0)
    };

    control.start_clicking();
    engine.run_iteration(&feed(routine, cfg)).expect("iteration");
    clock.total_slept().as_secs_f64()
}

#[test]
fn recorded_mode_uses_captured_gaps_and_falls_back_to_fixed_delay() {
    // Two holds of 0.05..=0.1s each ride on top of the pre-delays.
    let recorded = slept_for(DelayMode::UseRecordedDelay);
    assert!((2.6 - 1e-6..=2.7 + 1e-6).contains(&recorded), "{recorded}");

    let fixed = slept_for(DelayMode::UseFixedDelay);
    assert!((4.1 - 1e-6..=4.2 + 1e-6).contains(&fixed), "{fixed}");
}

struct StopAfterSleeps {
    inner: FakeClock,
    control: Arc<PlayerControl>,
    after: usize,
    count: AtomicUsize,
}

impl Clock for StopAfterSleeps {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) {
        self.inner.sleep(duration);
        if self.count.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.control.stop_clicking();
        }
    }
}

#[test]
fn long_pre_delay_is_cut_short_by_a_stop_request() {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new();
    let inner = FakeClock::new();
    let clock = Arc::new(StopAfterSleeps {
        inner: inner.clone(),
        control: Arc::clone(&control),
        after: 3,
        count: AtomicUsize::new(0),
    });
    let mut engine = engine(&control, &pointer, clock);
    let routine = vec![ClickEvent::click(MouseButton::Left, 5, 5, Some(30.0))];

    control.start_clicking();
    let outcome = engine
        .run_iteration(&feed(routine, config(0)))
        .expect("iteration");

    assert_eq!(outcome, LoopOutcome::Cancelled);
    assert!(pointer.actions().is_empty());
    assert_eq!(inner.total_slept(), SLEEP_SLICE * 3);
}

#[test]
fn player_thread_honors_the_loop_limit_and_reports_status() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let pointer = FakePointer::new();
    let player = Player::spawn_with_rng(
        feed(clicks(2), config(2)),
        pointer.factory(),
        Arc::new(FakeClock::new()),
        Some(Arc::new(move |status: &PlayerStatus| {
            sink.lock().expect("seen lock").push(status.to_string());
        })),
        Box::new(StdRng::seed_from_u64(9)),
    )
    .expect("spawn");

    let control = player.control();
    assert!(player.start_clicking());
    wait_for(&control, PlayerState::Idle);

    assert_eq!(pointer.presses(), 4);
    assert_eq!(control.completed_loops(), 2);
    player.shutdown().expect("clean shutdown");

    let seen = seen.lock().expect("seen lock").clone();
    assert!(seen.contains(&"Completed loop 2".to_string()), "{seen:?}");
    assert!(seen.contains(&"Reached max loop limit.".to_string()), "{seen:?}");
    assert_eq!(seen.last().map(String::as_str), Some("Shutting down"));
}

#[test]
fn device_construction_failure_surfaces_from_spawn() {
    let result = Player::spawn(
        PlaybackFeed::default(),
        Box::new(|| Err(ClickError::Device("no display".to_string()))),
        Arc::new(FakeClock::new()),
        None,
    );
    assert!(matches!(result, Err(ClickError::Device(message)) if message == "no display"));
}

#[test]
fn playback_failure_shuts_the_player_down_and_is_returned_on_join() {
    let pointer = FakePointer::new().failing_on_call(2);
    let player = Player::spawn(
        feed(clicks(1), config(0)),
        pointer.factory(),
        Arc::new(FakeClock::new()),
        None,
    )
    .expect("spawn");

    let control = player.control();
    player.start_clicking();
    wait_for(&control, PlayerState::ShuttingDown);

    assert!(matches!(player.shutdown(), Err(ClickError::Device(_))));
    assert_eq!(pointer.presses(), 0);
}

#[test]
fn replacing_the_routine_restarts_loop_counting() {
    let pointer = FakePointer::new();
    let player = Player::spawn(
        feed(clicks(1), config(1)),
        pointer.factory(),
        Arc::new(FakeClock::new()),
        None,
    )
    .expect("spawn");
    let control = player.control();

    player.start_clicking();
    wait_for(&control, PlayerState::Idle);
    assert_eq!(control.completed_loops(), 1);

    player.replace_routine(clicks(2));
    assert_eq!(control.completed_loops(), 0);
    player.start_clicking();
    wait_for(&control, PlayerState::Idle);
    assert_eq!(pointer.presses(), 3);
    player.shutdown().expect("clean shutdown");
}

fn jittered_pass(routine: Routine, seed: u64) -> (Vec<PointerAction>, f64) {
    let control = Arc::new(PlayerControl::default());
    let pointer = FakePointer::new();
    let clock = FakeClock::new();
    let mut engine = PlaybackEngine::new(
        Arc::clone(&control),
        Box::new(pointer.clone()),
        Arc::new(clock.clone()),
        Box::new(StdRng::seed_from_u64(seed)),
    );
    let cfg = PlaybackConfig {
        jitter_strength: 1.0,
        ..config(1)
    };

    control.start_clicking();
    assert_eq!(
        engine.run_iteration(&feed(routine, cfg)).expect("iteration"),
        LoopOutcome::Completed { completed: 1 }
    );
    (pointer.actions(), clock.total_slept().as_secs_f64())
}

fn moves(actions: &[PointerAction]) -> Vec<(i32, i32)> {
    actions
        .iter()
        .filter_map(|action| match action {
            PointerAction::MoveTo(x, y) => Some((*x, *y)),
            _ => None,
        })
        .collect()
}

fn within(point: (i32, i32), recorded: (i32, i32), spread: (i32, i32)) -> bool {
    (point.0 - recorded.0).abs() <= spread.0 && (point.1 - recorded.1).abs() <= spread.1
}

#[test]
fn full_strength_jitter_moves_clicks_within_a_tenth_of_the_coordinate() {
    let mut moved = false;
    for seed in 0..20 {
        let routine = vec![ClickEvent::click(MouseButton::Left, 500, 300, Some(0.0))];
        let (actions, _) = jittered_pass(routine, seed);
        let points = moves(&actions);
        assert_eq!(points.len(), 1);
        assert!(within(points[0], (500, 300), (50, 30)), "seed {seed}: {:?}", points[0]);
        moved |= points[0] != (500, 300);
    }
    assert!(moved, "no click ever left the recorded point");
}

#[test]
fn full_strength_jitter_stretches_the_pre_delay_by_up_to_half() {
    // Without jitter the wait would be 2.0s plus a 0.05..=0.3s hold.
    let mut off_nominal = false;
    for seed in 0..20 {
        let routine = vec![ClickEvent::click(MouseButton::Left, 10, 10, Some(2.0))];
        let (_, slept) = jittered_pass(routine, seed);
        assert!((1.05 - 1e-6..=3.3 + 1e-6).contains(&slept), "seed {seed}: {slept}");
        off_nominal |= !(2.05..=2.3).contains(&slept);
    }
    assert!(off_nominal, "pre-delay never moved off the recorded gap");
}

#[test]
fn drag_endpoints_are_jittered_independently() {
    let mut offsets = Vec::new();
    for seed in 0..20 {
        let routine = vec![ClickEvent::drag(
            MouseButton::Left,
            (100, 100),
            (400, 200),
            0.5,
            Some(0.0),
        )];
        let (actions, _) = jittered_pass(routine, seed);
        let points = moves(&actions);
        // Positioning move plus the path from t=0 to t=1.
        assert_eq!(points.len(), 2 + 30);
        let (start, end) = (points[0], points[points.len() - 1]);
        assert_eq!(points[1], start);
        assert!(within(start, (100, 100), (10, 10)), "seed {seed}: start {start:?}");
        assert!(within(end, (400, 200), (40, 20)), "seed {seed}: end {end:?}");
        offsets.push((
            (start.0 - 100, start.1 - 100),
            (end.0 - 400, end.1 - 200),
        ));
    }
    assert!(
        offsets.iter().any(|(start, end)| start != end),
        "start and end always shifted together: {offsets:?}"
    );
}
