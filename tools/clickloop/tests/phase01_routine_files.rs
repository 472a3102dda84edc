use clickloop::errors::ClickError;
use clickloop::replay::routine_file::{load_routine, render_routine, save_routine};
use clickloop::routine::{ClickEvent, EventAction, EventKind, MouseButton};
use clickloop::runtime::{FileSystem, ProductionFileSystem};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/routines")
        .join(name)
}

#[test]
fn mixed_fixture_loads_in_file_order() {
    let routine = load_routine(&ProductionFileSystem, &fixture("mixed.json")).expect("load");

    assert_eq!(routine.len(), 3);
    assert_eq!(
        routine[0],
        ClickEvent::click(MouseButton::Left, 640, 360, Some(0.75))
    );
    assert_eq!(
        routine[1],
        ClickEvent::drag(MouseButton::Left, (100, 200), (400, 210), 0.42, Some(1.25))
    );
    assert_eq!(routine[2].button, MouseButton::Right);
    assert_eq!(routine[2].delay, Some(0.0));
}

#[test]
fn legacy_fixture_fills_in_defaults() {
    let routine = load_routine(&ProductionFileSystem, &fixture("legacy.json")).expect("load");

    let kinds = routine.iter().map(ClickEvent::kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![EventKind::Click, EventKind::Click, EventKind::Drag]);
    assert_eq!(routine[0].button, MouseButton::Left);
    assert_eq!(routine[1].button, MouseButton::Right);
    assert!(routine.iter().all(|event| event.delay.is_none()));
    assert!(matches!(
        routine[2].action,
        EventAction::Drag { end_x: 90, end_y: 0, duration } if (duration - 0.3).abs() < 1e-9
    ));
}

#[test]
fn malformed_fixture_is_rejected_with_path_and_position() {
    let path = fixture("malformed.json");
    let err = load_routine(&ProductionFileSystem, &path).expect_err("malformed");

    let ClickError::RoutineParse(message) = err else {
        panic!("expected a routine parse error, got {err:?}");
    };
    assert!(message.contains("malformed.json"), "{message}");
    assert!(message.contains("event 2"), "{message}");
    assert!(message.contains("end_x"), "{message}");
}

#[test]
fn empty_fixture_is_an_empty_routine() {
    let routine = load_routine(&ProductionFileSystem, &fixture("empty.json")).expect("load");
    assert!(routine.is_empty());
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_routine(&ProductionFileSystem, &fixture("does-not-exist.json"))
        .expect_err("missing");
    assert!(matches!(err, ClickError::Io(_)));
}

#[test]
fn saving_into_a_fresh_directory_round_trips_the_fixture() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("nested/routines/copy.json");
    let routine = load_routine(&ProductionFileSystem, &fixture("mixed.json")).expect("load");

    save_routine(&ProductionFileSystem, &target, &routine).expect("save");

    assert!(ProductionFileSystem.exists(&target));
    assert_eq!(
        load_routine(&ProductionFileSystem, &target).expect("reload"),
        routine
    );
    let on_disk = ProductionFileSystem.read_to_string(&target).expect("read");
    assert_eq!(on_disk, render_routine(&routine).expect("render"));
    assert!(on_disk.starts_with("[\n    {"));
}

#[test]
fn saving_legacy_events_keeps_delay_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("legacy.json");
    let routine = load_routine(&ProductionFileSystem, &fixture("legacy.json")).expect("load");

    save_routine(&ProductionFileSystem, &target, &routine).expect("save");

    let on_disk = ProductionFileSystem.read_to_string(&target).expect("read");
    assert!(!on_disk.contains("delay"));
    assert!(on_disk.contains("\"duration\": 0.3"));
}
