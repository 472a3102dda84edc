//! Turns delivered press/release notifications into a routine.
//!
//! `RecorderCore` is the sequential bookkeeping (held buttons, last release
//! time, output list). `Recorder` subscribes it to an `InputSource` and owns
//! the stop-trigger and callback plumbing.

use crate::errors::ClickError;
use crate::hotkeys::Trigger;
use crate::input::{CancelHandle, InputEvent, InputSource, Subscription};
use crate::routine::{ClickEvent, MouseButton, Routine};
use crate::runtime::Clock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderStatus {
    Recording { stop_hint: String },
    Recorded { count: usize },
    Cancelled { count: usize },
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recording { stop_hint } => write!(f, "Recording... {stop_hint} to stop."),
            Self::Recorded { count } => write!(f, "Recorded {count} event(s)."),
            Self::Cancelled { count } => {
                write!(f, "Recording cancelled after {count} event(s).")
            }
        }
    }
}

pub type EventCallback = Arc<Mutex<dyn FnMut(&ClickEvent, usize) + Send>>;
pub type DoneCallback = Arc<dyn Fn(Routine) + Send + Sync>;
pub type RecorderStatusSink = Arc<dyn Fn(&RecorderStatus) + Send + Sync>;

fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

#[derive(Debug)]
pub struct RecorderCore {
    held: HashMap<MouseButton, (i32, i32, Instant)>,
    last_event_at: Instant,
    events: Routine,
}

impl RecorderCore {
    pub fn new(started_at: Instant) -> Self {
        Self {
            held: HashMap::new(),
            last_event_at: started_at,
            events: Vec::new(),
        }
    }

    /// A second press without a release replaces the first.
    pub fn press(&mut self, button: MouseButton, x: i32, y: i32, at: Instant) {
        self.held.insert(button, (x, y, at));
    }

    /// Returns the emitted event, or `None` for a release with no open press.
    pub fn release(&mut self, button: MouseButton, x: i32, y: i32, at: Instant) -> Option<ClickEvent> {
        let (press_x, press_y, pressed_at) = self.held.remove(&button)?;
        let delay = round_millis(
            pressed_at
                .saturating_duration_since(self.last_event_at)
                .as_secs_f64(),
        );
        let duration = round_millis(at.saturating_duration_since(pressed_at).as_secs_f64());
        self.last_event_at = at;

        let event =
            ClickEvent::from_press_release(button, (press_x, press_y), (x, y), delay, duration);
        self.events.push(event);
        Some(event)
    }

    pub fn events(&self) -> &[ClickEvent] {
        &self.events
    }
}

struct Session {
    core: RecorderCore,
    on_event: Option<EventCallback>,
    on_done: Option<DoneCallback>,
    finished: bool,
    cancel: Option<CancelHandle>,
}

enum Step {
    Nothing,
    Recorded(ClickEvent, usize),
    Finished,
}

pub struct Recorder {
    clock: Arc<dyn Clock>,
    stop_trigger: Trigger,
    status: Option<RecorderStatusSink>,
    on_event: Option<EventCallback>,
    on_done: Option<DoneCallback>,
    shared: Arc<Mutex<Session>>,
    subscription: Option<Subscription>,
}

impl Recorder {
    pub fn new(clock: Arc<dyn Clock>, stop_trigger: Trigger) -> Self {
        let core = RecorderCore::new(clock.now());
        Self {
            clock,
            stop_trigger,
            status: None,
            on_event: None,
            on_done: None,
            shared: Arc::new(Mutex::new(Session {
                core,
                on_event: None,
                on_done: None,
                finished: true,
                cancel: None,
            })),
            subscription: None,
        }
    }

    /// Invoked on the delivery thread with each event and its 0-based index.
    pub fn on_event(mut self, callback: impl FnMut(&ClickEvent, usize) + Send + 'static) -> Self {
        self.on_event = Some(Arc::new(Mutex::new(callback)));
        self
    }

    /// Invoked once per recording with the final routine when the stop
    /// trigger fires.
    pub fn on_done(mut self, callback: impl Fn(Routine) + Send + Sync + 'static) -> Self {
        self.on_done = Some(Arc::new(callback));
        self
    }

    pub fn with_status(mut self, sink: RecorderStatusSink) -> Self {
        self.status = Some(sink);
        self
    }

    /// Starts a fresh recording, discarding any previous take. Each recording
    /// gets its own handle on the registered callbacks.
    pub fn start(&mut self, source: &dyn InputSource) -> Result<(), ClickError> {
        self.stop();
        {
            let mut session = lock(&self.shared);
            session.core = RecorderCore::new(self.clock.now());
            session.on_event = self.on_event.clone();
            session.on_done = self.on_done.clone();
            session.finished = false;
            session.cancel = None;
        }

        let handler = {
            let shared = Arc::clone(&self.shared);
            let clock = Arc::clone(&self.clock);
            let status = self.status.clone();
            let trigger = self.stop_trigger;
            move |event: &InputEvent| handle_input(&shared, clock.as_ref(), trigger, status.as_ref(), event)
        };

        let subscription = match source.subscribe(Box::new(handler)) {
            Ok(subscription) => subscription,
            Err(err) => {
                lock(&self.shared).finished = true;
                return Err(err);
            }
        };
        lock(&self.shared).cancel = Some(subscription.cancel_handle());
        self.subscription = Some(subscription);

        emit(
            self.status.as_ref(),
            &RecorderStatus::Recording {
                stop_hint: self.stop_trigger.describe(),
            },
        );
        Ok(())
    }

    /// Forced cancellation; safe to call repeatedly. Returns the events
    /// captured so far without invoking the completion callback.
    pub fn stop(&mut self) -> Routine {
        let (events, was_active) = {
            let mut session = lock(&self.shared);
            let was_active = !session.finished;
            session.finished = true;
            session.on_done = None;
            if let Some(cancel) = session.cancel.take() {
                cancel.cancel();
            }
            (session.core.events().to_vec(), was_active)
        };
        self.subscription = None;
        if was_active {
            emit(
                self.status.as_ref(),
                &RecorderStatus::Cancelled {
                    count: events.len(),
                },
            );
        }
        events
    }

    pub fn is_recording(&self) -> bool {
        !lock(&self.shared).finished
    }

    /// Copy of the events captured so far.
    pub fn events(&self) -> Routine {
        lock(&self.shared).core.events().to_vec()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.shared).cancel.take() {
            cancel.cancel();
        }
    }
}

fn lock(shared: &Mutex<Session>) -> MutexGuard<'_, Session> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit(sink: Option<&RecorderStatusSink>, status: &RecorderStatus) {
    if let Some(sink) = sink {
        sink(status);
    }
}

fn handle_input(
    shared: &Mutex<Session>,
    clock: &dyn Clock,
    trigger: Trigger,
    status: Option<&RecorderStatusSink>,
    event: &InputEvent,
) {
    let mut session = lock(shared);
    if session.finished {
        return;
    }

    let step = if trigger.matches(event) {
        Step::Finished
    } else {
        match *event {
            InputEvent::ButtonPress { button, x, y } => {
                if let Some(button) = button.actionable() {
                    session.core.press(button, x, y, clock.now());
                }
                Step::Nothing
            }
            InputEvent::ButtonRelease { button, x, y } => {
                let recorded = button
                    .actionable()
                    .and_then(|button| session.core.release(button, x, y, clock.now()));
                match recorded {
                    Some(recorded) => Step::Recorded(recorded, session.core.events().len() - 1),
                    None => Step::Nothing,
                }
            }
            InputEvent::KeyPress(_) => Step::Nothing,
        }
    };

    match step {
        Step::Nothing => {}
        Step::Recorded(recorded, index) => {
            let Some(callback) = session.on_event.clone() else {
                return;
            };
            drop(session);
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *callback)(&recorded, index);
        }
        Step::Finished => {
            session.finished = true;
            if let Some(cancel) = session.cancel.take() {
                cancel.cancel();
            }
            let on_done = session.on_done.take();
            let events = session.core.events().to_vec();
            drop(session);

            emit(
                status,
                &RecorderStatus::Recorded {
                    count: events.len(),
                },
            );
            if let Some(on_done) = on_done {
                on_done(events);
            }
        }
    }
}
