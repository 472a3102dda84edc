
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Pixels of movement, in either axis, beyond which a press/release pair is a drag.
pub const DRAG_THRESHOLD_PX: u32 = 5;

/// Drag length assumed for persisted drags that carry no duration.
pub const DEFAULT_DRAG_DURATION_SECS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

impl MouseButton {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Drag,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Drag => "drag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventAction {
    Click,
    Drag { end_x: i32, end_y: i32, duration: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEvent {
    pub button: MouseButton,
    pub x: i32,
    pub y: i32,
    /// Seconds since the previous event's release. `None` for legacy records.
    pub delay: Option<f64>,
    pub action: EventAction,
}

impl ClickEvent {
    pub fn click(button: MouseButton, x: i32, y: i32, delay: Option<f64>) -> Self {
        Self {
            button,
            x,
            y,
            delay,
            action: EventAction::Click,
        }
    }

    pub fn drag(
        button: MouseButton,
        (x, y): (i32, i32),
        (end_x, end_y): (i32, i32),
        duration: f64,
        delay: Option<f64>,
    ) -> Self {
        Self {
            button,
            x,
            y,
            delay,
            action: EventAction::Drag {
                end_x,
                end_y,
                duration,
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.action {
            EventAction::Click => EventKind::Click,
            EventAction::Drag { .. } => EventKind::Drag,
        }
    }

    /// Classifies a press/release pair by displacement.
    pub fn from_press_release(
        button: MouseButton,
        press: (i32, i32),
        release: (i32, i32),
        delay: f64,
        duration: f64,
    ) -> Self {
        let dx = release.0.abs_diff(press.0);
        let dy = release.1.abs_diff(press.1);
        if dx > DRAG_THRESHOLD_PX || dy > DRAG_THRESHOLD_PX {
            Self::drag(button, press, release, duration, Some(delay))
        } else {
            Self::click(button, press.0, press.1, Some(delay))
        }
    }
}

pub type Routine = Vec<ClickEvent>;

/// Shared, replace-between-loops holder for the active routine.
///
/// The player takes a snapshot at the top of each loop, so edits made while
/// paused (or mid-loop) only take effect on the next iteration.
#[derive(Debug, Clone, Default)]
pub struct RoutineStore {
    inner: Arc<RwLock<Routine>>,
}

impl RoutineStore {
    pub fn new(routine: Routine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(routine)),
        }
    }

    pub fn snapshot(&self) -> Routine {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, routine: Routine) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = routine;
    }

    pub fn push(&self, event: ClickEvent) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Removes the event at `index` (0-based), returning it when it existed.
    pub fn remove(&self, index: usize) -> Option<ClickEvent> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if index < guard.len() {
            Some(guard.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
