//! JSON persistence for routines.
//!
//! A routine file is a JSON array of flat event objects:
//!
//! ```json
//! [
//!     { "type": "drag", "button": "left", "x": 10, "y": 20,
//!       "end_x": 300, "end_y": 20, "duration": 0.42, "delay": 1.25 }
//! ]
//! ```
//!
//! `type` defaults to `click`, `button` to `left`; `delay` may be absent (the
//! player then uses its fixed delay) and a drag without `duration` replays
//! over 0.3s.

use crate::errors::ClickError;
use crate::routine::{
    ClickEvent, EventAction, EventKind, MouseButton, Routine, DEFAULT_DRAG_DURATION_SECS,
};
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_ROUTINE_FILENAME: &str = "click_routine.json";

fn default_kind() -> EventKind {
    EventKind::Click
}

fn default_button() -> MouseButton {
    MouseButton::Left
}

/// On-disk shape of one event. Kind-specific fields are optional here and
/// validated when converting into `ClickEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEventRecord {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: EventKind,
    #[serde(default = "default_button")]
    pub button: MouseButton,
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_y: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
}

impl From<&ClickEvent> for ClickEventRecord {
    fn from(event: &ClickEvent) -> Self {
        let (end_x, end_y, duration) = match event.action {
            EventAction::Click => (None, None, None),
            EventAction::Drag {
                end_x,
                end_y,
                duration,
            } => (Some(end_x), Some(end_y), Some(duration)),
        };
        Self {
            kind: event.kind(),
            button: event.button,
            x: event.x,
            y: event.y,
            end_x,
            end_y,
            duration,
            delay: event.delay,
        }
    }
}

impl TryFrom<ClickEventRecord> for ClickEvent {
    type Error = String;

    fn try_from(record: ClickEventRecord) -> Result<Self, Self::Error> {
        if let Some(delay) = record.delay {
            if !delay.is_finite() || delay < 0.0 {
                return Err(format!("delay must be a non-negative number, got {delay}"));
            }
        }
        let action = match record.kind {
            EventKind::Click => EventAction::Click,
            EventKind::Drag => {
                let end_x = record.end_x.ok_or("drag is missing `end_x`")?;
                let end_y = record.end_y.ok_or("drag is missing `end_y`")?;
                let duration = record.duration.unwrap_or(DEFAULT_DRAG_DURATION_SECS);
                if !duration.is_finite() || duration < 0.0 {
                    return Err(format!(
                        "duration must be a non-negative number, got {duration}"
                    ));
                }
                EventAction::Drag {
                    end_x,
                    end_y,
                    duration,
                }
            }
        };
        Ok(Self {
            button: record.button,
            x: record.x,
            y: record.y,
            delay: record.delay,
            action,
        })
    }
}

/// Parses a whole routine; any malformed event rejects the file.
pub fn parse_routine(raw: &str) -> Result<Routine, ClickError> {
    let root: Value =
        serde_json::from_str(raw).map_err(|e| ClickError::RoutineParse(e.to_string()))?;
    let Value::Array(items) = root else {
        return Err(ClickError::RoutineParse(
            "routine root must be a JSON array".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let record: ClickEventRecord = serde_json::from_value(item)
                .map_err(|e| ClickError::RoutineParse(format!("event {}: {e}", idx + 1)))?;
            ClickEvent::try_from(record)
                .map_err(|e| ClickError::RoutineParse(format!("event {}: {e}", idx + 1)))
        })
        .collect()
}

pub fn render_routine(routine: &[ClickEvent]) -> Result<String, ClickError> {
    let records = routine.iter().map(ClickEventRecord::from).collect::<Vec<_>>();
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records
        .serialize(&mut serializer)
        .map_err(|e| ClickError::Io(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| ClickError::Io(e.to_string()))
}

pub fn load_routine(fs: &dyn FileSystem, path: &Path) -> Result<Routine, ClickError> {
    let raw = fs.read_to_string(path)?;
    parse_routine(&raw)
        .map_err(|e| ClickError::RoutineParse(format!("{}: {e}", path.display())))
}

pub fn save_routine(
    fs: &dyn FileSystem,
    path: &Path,
    routine: &[ClickEvent],
) -> Result<(), ClickError> {
    let rendered = render_routine(routine)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs.create_dir_all(parent)?;
        }
    }
    fs.write_string(path, &rendered)
}

/// Short content hash identifying a routine in session logs.
pub fn routine_fingerprint(routine: &[ClickEvent]) -> Result<String, ClickError> {
    use sha2::{Digest, Sha256};
    let rendered = render_routine(routine)?;
    let hash = Sha256::digest(rendered.as_bytes());
    Ok(hex_bytes(&hash[..8]))
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
