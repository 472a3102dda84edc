use crate::config::LoggingConfig;
use crate::errors::ClickError;
use crate::log_retention::enforce_total_budget;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Append-only session log, one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub component: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn from_config(cfg: &LoggingConfig) -> Self {
        Self {
            path: cfg.path.clone(),
            max_payload_bytes: cfg.max_payload_bytes,
            budget_bytes: cfg.budget_bytes,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), ClickError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent).map_err(|e| ClickError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            payload: truncated,
            ..event.clone()
        })
        .map_err(|e| ClickError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ClickError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| ClickError::Io(e.to_string()))?;

        if let Some(parent) = parent {
            enforce_total_budget(parent, self.budget_bytes, &self.path)?;
        }
        Ok(())
    }

    pub fn info(&self, component: &str, event_type: &str, payload: Value) -> Result<(), ClickError> {
        self.append(&LogEvent {
            level: "info",
            component,
            event_type,
            payload,
        })
    }

    pub fn error(&self, component: &str, event_type: &str, payload: Value) -> Result<(), ClickError> {
        self.append(&LogEvent {
            level: "error",
            component,
            event_type,
            payload,
        })
    }
}

/// Plain status line for terminals that cannot host the timeline view.
pub fn structured_fallback_line(component: &str, state: &str, message: &str) -> String {
    format!(
        "component={component} state={state} message={}",
        message.replace('\n', "\\n")
    )
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
