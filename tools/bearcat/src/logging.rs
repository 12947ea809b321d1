use crate::errors::BearcatError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub timestamp_ns: u64,
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), BearcatError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BearcatError::Io(e.to_string()))?;
            }
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            timestamp_ns: event.timestamp_ns,
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| BearcatError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BearcatError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| BearcatError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| BearcatError::Io(e.to_string()))
    }
}

static RUN_LOGGER: OnceLock<Mutex<Option<JsonlLogger>>> = OnceLock::new();

fn run_logger_slot() -> &'static Mutex<Option<JsonlLogger>> {
    RUN_LOGGER.get_or_init(|| Mutex::new(None))
}

/// Install the process-wide run log. Until then `append_run_log` is a no-op.
pub fn init_run_logger(logger: JsonlLogger) {
    if let Ok(mut slot) = run_logger_slot().lock() {
        *slot = Some(logger);
    }
}

/// Append an event to the run log. Logging failures never surface to callers.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let Ok(slot) = run_logger_slot().lock() else {
        return;
    };
    let Some(logger) = slot.as_ref() else {
        return;
    };
    let _ = logger.append(&LogEvent {
        timestamp_ns: timestamp_ns(),
        level,
        event_type,
        payload,
    });
}

pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
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
