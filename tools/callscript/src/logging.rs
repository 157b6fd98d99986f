use crate::config::LoggingConfig;
use crate::errors::MockError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub min_level: LogLevel,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            min_level: LogLevel::Debug,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    /// Builds a logger from config; `None` when no log path is configured.
    pub fn from_config(cfg: &LoggingConfig) -> Option<Self> {
        let path = cfg.path.as_ref()?;
        Some(Self {
            path: path.clone(),
            min_level: cfg.level,
            max_payload_bytes: cfg.max_payload_bytes,
            budget_bytes: cfg.budget_bytes,
        })
    }

    pub fn accepts(&self, level: &str) -> bool {
        LogLevel::parse(level).map_or(true, |level| level >= self.min_level)
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), MockError> {
        if !self.accepts(event.level) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| MockError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| MockError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MockError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| MockError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            let _ = enforce_log_budget(parent, &self.path, self.budget_bytes)?;
        }

        Ok(())
    }
}

static RUN_LOGGER: OnceLock<Mutex<Option<JsonlLogger>>> = OnceLock::new();

fn logger_slot() -> MutexGuard<'static, Option<JsonlLogger>> {
    let slot = RUN_LOGGER.get_or_init(|| Mutex::new(None));
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Install the process-wide run logger used by `append_run_log`.
pub fn init_run_logger(logger: JsonlLogger) {
    *logger_slot() = Some(logger);
}

/// Install the run logger described by `cfg`, or clear it when no path is set.
pub fn init_logging(cfg: &LoggingConfig) {
    match JsonlLogger::from_config(cfg) {
        Some(logger) => init_run_logger(logger),
        None => clear_run_logger(),
    }
}

pub fn clear_run_logger() {
    *logger_slot() = None;
}

/// Append one event to the run log. No-op when no logger is installed; write
/// failures are dropped so logging never changes mock outcomes.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let logger = logger_slot().clone();
    if let Some(logger) = logger {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

/// Deletes the oldest `.jsonl` files in `dir` until the total fits the budget.
/// The active log file is never removed.
fn enforce_log_budget(
    dir: &Path,
    active: &Path,
    budget_bytes: u64,
) -> Result<Vec<PathBuf>, MockError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| MockError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect::<Vec<_>>();

    files.sort_by_key(|path| fs::metadata(path).ok().and_then(|m| m.modified().ok()));

    let mut total = files
        .iter()
        .filter_map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum::<u64>();

    let mut deleted = Vec::new();
    for path in files {
        if total <= budget_bytes {
            break;
        }
        if path == active {
            continue;
        }
        let len = fs::metadata(&path)
            .map_err(|e| MockError::Io(e.to_string()))?
            .len();
        fs::remove_file(&path).map_err(|e| MockError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    Value::String(format!("{}...", truncate_str(&rendered, max_bytes.saturating_sub(3))))
}

/// Cuts `text` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_str(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::{enforce_log_budget, truncate_str, JsonlLogger, LogEvent, LogLevel};
    use serde_json::json;
    use std::fs;

    #[test]
    fn logger_truncates_large_payloads_and_writes_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mock.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.max_payload_bytes = 20;
        logger.budget_bytes = 1024;

        logger
            .append(&LogEvent {
                level: "info",
                event_type: "mock.replay.matched",
                payload: json!({"call": "abcdefghijklmnopqrstuvwxyz"}),
            })
            .expect("append");

        let text = fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"event_type\":\"mock.replay.matched\""));
        assert!(text.contains("..."));
    }

    #[test]
    fn logger_skips_events_below_min_level() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mock.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.min_level = LogLevel::Warn;

        logger
            .append(&LogEvent {
                level: "debug",
                event_type: "mock.expect.begin",
                payload: json!({}),
            })
            .expect("append debug");
        assert!(!path.exists());

        logger
            .append(&LogEvent {
                level: "error",
                event_type: "mock.failure",
                payload: json!({"kind": "unexpected_call"}),
            })
            .expect("append error");
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn budget_prunes_oldest_logs_but_keeps_active_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.jsonl"), vec![b'x'; 40]).expect("a");
        std::thread::sleep(std::time::Duration::from_millis(2));
        fs::write(dir.path().join("notes.txt"), vec![b'x'; 40]).expect("txt");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let active = dir.path().join("b.jsonl");
        fs::write(&active, vec![b'x'; 40]).expect("b");

        let deleted = enforce_log_budget(dir.path(), &active, 50).expect("pruned");
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].ends_with("a.jsonl"));
        assert!(active.exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn truncate_str_respects_char_boundaries() {
        assert_eq!(truncate_str("héllo", 2), "h");
        assert_eq!(truncate_str("abc", 10), "abc");
    }
}
