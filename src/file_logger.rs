use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use log::info;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::{ReminderError, ReminderResult};
use crate::models::ReminderSettings;

/// Default number of days to keep journal files.
const DEFAULT_MAX_LOG_DAYS: i64 = 7;
const LOG_DIR_NAME: &str = "prayer-reminder";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub dir: PathBuf,
    pub max_days: i64,
}

impl LoggerConfig {
    /// Effective journal location using the overrides in `settings`.
    pub fn from_settings(settings: &ReminderSettings) -> ReminderResult<Self> {
        let mut dir = match settings
            .log_directory
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
        {
            Some(path) => PathBuf::from(path),
            None => {
                let mut base = dirs::data_dir().ok_or_else(|| {
                    ReminderError::Persistence("failed to resolve app data dir".to_string())
                })?;
                base.push(LOG_DIR_NAME);
                base
            }
        };

        let max_days = match i64::try_from(settings.max_log_days) {
            Ok(days) if days > 0 => days,
            _ => DEFAULT_MAX_LOG_DAYS,
        };

        dir.push("logs");
        Ok(Self { dir, max_days })
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }
}

/// A single JSONL journal line.
#[derive(Debug, Serialize)]
pub struct LogEntry {
    pub ts: String,
    pub action: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip)]
    date: NaiveDate,
}

fn entry_internal(
    now: DateTime<FixedOffset>,
    action: &str,
    phase: &str,
    scheduled: Option<usize>,
    cancelled: Option<usize>,
    error: Option<String>,
    details: Option<Value>,
) -> LogEntry {
    LogEntry {
        ts: now.to_rfc3339(),
        action: action.to_string(),
        phase: phase.to_string(),
        scheduled,
        cancelled,
        error,
        details,
        date: now.date_naive(),
    }
}

/// Convenience: a finished reconciliation pass.
pub fn pass_entry(
    now: DateTime<FixedOffset>,
    action: &str,
    scheduled: usize,
    cancelled: usize,
    details: Option<Value>,
) -> LogEntry {
    entry_internal(now, action, "pass", Some(scheduled), Some(cancelled), None, details)
}

/// Convenience: a pass or action that failed.
pub fn error_entry(now: DateTime<FixedOffset>, action: &str, error: &str) -> LogEntry {
    entry_internal(now, action, "error", None, None, Some(error.to_string()), None)
}

/// Convenience: a user action such as completion or undo.
pub fn event_entry(now: DateTime<FixedOffset>, action: &str, details: Option<Value>) -> LogEntry {
    entry_internal(now, action, "event", None, None, None, details)
}

/// Appends `entry` as one line to `logs/YYYY-MM-DD.jsonl` for the entry's local date.
pub async fn append(config: &LoggerConfig, entry: LogEntry) -> ReminderResult<()> {
    fs::create_dir_all(&config.dir)
        .await
        .map_err(|e| ReminderError::Persistence(format!("create log dir: {e}")))?;

    let path = config.file_for(entry.date);

    let mut line = serde_json::to_string(&entry)
        .map_err(|e| ReminderError::Persistence(format!("serialize log entry: {e}")))?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| ReminderError::Persistence(format!("open log file: {e}")))?;

    file.write_all(line.as_bytes())
        .await
        .map_err(|e| ReminderError::Persistence(format!("write log entry: {e}")))?;
    file.flush()
        .await
        .map_err(|e| ReminderError::Persistence(format!("flush log entry: {e}")))?;

    Ok(())
}

/// Deletes journal files older than the configured retention, counted back from `today`.
pub async fn cleanup_old_logs(config: &LoggerConfig, today: NaiveDate) {
    if config.max_days <= 0 {
        return;
    }

    let mut entries = match fs::read_dir(&config.dir).await {
        Ok(e) => e,
        Err(_) => return,
    };

    let cutoff = today - Duration::days(config.max_days);

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "jsonl") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(file_date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                    if file_date < cutoff {
                        match fs::remove_file(&path).await {
                            Ok(()) => info!("deleted old log file: {}", path.display()),
                            Err(e) => info!("failed to delete old log {}: {}", path.display(), e),
                        }
                    }
                }
            }
        }
    }
}
