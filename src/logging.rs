use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
}

/// Structured logger collaborator. The engine only depends on the append
/// contract; storage and display live elsewhere. When disabled, every call
/// is a no-op — the engine consults the flag it was handed, it does not own
/// the setting.
#[derive(Debug)]
pub struct SyncLogger {
    enabled: bool,
    entries: Mutex<Vec<LogEntry>>,
}

impl SyncLogger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, message: &str, level: LogLevel, context: Value) {
        if !self.enabled {
            return;
        }
        match level {
            LogLevel::Info => tracing::info!(context = %context, "{}", message),
            LogLevel::Warning => tracing::warn!(context = %context, "{}", message),
            LogLevel::Error => tracing::error!(context = %context, "{}", message),
            LogLevel::Success => tracing::info!(context = %context, outcome = "success", "{}", message),
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            context,
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub fn info(&self, message: &str, context: Value) {
        self.log(message, LogLevel::Info, context);
    }

    pub fn warning(&self, message: &str, context: Value) {
        self.log(message, LogLevel::Warning, context);
    }

    pub fn error(&self, message: &str, context: Value) {
        self.log(message, LogLevel::Error, context);
    }

    pub fn success(&self, message: &str, context: Value) {
        self.log(message, LogLevel::Success, context);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
