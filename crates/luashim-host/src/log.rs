//! Where script output goes.
//!
//! `print`, `warn` and `error` inside a script, plus the host's own
//! configuration warnings, are forwarded to a [`LogSink`] handed to the host
//! at construction.

use std::sync::Arc;

use parking_lot::Mutex;

/// Tracing target used for script output.
pub const SCRIPT_TARGET: &str = "luashim::script";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
    fn log_warning(&self, message: &str);
    fn log_error(&self, message: &str);

    fn emit(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => self.log(message),
            LogLevel::Warning => self.log_warning(message),
            LogLevel::Error => self.log_error(message),
        }
    }
}

/// Forwards everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::info!(target: SCRIPT_TARGET, "{message}");
    }

    fn log_warning(&self, message: &str) {
        tracing::warn!(target: SCRIPT_TARGET, "{message}");
    }

    fn log_error(&self, message: &str) {
        tracing::error!(target: SCRIPT_TARGET, "{message}");
    }
}

/// Keeps every message in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().clone()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.entries.lock().iter().any(|(_, m)| m == message)
    }

    fn push(&self, level: LogLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

impl LogSink for MemorySink {
    fn log(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn log_warning(&self, message: &str) {
        self.push(LogLevel::Warning, message);
    }

    fn log_error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}
