//! Logging collaborator injected into data sources
//!
//! Adapters report provider failures through a [`Logger`] handed to them at
//! construction instead of calling `tracing` directly, so that failure
//! reporting can be asserted on in tests. [`TracingLogger`] is the production
//! implementation; [`MemoryLogger`] captures records in memory.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single structured log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity
    pub level: LogLevel,
    /// Emitting data source id
    pub source: String,
    /// Human-readable message
    pub message: String,
    /// Structured key/value fields
    pub fields: Vec<(String, String)>,
}

/// Structured logging sink
pub trait Logger: Send + Sync + fmt::Debug {
    /// Record a log entry
    fn log(&self, level: LogLevel, source: &str, message: &str, fields: &[(&str, String)]);

    /// Record a warning
    fn warn(&self, source: &str, message: &str, fields: &[(&str, String)]) {
        self.log(LogLevel::Warn, source, message, fields);
    }

    /// Record an informational entry
    fn info(&self, source: &str, message: &str, fields: &[(&str, String)]) {
        self.log(LogLevel::Info, source, message, fields);
    }
}

/// Logger forwarding to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Shared handle, ready to hand to adapters
    pub fn shared() -> Arc<dyn Logger> {
        Arc::new(TracingLogger)
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, source: &str, message: &str, fields: &[(&str, String)]) {
        let fields = fields
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" ");

        match level {
            LogLevel::Debug => tracing::debug!(source = source, fields = %fields, "{}", message),
            LogLevel::Info => tracing::info!(source = source, fields = %fields, "{}", message),
            LogLevel::Warn => tracing::warn!(source = source, fields = %fields, "{}", message),
            LogLevel::Error => tracing::error!(source = source, fields = %fields, "{}", message),
        }
    }
}

/// Logger that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    /// Create an empty logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Records at the given level
    pub fn at_level(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.level == level)
            .collect()
    }

    /// Number of warnings recorded
    pub fn warning_count(&self) -> usize {
        self.at_level(LogLevel::Warn).len()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, source: &str, message: &str, fields: &[(&str, String)]) {
        let record = LogRecord {
            level,
            source: source.to_string(),
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        };
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}
