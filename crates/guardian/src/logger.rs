//! Logger capability injected into every component.
//!
//! The runtime never owns a logging backend. Callers hand in an
//! `Arc<dyn Logger>`; [`TracingLogger`] is the default and forwards to
//! `tracing`, filtered by a caller-supplied minimum level and optionally
//! mirrored to an external error-reporting hook.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Log capability with the four levels the runtime emits at.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, fields: &Value);
    fn info(&self, message: &str, fields: &Value);
    fn warn(&self, message: &str, fields: &Value);
    fn error(&self, message: &str, fields: &Value);
}

/// Minimum level a [`TracingLogger`] lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Hook invoked with every error-level entry (e.g. an external error tracker).
pub type ErrorReporter = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Default logger: emits `tracing` events under the `guardian` target.
#[derive(Clone, Default)]
pub struct TracingLogger {
    min_level: LogLevel,
    reporter: Option<ErrorReporter>,
}

impl TracingLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            reporter: None,
        }
    }

    /// Mirror error-level entries to an external reporting hook.
    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

impl fmt::Debug for TracingLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLogger")
            .field("min_level", &self.min_level)
            .field("has_reporter", &self.reporter.is_some())
            .finish()
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str, fields: &Value) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(target: "guardian", fields = %fields, "{}", message);
        }
    }

    fn info(&self, message: &str, fields: &Value) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(target: "guardian", fields = %fields, "{}", message);
        }
    }

    fn warn(&self, message: &str, fields: &Value) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(target: "guardian", fields = %fields, "{}", message);
        }
    }

    fn error(&self, message: &str, fields: &Value) {
        tracing::error!(target: "guardian", fields = %fields, "{}", message);
        if let Some(reporter) = &self.reporter {
            reporter(message, fields);
        }
    }
}

/// Logger that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _message: &str, _fields: &Value) {}
    fn info(&self, _message: &str, _fields: &Value) {}
    fn warn(&self, _message: &str, _fields: &Value) {}
    fn error(&self, _message: &str, _fields: &Value) {}
}
