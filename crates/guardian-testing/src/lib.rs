//! Testing utilities for code guarded by `guardian-core`.
//!
//! - [`RecordingLogger`]: captures every log entry for assertions
//! - [`FlakyOperation`]: scripted success/failure stub that counts invocations
//! - [`article_workflow`]: the DRAFT → REVIEW → PUBLISHED fixture machine
//! - [`init_tracing`]: one-shot `tracing` subscriber honoring `RUST_LOG`
//!
//! # Example
//!
//! ```rust,ignore
//! use guardian_testing::{FlakyOperation, RecordingLogger};
//!
//! let logger = RecordingLogger::new();
//! let guardian = Guardian::builder().logger(logger.handle()).build()?;
//! let flaky = FlakyOperation::failing_times(3);
//!
//! for _ in 0..4 {
//!     let _ = guardian.execute_with_circuit_breaker("svc", || flaky.call(), Some(config.clone())).await;
//! }
//!
//! assert_eq!(flaky.calls(), 3);
//! assert!(logger.contains("circuit breaker opened"));
//! ```

use guardian_core::{LogLevel, Logger, StateMachineConfig, Transition};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Logging
// ============================================================================

/// Install a fmt subscriber filtered by `RUST_LOG` (default `guardian=debug`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("guardian=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub fields: Value,
}

/// Logger that keeps every entry in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to pass into a builder; entries stay visible here.
    pub fn handle(&self) -> Arc<dyn Logger> {
        Arc::new(self.clone())
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn at_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries().into_iter().filter(|entry| entry.level == level).collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.at_level(level).len()
    }

    /// True if any entry's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|entry| entry.message.contains(needle))
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn record(&self, level: LogLevel, message: &str, fields: &Value) {
        tracing::trace!(target: "guardian::recorded", %level, fields = %fields, "{}", message);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                level,
                message: message.to_string(),
                fields: fields.clone(),
            });
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str, fields: &Value) {
        self.record(LogLevel::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &Value) {
        self.record(LogLevel::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: &Value) {
        self.record(LogLevel::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: &Value) {
        self.record(LogLevel::Error, message, fields);
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Scripted operation for breaker tests.
///
/// Each call pops the next outcome from the script; once the script runs out
/// every call succeeds. `calls()` counts actual invocations, so a breaker
/// that fails fast leaves it unchanged.
#[derive(Debug, Clone, Default)]
pub struct FlakyOperation {
    script: Arc<Mutex<VecDeque<bool>>>,
    calls: Arc<AtomicUsize>,
}

impl FlakyOperation {
    /// `true` entries succeed, `false` entries fail.
    pub fn scripted(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_times(n: usize) -> Self {
        Self::scripted(std::iter::repeat(false).take(n))
    }

    pub fn always_ok() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queue more outcomes after whatever is left.
    pub fn push(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(outcomes);
    }

    /// Invoke the operation, returning the 1-based call number on success.
    pub fn call(&self) -> impl Future<Output = anyhow::Result<usize>> + Send + 'static {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let succeed = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(true);

        async move {
            tokio::task::yield_now().await;
            if succeed {
                Ok(call)
            } else {
                Err(anyhow::anyhow!("scripted failure on call {}", call))
            }
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArticleState {
    Draft,
    Review,
    Published,
}

/// DRAFT → REVIEW, REVIEW → PUBLISHED (only when `approved`), REVIEW → DRAFT.
pub fn article_workflow(approved: Arc<AtomicBool>) -> StateMachineConfig<ArticleState> {
    StateMachineConfig::new(
        ArticleState::Draft,
        [ArticleState::Draft, ArticleState::Review, ArticleState::Published],
    )
    .transition(Transition::new(ArticleState::Draft, ArticleState::Review))
    .transition(
        Transition::new(ArticleState::Review, ArticleState::Published)
            .when(move || approved.load(Ordering::SeqCst)),
    )
    .transition(Transition::new(ArticleState::Review, ArticleState::Draft))
}
