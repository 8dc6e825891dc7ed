//! Circuit breaker for guarding calls to flaky collaborators.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: collaborator assumed down, calls fail fast without running
//! - Half-Open: probing whether the collaborator recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open:       failure_count >= failure_threshold
//! Open → Half-Open:    first call after timeout_ms since the breaker opened
//! Half-Open → Closed:  success_count >= success_threshold
//! Half-Open → Open:    any failure
//! ```
//!
//! # Design Decisions
//! - One breaker per name, shared through [`CircuitBreakerRegistry`]
//! - First registration for a name wins; later configs are ignored
//! - `timeout_ms` decides when retries are allowed again; it never cancels
//!   a call in flight
//! - A failure more than `reset_timeout_ms` after the last success starts a
//!   fresh failure window

mod breaker;
mod registry;

pub use breaker::{CircuitBreaker, CircuitBreakerStats};
pub use registry::CircuitBreakerRegistry;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening (default: 5)
    pub failure_threshold: u32,
    /// Successes in half-open before closing (default: 2)
    pub success_threshold: u32,
    /// Time to stay open before letting a probe through (default: 60s)
    pub timeout_ms: u64,
    /// Idle time after the last success that restarts the failure count (default: 5m)
    pub reset_timeout_ms: u64,
    /// Reporting window advertised in stats (default: 60s)
    pub monitoring_window_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 60_000,
            reset_timeout_ms: 300_000,
            monitoring_window_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, success_threshold: u32, timeout_ms: u64) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            timeout_ms,
            ..Self::default()
        }
    }

    pub fn with_reset_timeout_ms(mut self, reset_timeout_ms: u64) -> Self {
        self.reset_timeout_ms = reset_timeout_ms;
        self
    }

    pub fn with_monitoring_window_ms(mut self, monitoring_window_ms: u64) -> Self {
        self.monitoring_window_ms = monitoring_window_ms;
        self
    }
}
