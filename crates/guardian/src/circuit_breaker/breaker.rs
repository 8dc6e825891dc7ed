use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{CircuitBreakerConfig, CircuitState};
use crate::clock::{elapsed_ms, Clock, SystemClock};
use crate::error::{ErrorContext, GuardResult, GuardianError};
use crate::logger::{Logger, TracingLogger};

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_state_change_time: DateTime<Utc>,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub config: CircuitBreakerConfig,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    last_state_change_time: DateTime<Utc>,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
}

impl BreakerState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_success_time: None,
            last_state_change_time: now,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
        }
    }

    /// Move to `to`, resetting the counters that state starts from.
    fn transition(&mut self, to: CircuitState, now: DateTime<Utc>) -> (CircuitState, CircuitState) {
        let from = self.state;
        self.state = to;
        self.last_state_change_time = now;
        match to {
            CircuitState::Closed | CircuitState::HalfOpen => {
                self.failure_count = 0;
                self.success_count = 0;
            }
            CircuitState::Open => {
                self.success_count = 0;
            }
        }
        (from, to)
    }
}

/// Failure-threshold gate for one named operation.
///
/// Bookkeeping is done under a mutex that is never held while the wrapped
/// call runs.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_runtime(name, config, Arc::new(SystemClock), Arc::new(TracingLogger::default()))
    }

    pub fn with_runtime(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new(now)),
            clock,
            logger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.lock();
        self.stats_from(&state)
    }

    /// Run `operation` through the breaker.
    ///
    /// While open (and before `timeout_ms` has elapsed) the call fails fast
    /// with [`GuardianError::CircuitOpen`] and `operation` is never invoked.
    /// A failing operation is counted and its error returned unchanged as
    /// [`GuardianError::Operation`].
    pub async fn execute<T, F, Fut>(&self, operation: F, context: Option<Value>) -> GuardResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.admit(context)?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(GuardianError::Operation(err))
            }
        }
    }

    pub fn record_success(&self) {
        let now = self.clock.now();
        let changed = {
            let mut state = self.lock();
            state.total_successes += 1;
            state.last_success_time = Some(now);
            state.failure_count = 0;

            if state.state == CircuitState::HalfOpen {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    Some(state.transition(CircuitState::Closed, now))
                } else {
                    None
                }
            } else {
                None
            }
        };

        if let Some((from, to)) = changed {
            self.log_transition(from, to);
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let changed = {
            let mut state = self.lock();
            state.total_failures += 1;
            state.last_failure_time = Some(now);
            state.failure_count += 1;

            match state.state {
                CircuitState::HalfOpen => Some(state.transition(CircuitState::Open, now)),
                CircuitState::Closed => {
                    let window_expired = state
                        .last_success_time
                        .is_some_and(|last| elapsed_ms(last, now) > self.config.reset_timeout_ms);
                    if window_expired {
                        state.failure_count = 1;
                    }
                    if state.failure_count >= self.config.failure_threshold {
                        Some(state.transition(CircuitState::Open, now))
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };

        if let Some((from, to)) = changed {
            self.log_transition(from, to);
        }
    }

    /// Back to closed with cleared counters and timestamps. Lifetime totals are kept.
    pub fn reset(&self) {
        let now = self.clock.now();
        let from = {
            let mut state = self.lock();
            let (from, _) = state.transition(CircuitState::Closed, now);
            state.last_failure_time = None;
            state.last_success_time = None;
            from
        };
        self.logger.info(
            "circuit breaker reset",
            &json!({ "breaker": self.name, "from": from }),
        );
    }

    /// Count the request and decide whether it may run.
    fn admit(&self, context: Option<Value>) -> GuardResult<()> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.total_requests += 1;

        if state.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = elapsed_ms(state.last_state_change_time, now);
        if elapsed >= self.config.timeout_ms {
            let (from, to) = state.transition(CircuitState::HalfOpen, now);
            drop(state);
            self.log_transition(from, to);
            return Ok(());
        }

        let time_until_retry = self.config.timeout_ms - elapsed;
        let stats = self.stats_from(&state);
        drop(state);

        let error = GuardianError::circuit_open(
            format!("'{}' is open, retry in {}ms", self.name, time_until_retry),
            ErrorContext::new()
                .with_state(json!(CircuitState::Open))
                .with_metadata(json!({
                    "breaker": self.name,
                    "stats": stats,
                    "time_until_retry_ms": time_until_retry,
                    "context": context,
                })),
        );
        self.logger.warn("circuit breaker rejected call", &error.report_value());
        Err(error)
    }

    fn log_transition(&self, from: CircuitState, to: CircuitState) {
        let fields = json!({ "breaker": self.name, "from": from, "to": to });
        match to {
            CircuitState::Open => self.logger.warn("circuit breaker opened", &fields),
            _ => self.logger.info("circuit breaker state changed", &fields),
        }
    }

    fn stats_from(&self, state: &BreakerState) -> CircuitBreakerStats {
        CircuitBreakerStats {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_time: state.last_failure_time,
            last_success_time: state.last_success_time,
            last_state_change_time: state.last_state_change_time,
            total_requests: state.total_requests,
            total_failures: state.total_failures,
            total_successes: state.total_successes,
            config: self.config.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &state.state)
            .field("failure_count", &state.failure_count)
            .field("success_count", &state.success_count)
            .field("config", &self.config)
            .finish()
    }
}
