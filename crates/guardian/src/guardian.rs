//! The [`Guardian`] facade: one handle over every component.
//!
//! Build it once at startup and clone it into whatever needs it. Clones share
//! the same breakers, tracker and invariant switch.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats};
use crate::clock::{Clock, SystemClock};
use crate::config::GuardianConfig;
use crate::error::GuardResult;
use crate::invariants::{InvariantOptions, Invariants};
use crate::logger::{Logger, TracingLogger};
use crate::side_effects::{
    EffectHook, EffectKind, EffectPolicy, SideEffect, SideEffectTracker, Tracked, TrackedExecution,
};
use crate::state_machine::{MachineState, StateMachine, StateMachineConfig};
use crate::validation::{BatchResult, Schema, SchemaValidator, ValidateOptions, ValidationResult};

/// Combined health snapshot: every breaker plus the effect summary.
#[derive(Debug, Clone, Serialize)]
pub struct GuardianReport {
    pub circuit_breakers: BTreeMap<String, CircuitBreakerStats>,
    #[serde(serialize_with = "serialize_summary")]
    pub side_effects: BTreeMap<EffectKind, usize>,
    pub invariants_enabled: bool,
    pub generated_at: DateTime<Utc>,
}

fn serialize_summary<S: Serializer>(summary: &BTreeMap<EffectKind, usize>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(summary.iter().map(|(kind, count)| (kind.to_string(), count)))
}

struct GuardianInner {
    config: GuardianConfig,
    validator: SchemaValidator,
    invariants: Invariants,
    tracker: SideEffectTracker,
    breakers: CircuitBreakerRegistry,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
}

/// Composition root for validation, contracts, state machines, breakers and
/// side-effect tracking.
#[derive(Clone)]
pub struct Guardian {
    inner: Arc<GuardianInner>,
}

impl Default for Guardian {
    fn default() -> Self {
        GuardianBuilder::new().assemble()
    }
}

impl Guardian {
    pub fn builder() -> GuardianBuilder {
        GuardianBuilder::new()
    }

    pub fn from_config(config: GuardianConfig) -> GuardResult<Self> {
        GuardianBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.inner.config
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.inner.logger
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    pub fn validate(&self, data: &Value, schema: &Schema, options: ValidateOptions) -> GuardResult<ValidationResult> {
        self.inner.validator.validate(data, schema, options)
    }

    pub fn validate_batch(&self, items: &[Value], schema: &Schema, options: ValidateOptions) -> BatchResult {
        self.inner.validator.validate_batch(items, schema, options)
    }

    // ------------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------------

    pub fn invariants(&self) -> &Invariants {
        &self.inner.invariants
    }

    pub fn require<T, F>(&self, condition: F, value: &T, message: &str, options: InvariantOptions) -> GuardResult<bool>
    where
        T: Debug + ?Sized,
        F: FnOnce(&T) -> bool,
    {
        self.inner.invariants.require(condition, value, message, options)
    }

    pub fn ensure<T, F>(&self, condition: F, value: &T, message: &str, options: InvariantOptions) -> GuardResult<bool>
    where
        T: Debug + ?Sized,
        F: FnOnce(&T) -> bool,
    {
        self.inner.invariants.ensure(condition, value, message, options)
    }

    pub fn require_not_null<T>(&self, value: Option<T>, name: &str) -> GuardResult<T> {
        self.inner.invariants.require_not_null(value, name)
    }

    pub fn require_not_empty<T: Debug>(&self, items: &[T], name: &str) -> GuardResult<()> {
        self.inner.invariants.require_not_empty(items, name)
    }

    pub fn require_positive<N: PartialOrd + Default + Debug>(&self, value: N, name: &str) -> GuardResult<()> {
        self.inner.invariants.require_positive(value, name)
    }

    pub fn require_in_range<N: PartialOrd + Debug>(&self, value: N, min: N, max: N, name: &str) -> GuardResult<()> {
        self.inner.invariants.require_in_range(value, min, max, name)
    }

    pub fn require_keys(&self, object: &Value, keys: &[&str], name: &str) -> GuardResult<()> {
        self.inner.invariants.require_keys(object, keys, name)
    }

    // ------------------------------------------------------------------------
    // State machines
    // ------------------------------------------------------------------------

    /// Build a state machine sharing this guardian's clock and logger.
    pub fn create_state_machine<S: MachineState>(&self, config: StateMachineConfig<S>) -> GuardResult<StateMachine<S>> {
        Ok(StateMachine::new(config)?
            .with_clock(self.inner.clock.clone())
            .with_logger(self.inner.logger.clone()))
    }

    // ------------------------------------------------------------------------
    // Circuit breakers
    // ------------------------------------------------------------------------

    /// Run `operation` through the breaker called `name`.
    ///
    /// `config` is only used the first time `name` is seen; an unseen name
    /// without a config is a configuration error.
    pub async fn execute_with_circuit_breaker<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
        config: Option<CircuitBreakerConfig>,
    ) -> GuardResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let breaker = self.inner.breakers.get_breaker(name, config)?;
        breaker.execute(operation, None).await
    }

    pub fn circuit_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.breakers.get(name)
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.inner.breakers
    }

    pub fn circuit_breaker_stats(&self, name: &str) -> Option<CircuitBreakerStats> {
        self.inner.breakers.get(name).map(|breaker| breaker.stats())
    }

    pub fn all_circuit_breaker_stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.inner.breakers.get_all_stats()
    }

    // ------------------------------------------------------------------------
    // Side effects
    // ------------------------------------------------------------------------

    pub fn side_effects(&self) -> &SideEffectTracker {
        &self.inner.tracker
    }

    pub fn track(&self, kind: EffectKind, description: impl Into<String>, context: Option<Value>) -> SideEffect {
        self.inner.tracker.track(kind, description, context)
    }

    pub fn snapshot<T: Serialize>(&self, value: T, label: Option<&str>) -> GuardResult<Tracked<T>> {
        self.inner.tracker.snapshot(value, label)
    }

    pub fn resnapshot<T: Serialize>(&self, tracked: &Tracked<T>, label: Option<&str>) -> GuardResult<()> {
        self.inner.tracker.resnapshot(tracked, label)
    }

    pub fn verify_no_mutations<T: Serialize>(&self, tracked: &Tracked<T>) -> GuardResult<()> {
        self.inner.tracker.verify_no_mutations(tracked)
    }

    pub async fn track_side_effects<T, F, Fut>(&self, policy: EffectPolicy, block: F) -> GuardResult<TrackedExecution<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.inner.tracker.track_execution(policy, block).await
    }

    pub fn side_effect_summary(&self) -> BTreeMap<EffectKind, usize> {
        self.inner.tracker.summary()
    }

    pub fn clear_side_effects(&self) {
        self.inner.tracker.clear();
    }

    // ------------------------------------------------------------------------
    // Reporting and lifecycle
    // ------------------------------------------------------------------------

    pub fn report(&self) -> GuardianReport {
        GuardianReport {
            circuit_breakers: self.inner.breakers.get_all_stats(),
            side_effects: self.inner.tracker.summary(),
            invariants_enabled: self.inner.invariants.is_enabled(),
            generated_at: self.inner.clock.now(),
        }
    }

    /// Return every component to its just-built state.
    ///
    /// Drops all breakers (configured ones are registered again), clears the
    /// effect log and snapshots, and restores the configured invariant switch.
    /// Breaker handles obtained earlier keep working but are detached.
    pub fn reset(&self) {
        self.inner.breakers.clear();
        register_configured_breakers(&self.inner.breakers, &self.inner.config);
        self.inner.tracker.clear();
        if self.inner.config.invariants_enabled {
            self.inner.invariants.enable();
        } else {
            self.inner.invariants.disable();
        }
        self.inner.logger.info("guardian reset", &json!({}));
    }
}

impl fmt::Debug for Guardian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guardian")
            .field("config", &self.inner.config)
            .field("breakers", &self.inner.breakers.names())
            .field("tracker", &self.inner.tracker)
            .finish()
    }
}

fn register_configured_breakers(registry: &CircuitBreakerRegistry, config: &GuardianConfig) {
    for (name, breaker) in &config.circuit_breakers {
        // Cannot fail: a config is always supplied.
        let _ = registry.get_breaker(name, Some(breaker.clone()));
    }
}

/// Builder for [`Guardian`].
///
/// # Example
///
/// ```rust
/// use guardian_core::{CircuitBreakerConfig, Guardian, GuardianConfig, ManualClock};
/// use std::sync::Arc;
///
/// let guardian = Guardian::builder()
///     .config(GuardianConfig::default().with_breaker("payments", CircuitBreakerConfig::new(3, 2, 1_000)))
///     .clock(Arc::new(ManualClock::starting_now()))
///     .build()
///     .unwrap();
///
/// assert!(guardian.circuit_breaker("payments").is_some());
/// ```
#[derive(Default)]
pub struct GuardianBuilder {
    config: GuardianConfig,
    logger: Option<Arc<dyn Logger>>,
    clock: Option<Arc<dyn Clock>>,
    on_effect: Option<EffectHook>,
}

impl GuardianBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: GuardianConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`TracingLogger`].
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Hook called for every effect the tracker records.
    pub fn on_effect_detected(mut self, hook: EffectHook) -> Self {
        self.on_effect = Some(hook);
        self
    }

    pub fn build(self) -> GuardResult<Guardian> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> Guardian {
        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(TracingLogger::new(self.config.log_level)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let invariants = Invariants::new(logger.clone());
        if !self.config.invariants_enabled {
            invariants.disable();
        }

        let mut tracker = SideEffectTracker::new(logger.clone())
            .with_max_effects(self.config.max_effects)
            .with_clock(clock.clone());
        if let Some(hook) = self.on_effect {
            tracker = tracker.on_effect_detected(hook);
        }

        let breakers = CircuitBreakerRegistry::new(clock.clone(), logger.clone());
        register_configured_breakers(&breakers, &self.config);

        Guardian {
            inner: Arc::new(GuardianInner {
                validator: SchemaValidator::new(logger.clone()),
                invariants,
                tracker,
                breakers,
                clock,
                logger,
                config: self.config,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::clock::ManualClock;
    use crate::logger::NoopLogger;

    fn guardian() -> (Guardian, ManualClock) {
        let clock = ManualClock::starting_now();
        let guardian = Guardian::builder()
            .logger(Arc::new(NoopLogger))
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        (guardian, clock)
    }

    #[tokio::test]
    async fn test_unseen_breaker_without_config() {
        let (guardian, _clock) = guardian();
        let mut invoked = false;

        let err = guardian
            .execute_with_circuit_breaker(
                "ai-provider",
                || {
                    invoked = true;
                    async { Ok(()) }
                },
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert!(!invoked);
    }

    #[tokio::test]
    async fn test_breaker_is_created_once() {
        let (guardian, _clock) = guardian();
        let config = CircuitBreakerConfig::new(2, 1, 1_000);

        let value = guardian
            .execute_with_circuit_breaker("search", || async { Ok(41 + 1) }, Some(config))
            .await
            .unwrap();
        assert_eq!(value, 42);

        let value = guardian
            .execute_with_circuit_breaker("search", || async { Ok("again") }, None)
            .await
            .unwrap();
        assert_eq!(value, "again");

        let stats = guardian.circuit_breaker_stats("search").unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.state, CircuitState::Closed);
        assert!(guardian.circuit_breaker_stats("missing").is_none());
    }

    #[tokio::test]
    async fn test_report_merges_breakers_and_effects() {
        let (guardian, clock) = guardian();
        guardian
            .execute_with_circuit_breaker("payments", || async { Ok(()) }, Some(CircuitBreakerConfig::default()))
            .await
            .unwrap();
        guardian.track(EffectKind::Network, "charge card", None);
        guardian.track(EffectKind::Network, "refund", None);
        guardian.track(EffectKind::Storage, "write receipt", None);

        let report = guardian.report();
        assert_eq!(report.generated_at, clock.now());
        assert_eq!(report.side_effects[&EffectKind::Network], 2);
        assert_eq!(report.circuit_breakers["payments"].total_successes, 1);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["side_effects"]["NETWORK"], 2);
        assert_eq!(value["circuit_breakers"]["payments"]["state"], "CLOSED");
    }

    #[tokio::test]
    async fn test_reset_restores_built_state() {
        let clock = ManualClock::starting_now();
        let config = GuardianConfig::default().with_breaker("payments", CircuitBreakerConfig::new(1, 1, 60_000));
        let guardian = Guardian::builder()
            .config(config)
            .logger(Arc::new(NoopLogger))
            .clock(Arc::new(clock))
            .build()
            .unwrap();

        let _ = guardian
            .execute_with_circuit_breaker("payments", || async { Err::<(), _>(anyhow::anyhow!("declined")) }, None)
            .await;
        guardian
            .execute_with_circuit_breaker("adhoc", || async { Ok(()) }, Some(CircuitBreakerConfig::default()))
            .await
            .unwrap();
        guardian.track(EffectKind::Console, "debug print", None);
        guardian.invariants().disable();

        guardian.reset();

        assert_eq!(guardian.circuit_breakers().names(), vec!["payments".to_string()]);
        assert_eq!(guardian.circuit_breaker_stats("payments").unwrap().total_requests, 0);
        assert!(guardian.side_effect_summary().is_empty());
        assert!(guardian.invariants().is_enabled());
    }

    #[test]
    fn test_clones_share_components() {
        let (guardian, _clock) = guardian();
        let clone = guardian.clone();

        clone.track(EffectKind::Timer, "schedule retry", None);
        clone.invariants().disable();

        assert_eq!(guardian.side_effects().effects().len(), 1);
        assert!(guardian.require(|_: &i32| false, &1, "skipped", InvariantOptions::default()).unwrap());
    }

    #[test]
    fn test_disabled_invariants_from_config() {
        let config = GuardianConfig {
            invariants_enabled: false,
            ..GuardianConfig::default()
        };
        let guardian = Guardian::builder()
            .config(config)
            .logger(Arc::new(NoopLogger))
            .build()
            .unwrap();

        assert!(!guardian.invariants().is_enabled());
        assert!(guardian.require_positive(-1, "amount").is_ok());
        assert!(guardian.require_not_null(None::<u8>, "user").is_err());
    }
}
