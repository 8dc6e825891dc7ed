use dashmap::DashMap;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use crate::clock::{Clock, SystemClock};
use crate::error::{GuardResult, GuardianError};
use crate::logger::{Logger, TracingLogger};

/// Named breakers, created on first use.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(TracingLogger::default()))
    }
}

impl CircuitBreakerRegistry {
    pub fn new(clock: Arc<dyn Clock>, logger: Arc<dyn Logger>) -> Self {
        Self {
            breakers: DashMap::new(),
            clock,
            logger,
        }
    }

    /// Look up `name`, creating it from `config` if it does not exist yet.
    ///
    /// An existing breaker is returned unchanged even when `config` differs.
    pub fn get_breaker(&self, name: &str, config: Option<CircuitBreakerConfig>) -> GuardResult<Arc<CircuitBreaker>> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(existing.value().clone());
        }

        let config = config.ok_or_else(|| {
            GuardianError::configuration(format!("circuit breaker '{}' is not registered and no config was given", name))
        })?;

        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                self.logger.debug(
                    "circuit breaker registered",
                    &json!({ "breaker": name, "config": config }),
                );
                Arc::new(CircuitBreaker::with_runtime(
                    name,
                    config,
                    self.clock.clone(),
                    self.logger.clone(),
                ))
            })
            .value()
            .clone();

        Ok(breaker)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    pub fn get_all_stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Drop `name` from the registry. Handles already given out keep working.
    pub fn remove_breaker(&self, name: &str) -> bool {
        self.breakers.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.breakers.clear();
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
