//! Runtime configuration for a [`Guardian`](crate::Guardian).
//!
//! # Example
//!
//! ```rust
//! use guardian_core::GuardianConfig;
//!
//! let config = GuardianConfig::from_json_str(r#"{
//!     "max_effects": 200,
//!     "log_level": "warn",
//!     "circuit_breakers": {
//!         "payments": { "failure_threshold": 3, "timeout_ms": 1000 }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.max_effects, 200);
//! assert_eq!(config.circuit_breakers["payments"].success_threshold, 2);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{GuardResult, GuardianError};
use crate::logger::LogLevel;
use crate::side_effects::DEFAULT_MAX_EFFECTS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// Capacity of the effect log; oldest entries are evicted past it.
    pub max_effects: usize,
    /// Initial state of the global invariant switch.
    pub invariants_enabled: bool,
    /// Minimum level for the default tracing logger.
    pub log_level: LogLevel,
    /// Breakers registered at construction, before any call-site config.
    pub circuit_breakers: BTreeMap<String, CircuitBreakerConfig>,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            max_effects: DEFAULT_MAX_EFFECTS,
            invariants_enabled: true,
            log_level: LogLevel::default(),
            circuit_breakers: BTreeMap::new(),
        }
    }
}

impl GuardianConfig {
    pub fn from_json_str(json: &str) -> GuardResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| GuardianError::configuration(format!("invalid guardian config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_breaker(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.circuit_breakers.insert(name.into(), config);
        self
    }

    /// Reject values that would make a component unusable.
    pub fn validate(&self) -> GuardResult<()> {
        if self.max_effects == 0 {
            return Err(GuardianError::configuration("max_effects must be at least 1"));
        }
        for (name, breaker) in &self.circuit_breakers {
            if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
                return Err(GuardianError::configuration(format!(
                    "circuit breaker '{}' needs thresholds of at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}
