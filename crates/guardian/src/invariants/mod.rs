//! Precondition, postcondition and loop-invariant checks.
//!
//! All checks go through one [`Invariants`] handle. Clones share the same
//! enable flag, so `disable()` turns every subsequent check made through any
//! clone into a no-op until `enable()` is called.

mod contract;

pub use contract::Contract;

use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ErrorContext, GuardResult, GuardianError, InvariantKind};
use crate::logger::Logger;

/// Per-call check options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvariantOptions {
    /// When false the check is skipped and the condition is never evaluated.
    pub enabled: bool,
    /// Return `Err` on violation; otherwise report `Ok(false)`.
    pub throw_on_violation: bool,
    pub log_violations: bool,
}

impl Default for InvariantOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            throw_on_violation: true,
            log_violations: true,
        }
    }
}

impl InvariantOptions {
    /// Log violations but never raise them.
    pub fn soft() -> Self {
        Self {
            throw_on_violation: false,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Contract checks with a shared on/off switch.
#[derive(Clone)]
pub struct Invariants {
    enabled: Arc<AtomicBool>,
    logger: Arc<dyn Logger>,
}

impl Invariants {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            logger,
        }
    }

    /// Restore checking after [`disable`](Self::disable).
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Turn every check into a no-op (e.g. for production builds).
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Precondition check.
    ///
    /// Returns `Ok(true)` when the condition holds or the check is skipped,
    /// `Ok(false)` for a violation when `throw_on_violation` is off.
    pub fn require<T, F>(&self, condition: F, value: &T, message: &str, options: InvariantOptions) -> GuardResult<bool>
    where
        T: Debug + ?Sized,
        F: FnOnce(&T) -> bool,
    {
        self.check(InvariantKind::Precondition, condition, value, message, options)
    }

    /// Postcondition check.
    pub fn ensure<T, F>(&self, condition: F, value: &T, message: &str, options: InvariantOptions) -> GuardResult<bool>
    where
        T: Debug + ?Sized,
        F: FnOnce(&T) -> bool,
    {
        self.check(InvariantKind::Postcondition, condition, value, message, options)
    }

    /// Loop or class invariant check.
    pub fn invariant<T, F>(&self, condition: F, value: &T, message: &str, options: InvariantOptions) -> GuardResult<bool>
    where
        T: Debug + ?Sized,
        F: FnOnce(&T) -> bool,
    {
        self.check(InvariantKind::Invariant, condition, value, message, options)
    }

    /// Unwrap `value`, failing with a precondition error when it is `None`.
    ///
    /// The narrowing cannot be skipped: `None` is an error even while checks
    /// are disabled.
    pub fn require_not_null<T>(&self, value: Option<T>, name: &str) -> GuardResult<T> {
        match value {
            Some(inner) => Ok(inner),
            None => Err(self.violation(
                InvariantKind::Precondition,
                &format!("{} must not be null", name),
                Value::Null,
                true,
            )),
        }
    }

    pub fn require_not_empty<T: Debug>(&self, items: &[T], name: &str) -> GuardResult<()> {
        self.require(
            |items: &[T]| !items.is_empty(),
            items,
            &format!("{} must not be empty", name),
            InvariantOptions::default(),
        )
        .map(|_| ())
    }

    /// `value > 0`, where zero is `N::default()`.
    pub fn require_positive<N>(&self, value: N, name: &str) -> GuardResult<()>
    where
        N: PartialOrd + Default + Debug,
    {
        self.require(
            |v: &N| *v > N::default(),
            &value,
            &format!("{} must be positive", name),
            InvariantOptions::default(),
        )
        .map(|_| ())
    }

    /// `min <= value <= max`.
    pub fn require_in_range<N>(&self, value: N, min: N, max: N, name: &str) -> GuardResult<()>
    where
        N: PartialOrd + Debug,
    {
        let message = format!("{} must be between {:?} and {:?}", name, min, max);
        self.require(|v: &N| *v >= min && *v <= max, &value, &message, InvariantOptions::default())
            .map(|_| ())
    }

    /// `object` is a JSON object containing every key in `keys`.
    pub fn require_keys(&self, object: &Value, keys: &[&str], name: &str) -> GuardResult<()> {
        let missing: Vec<&str> = match object.as_object() {
            Some(map) => keys.iter().copied().filter(|key| !map.contains_key(*key)).collect(),
            None => keys.to_vec(),
        };
        let message = format!("{} is missing required keys {:?}", name, missing);
        self.require(|_: &Value| missing.is_empty(), object, &message, InvariantOptions::default())
            .map(|_| ())
    }

    /// Start a pre/postcondition contract around an async operation.
    pub fn contract<T: Debug>(&self, name: impl Into<String>) -> Contract<'_, T> {
        Contract::new(self, name.into())
    }

    fn check<T, F>(
        &self,
        kind: InvariantKind,
        condition: F,
        value: &T,
        message: &str,
        options: InvariantOptions,
    ) -> GuardResult<bool>
    where
        T: Debug + ?Sized,
        F: FnOnce(&T) -> bool,
    {
        if !options.enabled || !self.is_enabled() {
            return Ok(true);
        }
        if condition(value) {
            return Ok(true);
        }

        let error = self.violation(kind, message, Value::String(format!("{:?}", value)), options.log_violations);
        if options.throw_on_violation {
            Err(error)
        } else {
            Ok(false)
        }
    }

    fn violation(&self, kind: InvariantKind, message: &str, actual: Value, log: bool) -> GuardianError {
        let error = GuardianError::invariant(
            kind,
            message,
            ErrorContext::new()
                .with_actual(actual)
                .with_metadata(json!({ "kind": kind })),
        );
        if log {
            self.logger.error(&format!("{} violated", kind), &error.report_value());
        }
        error
    }
}
