//! Guarded finite-state machine with transition history.
//!
//! # Transition rules
//!
//! ```text
//! transition_to(target):
//!     target ∉ states                     → StateError
//!     no declared (current, target)       → on_invalid_transition, StateError
//!     declared but guard returns false    → StateError
//!     otherwise                           → on_transition(from, to).await
//!                                           commit current = target
//!                                           append history entry
//! ```
//!
//! A failed transition never mutates state or history. Forced transitions
//! skip the declared-pair and guard checks but still require a known target.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::{ErrorContext, GuardResult, GuardianError};
use crate::logger::{Logger, TracingLogger};

/// Anything usable as a machine state.
///
/// Auto-implemented for every `Clone + PartialEq + Debug + Send + Sync + 'static` type.
pub trait MachineState: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> MachineState for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Guard evaluated each time a transition is attempted.
pub type Guard = Arc<dyn Fn() -> bool + Send + Sync>;

/// Callback run before a transition commits, while still in the old state.
pub type TransitionHook<S> = Arc<dyn Fn(&S, &S) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Callback run when an undeclared transition is attempted.
pub type InvalidTransitionHook<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;

/// Declared edge between two states.
#[derive(Clone)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    condition: Option<Guard>,
    on_transition: Option<TransitionHook<S>>,
}

impl<S: MachineState> Transition<S> {
    pub fn new(from: S, to: S) -> Self {
        Self {
            from,
            to,
            condition: None,
            on_transition: None,
        }
    }

    /// Only allow this transition while `condition` returns true.
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn on_transition<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_transition = Some(Arc::new(
            move |from: &S, to: &S| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(hook(from, to)) },
        ));
        self
    }

    fn guard_passes(&self) -> bool {
        self.condition.as_ref().map_or(true, |condition| condition())
    }
}

impl<S: fmt::Debug> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("guarded", &self.condition.is_some())
            .field("has_hook", &self.on_transition.is_some())
            .finish()
    }
}

/// Immutable machine definition.
#[derive(Clone)]
pub struct StateMachineConfig<S> {
    pub initial_state: S,
    pub states: Vec<S>,
    pub transitions: Vec<Transition<S>>,
    on_invalid_transition: Option<InvalidTransitionHook<S>>,
}

impl<S: MachineState> StateMachineConfig<S> {
    pub fn new(initial_state: S, states: impl IntoIterator<Item = S>) -> Self {
        Self {
            initial_state,
            states: states.into_iter().collect(),
            transitions: Vec::new(),
            on_invalid_transition: None,
        }
    }

    pub fn transition(mut self, transition: Transition<S>) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn on_invalid_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &S) + Send + Sync + 'static,
    {
        self.on_invalid_transition = Some(Arc::new(hook));
        self
    }
}

/// One committed transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord<S> {
    pub from: S,
    pub to: S,
    pub timestamp: DateTime<Utc>,
    pub forced: bool,
}

pub struct StateMachine<S> {
    config: StateMachineConfig<S>,
    current: S,
    history: Vec<TransitionRecord<S>>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
}

impl<S: MachineState> StateMachine<S> {
    /// Build a machine in its initial state.
    ///
    /// Fails with a state error if the initial state is not declared.
    pub fn new(config: StateMachineConfig<S>) -> GuardResult<Self> {
        if !config.states.contains(&config.initial_state) {
            return Err(GuardianError::state(
                format!("initial state {:?} is not a declared state", config.initial_state),
                ErrorContext::new()
                    .with_actual(state_value(&config.initial_state))
                    .with_expected(states_value(&config.states)),
            ));
        }

        Ok(Self {
            current: config.initial_state.clone(),
            config,
            history: Vec::new(),
            clock: Arc::new(SystemClock),
            logger: Arc::new(TracingLogger::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn current_state(&self) -> &S {
        &self.current
    }

    pub fn history(&self) -> &[TransitionRecord<S>] {
        &self.history
    }

    pub fn states(&self) -> &[S] {
        &self.config.states
    }

    pub fn config(&self) -> &StateMachineConfig<S> {
        &self.config
    }

    pub fn is_in_state(&self, state: &S) -> bool {
        &self.current == state
    }

    pub fn is_in_one_of(&self, states: &[S]) -> bool {
        states.contains(&self.current)
    }

    /// True iff a `(current, target)` transition is declared and its guard passes now.
    pub fn can_transition_to(&self, target: &S) -> bool {
        self.find_transition(target)
            .is_some_and(|transition| transition.guard_passes())
    }

    /// Declared transitions out of the current state whose guard passes now.
    pub fn available_transitions(&self) -> Vec<&Transition<S>> {
        self.config
            .transitions
            .iter()
            .filter(|transition| transition.from == self.current && transition.guard_passes())
            .collect()
    }

    pub async fn transition_to(&mut self, target: S) -> GuardResult<()> {
        self.apply(target, false).await
    }

    /// Transition without requiring a declared pair or a passing guard.
    pub async fn force_transition_to(&mut self, target: S) -> GuardResult<()> {
        self.apply(target, true).await
    }

    /// Back to the initial state with an empty history.
    pub fn reset(&mut self) {
        self.current = self.config.initial_state.clone();
        self.history.clear();
    }

    /// Run `operation` only while the machine is in one of `allowed`.
    ///
    /// The check happens before `operation` is invoked.
    pub async fn guard<T, F, Fut>(&self, allowed: &[S], operation_name: &str, operation: F) -> GuardResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.is_in_one_of(allowed) {
            let error = GuardianError::state(
                format!(
                    "{} requires state in {:?}, current state is {:?}",
                    operation_name, allowed, self.current
                ),
                ErrorContext::new()
                    .with_state(state_value(&self.current))
                    .with_expected(states_value(allowed))
                    .with_metadata(json!({ "operation": operation_name })),
            );
            self.logger.warn("state-gated call rejected", &error.report_value());
            return Err(error);
        }

        Ok(operation().await?)
    }

    async fn apply(&mut self, target: S, force: bool) -> GuardResult<()> {
        if !self.config.states.contains(&target) {
            return Err(GuardianError::state(
                format!("{:?} is not a declared state", target),
                ErrorContext::new()
                    .with_state(state_value(&self.current))
                    .with_actual(state_value(&target))
                    .with_expected(states_value(&self.config.states)),
            ));
        }

        let transition = self.find_transition(&target).cloned();

        if !force {
            let Some(declared) = &transition else {
                if let Some(hook) = &self.config.on_invalid_transition {
                    hook(&self.current, &target);
                }
                let error = GuardianError::state(
                    format!("no transition from {:?} to {:?}", self.current, target),
                    ErrorContext::new()
                        .with_state(state_value(&self.current))
                        .with_actual(state_value(&target))
                        .with_expected(self.targets_value()),
                );
                self.logger.warn("invalid transition attempted", &error.report_value());
                return Err(error);
            };

            if !declared.guard_passes() {
                let error = GuardianError::state(
                    format!("guard rejected transition from {:?} to {:?}", self.current, target),
                    ErrorContext::new()
                        .with_state(state_value(&self.current))
                        .with_actual(state_value(&target))
                        .with_metadata(json!({ "reason": "guard" })),
                );
                self.logger.warn("transition guard failed", &error.report_value());
                return Err(error);
            }
        }

        if let Some(hook) = transition.as_ref().and_then(|t| t.on_transition.clone()) {
            hook(&self.current, &target).await?;
        }

        let from = std::mem::replace(&mut self.current, target.clone());
        self.logger.debug(
            "state transition",
            &json!({ "from": state_value(&from), "to": state_value(&target), "forced": force }),
        );
        self.history.push(TransitionRecord {
            from,
            to: target,
            timestamp: self.clock.now(),
            forced: force,
        });

        Ok(())
    }

    fn find_transition(&self, target: &S) -> Option<&Transition<S>> {
        self.config
            .transitions
            .iter()
            .find(|transition| transition.from == self.current && &transition.to == target)
    }

    fn targets_value(&self) -> Value {
        let targets: Vec<S> = self
            .config
            .transitions
            .iter()
            .filter(|transition| transition.from == self.current)
            .map(|transition| transition.to.clone())
            .collect();
        states_value(&targets)
    }
}

impl<S: fmt::Debug> fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .field("states", &self.config.states)
            .field("transitions", &self.config.transitions)
            .field("history_len", &self.history.len())
            .finish()
    }
}

fn state_value<S: fmt::Debug>(state: &S) -> Value {
    Value::String(format!("{:?}", state))
}

fn states_value<S: fmt::Debug>(states: &[S]) -> Value {
    Value::Array(states.iter().map(state_value).collect())
}
