//! Error types for the guardian runtime.
//!
//! Every detected violation is raised as a [`GuardianError`]. The five guard
//! kinds (validation, invariant, state, circuit-open, side-effect) share one
//! reporting shape: a message plus an [`ErrorContext`], so logging and
//! monitoring collaborators can render any of them the same way.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::side_effects::Mutation;

/// Structured context attached to every guard error.
///
/// All fields are optional; each error kind fills in what it knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: impl Into<Value>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<Value>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<Value>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Render the context as a JSON object, omitting empty fields.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Which kind of contract check produced an [`GuardianError::Invariant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvariantKind {
    Precondition,
    Postcondition,
    Invariant,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantKind::Precondition => write!(f, "precondition"),
            InvariantKind::Postcondition => write!(f, "postcondition"),
            InvariantKind::Invariant => write!(f, "invariant"),
        }
    }
}

/// Main error type for guard operations.
#[derive(Error, Debug)]
pub enum GuardianError {
    /// Data did not match its schema after sanitization.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// A precondition, postcondition or loop invariant was violated.
    #[error("{kind} violated: {message}")]
    Invariant {
        kind: InvariantKind,
        message: String,
        context: ErrorContext,
    },

    /// Invalid transition, unmet guard, or invalid initial/target state.
    #[error("State error: {message}")]
    State {
        message: String,
        context: ErrorContext,
    },

    /// The breaker is open and the call was rejected without running it.
    #[error("Circuit breaker open: {message}")]
    CircuitOpen {
        message: String,
        context: ErrorContext,
    },

    /// A forbidden effect was observed, or a verified value was mutated.
    #[error("Side effect detected: {message}")]
    SideEffect {
        message: String,
        context: ErrorContext,
        mutations: Vec<Mutation>,
    },

    /// The runtime was asked to do something it was not configured for.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The wrapped operation itself failed; the original error is preserved.
    #[error(transparent)]
    Operation(#[from] anyhow::Error),
}

impl GuardianError {
    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Validation {
            message: message.into(),
            context,
        }
    }

    pub fn invariant(kind: InvariantKind, message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Invariant {
            kind,
            message: message.into(),
            context,
        }
    }

    pub fn state(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::State {
            message: message.into(),
            context,
        }
    }

    pub fn circuit_open(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::CircuitOpen {
            message: message.into(),
            context,
        }
    }

    pub fn side_effect(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::SideEffect {
            message: message.into(),
            context,
            mutations: Vec::new(),
        }
    }

    pub fn mutated(message: impl Into<String>, mutations: Vec<Mutation>, context: ErrorContext) -> Self {
        Self::SideEffect {
            message: message.into(),
            context,
            mutations,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Validation { message, .. }
            | Self::Invariant { message, .. }
            | Self::State { message, .. }
            | Self::CircuitOpen { message, .. }
            | Self::SideEffect { message, .. }
            | Self::Configuration { message } => message.clone(),
            Self::Operation(err) => err.to_string(),
        }
    }

    /// Structured context, if this kind carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Validation { context, .. }
            | Self::Invariant { context, .. }
            | Self::State { context, .. }
            | Self::CircuitOpen { context, .. }
            | Self::SideEffect { context, .. } => Some(context),
            Self::Configuration { .. } | Self::Operation(_) => None,
        }
    }

    /// Mutations recorded by a failed `verify_no_mutations`; empty otherwise.
    pub fn mutations(&self) -> &[Mutation] {
        match self {
            Self::SideEffect { mutations, .. } => mutations,
            _ => &[],
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Invariant { .. } => "INVARIANT_ERROR",
            Self::State { .. } => "STATE_ERROR",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::SideEffect { .. } => "SIDE_EFFECT_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Operation(_) => "OPERATION_FAILED",
        }
    }

    /// True for errors raised by a guard rather than by the wrapped operation.
    pub fn is_guard_violation(&self) -> bool {
        !matches!(self, Self::Operation(_) | Self::Configuration { .. })
    }

    /// Snapshot of this error in the uniform reporting shape.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_string(),
            message: self.message(),
            context: self.context().cloned().unwrap_or_default(),
        }
    }

    pub(crate) fn report_value(&self) -> Value {
        serde_json::to_value(self.report()).unwrap_or(Value::Null)
    }
}

/// Serializable form of a [`GuardianError`] for logging and health views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    pub context: ErrorContext,
}

/// Result type alias for guard operations
pub type GuardResult<T> = std::result::Result<T, GuardianError>;
