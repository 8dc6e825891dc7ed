//! # Logic Guardian
//!
//! In-process contract enforcement and resilience for business logic:
//! schema validation with sanitization, pre/postconditions, guarded state
//! machines, side-effect tracking and circuit breakers, behind one
//! [`Guardian`] handle.
//!
//! ## Architecture
//!
//! ```text
//! caller
//!   │
//!   ▼
//! Guardian (Clone, Arc inside) ──────────────────────────────┐
//!   │                                                        │
//!   ├─► SchemaValidator   preprocess ─► sanitize ─► check    │
//!   │                                                        │
//!   ├─► Invariants        require / ensure / invariant       │
//!   │                                                        │
//!   ├─► StateMachine<S>   (created per workflow)             │
//!   │                                                        │
//!   ├─► SideEffectTracker effect log + snapshots + policies  │
//!   │                                                        │
//!   └─► CircuitBreakerRegistry                               │
//!           └─► CircuitBreaker ─► operation().await          │
//!                                                            │
//! report() ◄─── breaker stats + effect summary ──────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Guards reject before running** - an open breaker or a disallowed
//!    state never invokes the wrapped operation
//! 2. **Failed transitions do not mutate** - state and history are untouched
//!    on any transition error
//! 3. **Sanitization never rejects** - coercions, clamps and enum fallbacks
//!    are warnings; only the final structural check fails
//! 4. **Forbidden effects are checked after the block finishes** - the block
//!    is never interrupted, its result is discarded
//! 5. **First breaker registration wins** - later configs for a name are ignored
//! 6. **No lock is held across an await**
//!
//! ## Example
//!
//! ```ignore
//! use guardian_core::{CircuitBreakerConfig, Guardian, Schema, ValidateOptions};
//! use serde_json::json;
//!
//! let guardian = Guardian::default();
//!
//! let schema = Schema::object()
//!     .field("sku", Schema::string())
//!     .field("qty", Schema::number().min(1.0).integer());
//! let result = guardian.validate(&json!({ "sku": " A-1 ", "qty": "3" }), &schema.into(), ValidateOptions::default())?;
//! assert!(result.success);
//!
//! let quote = guardian
//!     .execute_with_circuit_breaker(
//!         "pricing",
//!         || async { fetch_quote().await },
//!         Some(CircuitBreakerConfig::new(3, 2, 1_000)),
//!     )
//!     .await?;
//! ```

// Components
pub mod circuit_breaker;
pub mod invariants;
pub mod side_effects;
pub mod state_machine;
pub mod validation;

// Composition root
pub mod guardian;

// Ambient capabilities injected into every component
pub mod clock;
pub mod config;
pub mod error;
pub mod logger;

// Re-export the facade (primary entry point)
pub use guardian::{Guardian, GuardianBuilder, GuardianReport};

// Re-export error types
pub use error::{ErrorContext, ErrorReport, GuardResult, GuardianError, InvariantKind};

// Re-export configuration and capabilities
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GuardianConfig;
pub use logger::{ErrorReporter, LogLevel, Logger, NoopLogger, TracingLogger};

// Re-export component types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState,
};
pub use invariants::{Contract, InvariantOptions, Invariants};
pub use side_effects::{
    diff, EffectHook, EffectKind, EffectPolicy, Mutation, MutationKind, SideEffect, SideEffectTracker, SnapshotId,
    Tracked, TrackedExecution,
};
pub use state_machine::{
    MachineState, StateMachine, StateMachineConfig, Transition, TransitionHook, TransitionRecord,
};
pub use validation::{
    BatchFailure, BatchResult, Field, Issue, NumberSchema, ObjectSchema, Schema, SchemaValidator, StringSchema,
    ValidateOptions, ValidationResult,
};
