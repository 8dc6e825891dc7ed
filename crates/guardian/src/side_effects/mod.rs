//! Side-effect tracking.
//!
//! Three tools share one [`SideEffectTracker`]:
//!
//! - an append-only, bounded log of classified effects ([`SideEffectTracker::track`])
//! - mutation snapshots: capture a deep copy of a value, later diff it
//!   against the live value ([`SideEffectTracker::snapshot`],
//!   [`SideEffectTracker::verify_no_mutations`])
//! - scoped effect policies around a block of async work
//!   ([`SideEffectTracker::track_execution`])
//!
//! # Policy semantics
//!
//! | Effect observed in the block       | Outcome                                 |
//! |------------------------------------|-----------------------------------------|
//! | kind in `forbidden`                | `SideEffectError`, block result dropped |
//! | kind outside `allowed`, not forbidden | warning logged, result returned      |
//! | otherwise                          | result returned                         |
//!
//! The block always runs to completion before the policy is evaluated.

mod diff;
mod tracker;

pub use diff::{diff, Mutation, MutationKind};
pub use tracker::{EffectHook, SideEffectTracker, SnapshotId, Tracked, DEFAULT_MAX_EFFECTS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Classification of an observable effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectKind {
    Mutation,
    Io,
    Network,
    Storage,
    Dom,
    Console,
    Timer,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Mutation => "MUTATION",
            EffectKind::Io => "IO",
            EffectKind::Network => "NETWORK",
            EffectKind::Storage => "STORAGE",
            EffectKind::Dom => "DOM",
            EffectKind::Console => "CONSOLE",
            EffectKind::Timer => "TIMER",
        };
        f.write_str(name)
    }
}

/// One recorded effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffect {
    pub id: Uuid,
    pub kind: EffectKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Effect policy for [`SideEffectTracker::track_execution`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectPolicy {
    pub allowed: Option<Vec<EffectKind>>,
    pub forbidden: Option<Vec<EffectKind>>,
    pub label: Option<String>,
}

impl EffectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, kinds: impl IntoIterator<Item = EffectKind>) -> Self {
        self.allowed = Some(kinds.into_iter().collect());
        self
    }

    pub fn forbid(mut self, kinds: impl IntoIterator<Item = EffectKind>) -> Self {
        self.forbidden = Some(kinds.into_iter().collect());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Result of a tracked block plus the effects it recorded.
#[derive(Debug, Clone)]
pub struct TrackedExecution<T> {
    pub result: T,
    pub effects: Vec<SideEffect>,
}
