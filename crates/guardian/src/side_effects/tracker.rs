//! The effect log, snapshot table and policy enforcement.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::diff::diff;
use super::{EffectKind, EffectPolicy, SideEffect, TrackedExecution};
use crate::clock::{Clock, SystemClock};
use crate::error::{ErrorContext, GuardResult, GuardianError};
use crate::logger::Logger;

/// Default bound on the effect log.
pub const DEFAULT_MAX_EFFECTS: usize = 1000;

/// Hook invoked for every recorded effect.
pub type EffectHook = Arc<dyn Fn(&SideEffect) + Send + Sync>;

/// Opaque identity assigned to a tracked value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SnapshotId(Uuid);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value carrying a stable identity for mutation snapshots.
///
/// The tracker only stores a deep copy keyed by the id; it never holds the
/// value itself, and dropping the value leaves the tracker untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    id: SnapshotId,
    value: T,
}

impl<T> Tracked<T> {
    /// Wrap a value with a fresh identity, without snapshotting it.
    pub fn new(value: T) -> Self {
        Self {
            id: SnapshotId(Uuid::new_v4()),
            value,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

struct Snapshot {
    baseline: Value,
    label: Option<String>,
}

#[derive(Default)]
struct TrackerState {
    effects: VecDeque<SideEffect>,
    /// Effects ever recorded; never decreases, so windows survive eviction.
    recorded: u64,
    snapshots: HashMap<SnapshotId, Snapshot>,
}

pub struct SideEffectTracker {
    state: Mutex<TrackerState>,
    max_effects: usize,
    on_effect: Option<EffectHook>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
}

impl SideEffectTracker {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            max_effects: DEFAULT_MAX_EFFECTS,
            on_effect: None,
            clock: Arc::new(SystemClock),
            logger,
        }
    }

    pub fn with_max_effects(mut self, max_effects: usize) -> Self {
        self.max_effects = max_effects;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn on_effect_detected(mut self, hook: EffectHook) -> Self {
        self.on_effect = Some(hook);
        self
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Effect log
    // ------------------------------------------------------------------------

    /// Append an effect, evicting the oldest past `max_effects`.
    pub fn track(&self, kind: EffectKind, description: impl Into<String>, context: Option<Value>) -> SideEffect {
        let effect = SideEffect {
            id: Uuid::new_v4(),
            kind,
            description: description.into(),
            timestamp: self.clock.now(),
            context,
        };

        {
            let mut state = self.lock();
            state.effects.push_back(effect.clone());
            state.recorded += 1;
            while state.effects.len() > self.max_effects {
                state.effects.pop_front();
            }
        }

        if let Some(hook) = &self.on_effect {
            hook(&effect);
        }
        effect
    }

    /// Retained effects, oldest first.
    pub fn effects(&self) -> Vec<SideEffect> {
        self.lock().effects.iter().cloned().collect()
    }

    /// Retained effect count per kind.
    pub fn summary(&self) -> BTreeMap<EffectKind, usize> {
        let mut summary = BTreeMap::new();
        for effect in self.lock().effects.iter() {
            *summary.entry(effect.kind).or_insert(0) += 1;
        }
        summary
    }

    /// Empty the effect log and drop every snapshot.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.effects.clear();
        state.snapshots.clear();
    }

    // ------------------------------------------------------------------------
    // Mutation snapshots
    // ------------------------------------------------------------------------

    /// Give `value` an identity and record a deep copy of it.
    ///
    /// The value is handed back wrapped, ready to be used in place.
    pub fn snapshot<T: Serialize>(&self, value: T, label: Option<&str>) -> GuardResult<Tracked<T>> {
        let tracked = Tracked::new(value);
        self.resnapshot(&tracked, label)?;
        Ok(tracked)
    }

    /// Replace the baseline for an already tracked value.
    pub fn resnapshot<T: Serialize>(&self, tracked: &Tracked<T>, label: Option<&str>) -> GuardResult<()> {
        let baseline = deep_copy(&tracked.value)?;
        self.lock().snapshots.insert(
            tracked.id,
            Snapshot {
                baseline,
                label: label.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn snapshot_count(&self) -> usize {
        self.lock().snapshots.len()
    }

    /// Diff the live value against its baseline.
    ///
    /// A value that was never snapshotted (or whose snapshot was cleared)
    /// only logs a warning. Any difference raises a side-effect error
    /// carrying the full mutation list.
    pub fn verify_no_mutations<T: Serialize>(&self, tracked: &Tracked<T>) -> GuardResult<()> {
        let snapshot = self
            .lock()
            .snapshots
            .get(&tracked.id)
            .map(|snapshot| (snapshot.baseline.clone(), snapshot.label.clone()));
        let Some((baseline, label)) = snapshot else {
            self.logger.warn(
                "cannot verify mutations for a value without a snapshot",
                &json!({ "snapshot_id": tracked.id.to_string() }),
            );
            return Ok(());
        };

        let current = deep_copy(&tracked.value)?;
        let mutations = diff(&baseline, &current);
        if mutations.is_empty() {
            return Ok(());
        }

        let name = label.clone().unwrap_or_else(|| tracked.id.to_string());
        let rendered: Vec<String> = mutations.iter().map(ToString::to_string).collect();
        let error = GuardianError::mutated(
            format!("{} was mutated: {}", name, rendered.join(", ")),
            mutations.clone(),
            ErrorContext::new()
                .with_input(baseline)
                .with_actual(current)
                .with_metadata(json!({ "label": label, "mutations": mutations })),
        );
        self.logger.error("unexpected mutation", &error.report_value());
        Err(error)
    }

    // ------------------------------------------------------------------------
    // Scoped policies
    // ------------------------------------------------------------------------

    /// Run `block` to completion, then check the effects it recorded against `policy`.
    ///
    /// Forbidden kinds fail the call and drop the block's result. Kinds
    /// outside `allowed` (but not forbidden) only log a warning.
    pub async fn track_execution<T, F, Fut>(&self, policy: EffectPolicy, block: F) -> GuardResult<TrackedExecution<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let boundary = self.lock().recorded;

        let result = block().await?;

        let effects = self.effects_since(boundary);
        let label = policy.label.as_deref().unwrap_or("anonymous block");

        if let Some(forbidden) = &policy.forbidden {
            let violations: Vec<&SideEffect> = effects.iter().filter(|e| forbidden.contains(&e.kind)).collect();
            if !violations.is_empty() {
                let kinds: Vec<EffectKind> = violations.iter().map(|e| e.kind).collect();
                let error = GuardianError::side_effect(
                    format!("{} produced forbidden effects {:?}", label, kinds),
                    ErrorContext::new()
                        .with_expected(json!({ "forbidden": forbidden }))
                        .with_actual(json!(violations))
                        .with_metadata(json!({ "label": label, "effect_count": effects.len() })),
                );
                self.logger.error("forbidden side effect", &error.report_value());
                return Err(error);
            }
        }

        if let Some(allowed) = &policy.allowed {
            let unexpected: Vec<EffectKind> = effects
                .iter()
                .map(|e| e.kind)
                .filter(|kind| !allowed.contains(kind))
                .collect();
            if !unexpected.is_empty() {
                self.logger.warn(
                    "block produced effects outside its allowed set",
                    &json!({ "label": label, "allowed": allowed, "unexpected": unexpected }),
                );
            }
        }

        Ok(TrackedExecution { result, effects })
    }

    fn effects_since(&self, boundary: u64) -> Vec<SideEffect> {
        let state = self.lock();
        let new = (state.recorded - boundary) as usize;
        let retained = new.min(state.effects.len());
        state.effects.iter().skip(state.effects.len() - retained).cloned().collect()
    }
}

impl fmt::Debug for SideEffectTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SideEffectTracker")
            .field("effects", &state.effects.len())
            .field("snapshots", &state.snapshots.len())
            .field("max_effects", &self.max_effects)
            .finish()
    }
}

fn deep_copy<T: Serialize>(value: &T) -> GuardResult<Value> {
    serde_json::to_value(value).map_err(|err| GuardianError::configuration(format!("value cannot be snapshotted: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardianError;
    use crate::logger::NoopLogger;
    use serde::Serialize;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn tracker() -> SideEffectTracker {
        SideEffectTracker::new(Arc::new(NoopLogger))
    }

    #[derive(Debug, Clone, Serialize)]
    struct Counter {
        count: u32,
    }

    #[test]
    fn test_log_is_bounded_fifo() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let tracker = tracker()
            .with_max_effects(2)
            .on_effect_detected(Arc::new(move |_: &SideEffect| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        tracker.track(EffectKind::Io, "read config", None);
        tracker.track(EffectKind::Network, "GET /health", None);
        tracker.track(EffectKind::Storage, "write cache", Some(json!({ "key": "k" })));

        let effects = tracker.effects();
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0].description, "GET /health");
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_summary_groups_by_kind() {
        let tracker = tracker();
        tracker.track(EffectKind::Console, "a", None);
        tracker.track(EffectKind::Console, "b", None);
        tracker.track(EffectKind::Timer, "c", None);

        let summary = tracker.summary();
        assert_eq!(summary.get(&EffectKind::Console), Some(&2));
        assert_eq!(summary.get(&EffectKind::Timer), Some(&1));
        assert_eq!(summary.get(&EffectKind::Network), None);
    }

    #[test]
    fn test_counter_mutation_is_reported() {
        let tracker = tracker();
        let mut counter = tracker.snapshot(Counter { count: 1 }, Some("counter")).unwrap();

        counter.count = 2;
        let err = tracker.verify_no_mutations(&counter).unwrap_err();

        assert_eq!(err.mutations().len(), 1);
        assert_eq!(err.mutations()[0].to_string(), "count: 1 -> 2");
        assert!(err.message().starts_with("counter was mutated"));
    }

    #[test]
    fn test_untouched_value_verifies() {
        let tracker = tracker();
        let counter = tracker.snapshot(Counter { count: 1 }, None).unwrap();
        assert!(tracker.verify_no_mutations(&counter).is_ok());
        assert_eq!(counter.into_inner().count, 1);
    }

    #[test]
    fn test_untracked_value_only_warns() {
        let tracker = tracker();
        let stranger = Tracked::new(Counter { count: 9 });
        assert!(tracker.verify_no_mutations(&stranger).is_ok());
    }

    #[test]
    fn test_resnapshot_overwrites_baseline() {
        let tracker = tracker();
        let mut counter = tracker.snapshot(Counter { count: 1 }, Some("counter")).unwrap();

        counter.count = 5;
        tracker.resnapshot(&counter, Some("counter")).unwrap();

        assert!(tracker.verify_no_mutations(&counter).is_ok());
        assert_eq!(tracker.snapshot_count(), 1);
    }

    #[test]
    fn test_clear_drops_log_and_snapshots() {
        let tracker = tracker();
        let mut counter = tracker.snapshot(Counter { count: 1 }, None).unwrap();
        tracker.track(EffectKind::Dom, "render", None);

        tracker.clear();
        counter.count = 3;

        assert!(tracker.effects().is_empty());
        assert_eq!(tracker.snapshot_count(), 0);
        assert!(tracker.verify_no_mutations(&counter).is_ok());
    }

    #[tokio::test]
    async fn test_forbidden_effect_fails_after_block_completes() {
        let tracker = tracker();
        let finished = AtomicBool::new(false);

        let err = tracker
            .track_execution(EffectPolicy::new().forbid([EffectKind::Network]).label("pricing"), || async {
                tracker.track(EffectKind::Network, "POST /quote", None);
                tracker.track(EffectKind::Console, "log quote", None);
                finished.store(true, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap_err();

        assert!(finished.load(Ordering::SeqCst));
        assert!(matches!(err, GuardianError::SideEffect { .. }));
        assert!(err.message().contains("pricing"));
    }

    #[tokio::test]
    async fn test_unlisted_effect_only_warns() {
        let tracker = tracker();
        tracker.track(EffectKind::Io, "before the block", None);

        let run = tracker
            .track_execution(EffectPolicy::new().allow([EffectKind::Io]), || async {
                tracker.track(EffectKind::Storage, "persist draft", None);
                Ok("saved")
            })
            .await
            .unwrap();

        assert_eq!(run.result, "saved");
        assert_eq!(run.effects.len(), 1);
        assert_eq!(run.effects[0].kind, EffectKind::Storage);
    }

    #[tokio::test]
    async fn test_window_survives_eviction() {
        let tracker = tracker().with_max_effects(3);
        for i in 0..3 {
            tracker.track(EffectKind::Io, format!("old {i}"), None);
        }

        let run = tracker
            .track_execution(EffectPolicy::new(), || async {
                tracker.track(EffectKind::Timer, "tick", None);
                tracker.track(EffectKind::Timer, "tock", None);
                Ok(())
            })
            .await
            .unwrap();

        let descriptions: Vec<&str> = run.effects.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, vec!["tick", "tock"]);
    }
}
