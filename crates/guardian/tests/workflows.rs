use guardian_core::{
    EffectKind, EffectPolicy, Guardian, InvariantKind, InvariantOptions, LogLevel, ManualClock, StateMachineConfig,
    Transition,
};
use guardian_testing::{article_workflow, ArticleState, RecordingLogger};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn guardian(logger: &RecordingLogger) -> Guardian {
    Guardian::builder()
        .clock(Arc::new(ManualClock::starting_now()))
        .logger(logger.handle())
        .build()
        .unwrap()
}

// ============================================================================
// State machines
// ============================================================================

#[tokio::test]
async fn test_article_publication_flow() {
    let guardian = guardian(&RecordingLogger::new());
    let approved = Arc::new(AtomicBool::new(false));
    let mut machine = guardian.create_state_machine(article_workflow(approved.clone())).unwrap();

    machine.transition_to(ArticleState::Review).await.unwrap();

    let err = machine.transition_to(ArticleState::Published).await.unwrap_err();
    assert_eq!(err.code(), "STATE_ERROR");
    assert_eq!(machine.current_state(), &ArticleState::Review);
    assert!(!machine.can_transition_to(&ArticleState::Published));

    approved.store(true, Ordering::SeqCst);
    machine.transition_to(ArticleState::Published).await.unwrap();

    let steps: Vec<(ArticleState, ArticleState)> = machine.history().iter().map(|r| (r.from, r.to)).collect();
    assert_eq!(
        steps,
        vec![
            (ArticleState::Draft, ArticleState::Review),
            (ArticleState::Review, ArticleState::Published)
        ]
    );
}

#[tokio::test]
async fn test_undeclared_pair_leaves_machine_untouched() {
    let guardian = guardian(&RecordingLogger::new());
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let sink = rejected.clone();
    let config = article_workflow(Arc::new(AtomicBool::new(true))).on_invalid_transition(
        move |from: &ArticleState, to: &ArticleState| {
            sink.lock().unwrap().push((*from, *to));
        },
    );
    let mut machine = guardian.create_state_machine(config).unwrap();

    let err = machine.transition_to(ArticleState::Published).await.unwrap_err();

    assert_eq!(err.code(), "STATE_ERROR");
    assert!(machine.is_in_state(&ArticleState::Draft));
    assert!(machine.history().is_empty());
    assert_eq!(*rejected.lock().unwrap(), vec![(ArticleState::Draft, ArticleState::Published)]);
}

#[tokio::test]
async fn test_failed_hook_aborts_transition() {
    let guardian = guardian(&RecordingLogger::new());
    let config = StateMachineConfig::new("idle", ["idle", "syncing"]).transition(
        Transition::new("idle", "syncing").on_transition(|_from: &&str, _to: &&str| async {
            Err(anyhow::anyhow!("lock unavailable"))
        }),
    );
    let mut machine = guardian.create_state_machine(config).unwrap();

    let err = machine.transition_to("syncing").await.unwrap_err();

    assert_eq!(err.to_string(), "lock unavailable");
    assert_eq!(*machine.current_state(), "idle");
    assert!(machine.history().is_empty());
}

#[tokio::test]
async fn test_state_gated_operation() {
    let guardian = guardian(&RecordingLogger::new());
    let mut machine = guardian
        .create_state_machine(article_workflow(Arc::new(AtomicBool::new(true))))
        .unwrap();
    let edits = AtomicUsize::new(0);

    let err = machine
        .guard(&[ArticleState::Review], "approve", || async {
            edits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();
    assert_eq!(edits.load(Ordering::SeqCst), 0);
    assert_eq!(err.context().unwrap().metadata.as_ref().unwrap()["operation"], "approve");

    machine.transition_to(ArticleState::Review).await.unwrap();
    machine
        .guard(&[ArticleState::Review], "approve", || async {
            edits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(edits.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Side effects
// ============================================================================

#[derive(Debug, Serialize)]
struct Counter {
    count: u32,
}

#[test]
fn test_counter_mutation_is_reported() {
    let guardian = guardian(&RecordingLogger::new());
    let mut counter = guardian.snapshot(Counter { count: 1 }, Some("counter")).unwrap();

    guardian.verify_no_mutations(&counter).unwrap();

    counter.count = 2;
    let err = guardian.verify_no_mutations(&counter).unwrap_err();

    assert_eq!(err.code(), "SIDE_EFFECT_ERROR");
    let rendered: Vec<String> = err.mutations().iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["count: 1 -> 2"]);
}

#[test]
fn test_nested_mutation_names_exact_path() {
    let guardian = guardian(&RecordingLogger::new());
    let mut rng = fastrand::Rng::with_seed(11);

    for _ in 0..50 {
        let mut doc = guardian
            .snapshot(
                json!({ "order": { "lines": [{ "qty": 1 }, { "qty": 2 }], "note": "gift" } }),
                Some("order"),
            )
            .unwrap();
        guardian.verify_no_mutations(&doc).unwrap();

        let line = rng.usize(0..2);
        doc["order"]["lines"][line]["qty"] = json!(rng.u32(10..100));
        let err = guardian.verify_no_mutations(&doc).unwrap_err();

        assert_eq!(err.mutations().len(), 1);
        assert_eq!(err.mutations()[0].path, format!("order.lines[{}].qty", line));
    }
}

#[test]
fn test_unsnapshotted_value_only_warns() {
    let logger = RecordingLogger::new();
    let guardian = guardian(&logger);
    let tracked = guardian.snapshot(json!({ "a": 1 }), None).unwrap();

    guardian.clear_side_effects();

    guardian.verify_no_mutations(&tracked).unwrap();
    assert_eq!(logger.count(LogLevel::Warn), 1);
}

#[tokio::test]
async fn test_forbidden_network_runs_block_to_completion() {
    let guardian = guardian(&RecordingLogger::new());
    let finished = AtomicBool::new(false);

    let err = guardian
        .track_side_effects(
            EffectPolicy::new().forbid([EffectKind::Network]).label("pure pricing"),
            || async {
                guardian.track(EffectKind::Network, "GET /rates", None);
                tokio::task::yield_now().await;
                finished.store(true, Ordering::SeqCst);
                Ok(99)
            },
        )
        .await
        .unwrap_err();

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(err.code(), "SIDE_EFFECT_ERROR");
    assert!(err.message().contains("pure pricing"));
}

#[tokio::test]
async fn test_allowed_overflow_only_warns() {
    let logger = RecordingLogger::new();
    let guardian = guardian(&logger);
    guardian.track(EffectKind::Console, "before the block", None);

    let tracked = guardian
        .track_side_effects(EffectPolicy::new().allow([EffectKind::Storage]), || async {
            guardian.track(EffectKind::Storage, "write cache", None);
            guardian.track(EffectKind::Timer, "schedule flush", None);
            Ok("done")
        })
        .await
        .unwrap();

    assert_eq!(tracked.result, "done");
    let kinds: Vec<EffectKind> = tracked.effects.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EffectKind::Storage, EffectKind::Timer]);
    assert!(logger.contains("outside its allowed set"));
    assert_eq!(guardian.side_effect_summary()[&EffectKind::Console], 1);
}

#[test]
fn test_effect_hook_sees_every_record() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let guardian = Guardian::builder()
        .logger(RecordingLogger::new().handle())
        .on_effect_detected(Arc::new(move |_: &guardian_core::SideEffect| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();

    guardian.track(EffectKind::Io, "read config", None);
    guardian.track(EffectKind::Dom, "render", Some(json!({ "node": "#cart" })));

    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_invariant_errors_carry_kind() {
    let logger = RecordingLogger::new();
    let guardian = guardian(&logger);

    let err = guardian
        .ensure(|total: &i64| *total >= 0, &-5, "total must not be negative", InvariantOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        guardian_core::GuardianError::Invariant { kind: InvariantKind::Postcondition, .. }
    ));
    assert_eq!(logger.count(LogLevel::Error), 1);

    let soft = guardian
        .require(|n: &usize| *n > 0, &0, "need items", InvariantOptions::soft())
        .unwrap();
    assert!(!soft);

    guardian.invariants().disable();
    assert!(guardian.require_in_range(50, 1, 10, "page_size").is_ok());
    guardian.invariants().enable();
    assert!(guardian.require_in_range(50, 1, 10, "page_size").is_err());
    assert!(guardian.require_keys(&json!({ "id": 1 }), &["id", "email"], "user").is_err());
    assert!(guardian.require_not_empty(&[1, 2], "items").is_ok());
}

#[tokio::test]
async fn test_contract_wraps_operation() {
    let guardian = guardian(&RecordingLogger::new());
    let amount = 250u64;

    let receipt = guardian
        .invariants()
        .contract::<String>("charge")
        .requires(move || amount > 0, "amount must be positive")
        .ensures(|receipt: &String| receipt.starts_with("rcpt_"), "receipt id must be prefixed")
        .run(|| async move { Ok(format!("rcpt_{}", amount)) })
        .await
        .unwrap();

    assert_eq!(receipt, "rcpt_250");
}
