//! Tests for the mutation coordinator running against the in-process remote.

use super::*;
use crate::config::JournalConfig;
use crate::domain::events::{ChannelHandler, MutationStateChange, StateChangeEnvelope};
use crate::domain::failure::{RemoteError, RetryPolicy, SyncFailure};
use crate::domain::fixtures::*;
use crate::remote::{Fault, InMemoryRemote};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

fn fast_config(backoff_base_ms: u64) -> SyncConfig {
    SyncConfig {
        retry: RetryPolicy {
            max_retries: 3,
            backoff_base_ms,
            jitter: 0.0,
        },
        ..SyncConfig::default()
    }
}

fn workout() -> WorkoutId {
    WorkoutId::from("w1")
}

async fn start_with(
    remote: &InMemoryRemote,
    config: &SyncConfig,
) -> (
    MutationCoordinator,
    mpsc::UnboundedReceiver<StateChangeEnvelope>,
) {
    remote.create_workout(&workout()).await;
    let coordinator = MutationCoordinator::spawn(Arc::new(remote.clone()), config)
        .await
        .expect("spawn coordinator");
    let (handler, rx) = ChannelHandler::new();
    coordinator
        .set_state_change_handler(Arc::new(handler))
        .expect("set handler");
    coordinator.set_workout(workout()).expect("set workout");
    (coordinator, rx)
}

async fn start(
    remote: &InMemoryRemote,
) -> (
    MutationCoordinator,
    mpsc::UnboundedReceiver<StateChangeEnvelope>,
) {
    start_with(remote, &fast_config(5)).await
}

async fn next_change(rx: &mut mpsc::UnboundedReceiver<StateChangeEnvelope>) -> StateChangeEnvelope {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for state change")
        .expect("handler channel closed")
}

fn success_kind(envelope: &StateChangeEnvelope) -> &'static str {
    match &envelope.change {
        MutationStateChange::SyncSuccess { mutation } => mutation.mutation.kind(),
        other => panic!("expected SyncSuccess, got {:?}", other),
    }
}

async fn received_kinds(remote: &InMemoryRemote) -> Vec<&'static str> {
    remote
        .received()
        .await
        .iter()
        .map(|r| r.mutation.kind())
        .collect()
}

#[tokio::test]
async fn test_executes_in_order_and_acknowledges() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    coordinator.enqueue(add_set("a", "s2")).expect("enqueue");
    coordinator.enqueue(log_set("a", "s1", 80.0, 5)).expect("enqueue");

    assert_eq!(success_kind(&next_change(&mut rx).await), "add_exercise");
    assert_eq!(success_kind(&next_change(&mut rx).await), "add_set");
    assert_eq!(success_kind(&next_change(&mut rx).await), "log_set");

    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.phase, CoordinatorPhase::Idle);
    assert_eq!(snapshot.ack_exercises, vec![ExerciseInstanceId::from("a")]);
    assert_eq!(snapshot.ack_sets.len(), 2);

    let stored = remote.workout(&workout()).await.expect("workout exists");
    assert_eq!(stored.exercises[0].sets.len(), 2);
    assert!(stored.exercises[0].sets[0].logged.is_some());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_dependent_waits_for_parent_acknowledgment() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    // Queued ahead of its parent: the resolver must skip it.
    coordinator.enqueue(add_set("a", "s2")).expect("enqueue");
    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");

    assert_eq!(success_kind(&next_change(&mut rx).await), "add_exercise");
    assert_eq!(success_kind(&next_change(&mut rx).await), "add_set");
    assert_eq!(received_kinds(&remote).await, vec!["add_exercise", "add_set"]);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_unacknowledged_dependency_stays_queued() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    coordinator.enqueue(patch_reps("ghost", "s1", 5)).expect("enqueue");
    coordinator.enqueue(reorder(&[])).expect("enqueue");

    assert_eq!(success_kind(&next_change(&mut rx).await), "reorder_exercises");
    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.phase, CoordinatorPhase::AwaitingDependency);
    assert_eq!(snapshot.pending.len(), 1);
    assert_eq!(received_kinds(&remote).await, vec!["reorder_exercises"]);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_acknowledge_existing_unblocks_edits() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;
    remote
        .execute(crate::remote::RemoteRequest {
            workout_id: workout(),
            idempotency_key: crate::domain::types::IdempotencyKey::new(),
            mutation: add_exercise("a", &["s1"]),
        })
        .await
        .expect("seed remote");

    coordinator.enqueue(patch_reps("a", "s1", 12)).expect("enqueue");
    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.phase, CoordinatorPhase::AwaitingDependency);

    coordinator
        .acknowledge_existing(
            vec![ExerciseInstanceId::from("a")],
            vec![SetKey::new("a".into(), "s1".into())],
        )
        .expect("acknowledge");
    assert_eq!(success_kind(&next_change(&mut rx).await), "patch_set");
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_nothing_dispatched_without_workout() {
    let remote = InMemoryRemote::new();
    let coordinator = MutationCoordinator::spawn(Arc::new(remote.clone()), &fast_config(5))
        .await
        .expect("spawn");

    coordinator.enqueue(rename("Push day")).expect("enqueue");
    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.phase, CoordinatorPhase::AwaitingDependency);
    assert!(remote.received().await.is_empty());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_remove_purges_queued_dependents() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    remote.hold();
    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    coordinator.enqueue(add_set("a", "s2")).expect("enqueue");
    coordinator.enqueue(patch_reps("a", "s1", 3)).expect("enqueue");
    coordinator.enqueue(remove_exercise("a")).expect("enqueue");

    let snapshot = coordinator.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.phase, CoordinatorPhase::Processing);
    let pending: Vec<_> = snapshot.pending.iter().map(|q| q.mutation.kind()).collect();
    assert_eq!(pending, vec!["remove_exercise"]);

    remote.release();
    assert_eq!(success_kind(&next_change(&mut rx).await), "add_exercise");
    assert_eq!(success_kind(&next_change(&mut rx).await), "remove_exercise");
    coordinator.settle().await.expect("settle");

    assert_eq!(
        received_kinds(&remote).await,
        vec!["add_exercise", "remove_exercise"]
    );
    assert!(rx.try_recv().is_err(), "purged mutations emit nothing");
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_metadata_patches_coalesce_while_queued() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    remote.hold();
    coordinator.enqueue(add_exercise("a", &[])).expect("enqueue");
    coordinator.enqueue(rename("Legs")).expect("enqueue");
    coordinator.enqueue(rename("Leg day")).expect("enqueue");

    let snapshot = coordinator.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.pending.len(), 1);

    remote.release();
    next_change(&mut rx).await;
    next_change(&mut rx).await;
    coordinator.settle().await.expect("settle");

    let stored = remote.workout(&workout()).await.expect("workout");
    assert_eq!(stored.name.as_deref(), Some("Leg day"));
    assert_eq!(remote.received().await.len(), 2);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_transient_failure_retries_with_same_key() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;
    remote
        .inject(Fault::Before {
            error: RemoteError::network("connection reset"),
        })
        .await;

    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    let change = next_change(&mut rx).await;
    match change.change {
        MutationStateChange::SyncSuccess { mutation } => assert_eq!(mutation.attempt, 2),
        other => panic!("expected success, got {:?}", other),
    }

    let received = remote.received().await;
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].idempotency_key, received[1].idempotency_key);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_lost_response_is_applied_once() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;
    remote
        .inject(Fault::AfterApply {
            error: RemoteError::server(503, "gateway timeout"),
        })
        .await;

    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    assert_eq!(success_kind(&next_change(&mut rx).await), "add_exercise");

    let stored = remote.workout(&workout()).await.expect("workout");
    assert_eq!(stored.exercises.len(), 1);
    assert_eq!(remote.received().await.len(), 2);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_retries_are_bounded_then_queue_continues() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;
    for _ in 0..3 {
        remote
            .inject(Fault::Before {
                error: RemoteError::server(500, "internal error"),
            })
            .await;
    }

    coordinator.enqueue(add_exercise("a", &[])).expect("enqueue");
    coordinator.enqueue(rename("Pull")).expect("enqueue");

    let failed = next_change(&mut rx).await;
    match failed.change {
        MutationStateChange::SyncFailed {
            mutation,
            reason: SyncFailure::RetriesExhausted { attempts, .. },
        } => {
            assert_eq!(mutation.mutation.kind(), "add_exercise");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    assert_eq!(
        success_kind(&next_change(&mut rx).await),
        "patch_workout_metadata"
    );

    let snapshot = coordinator.settle().await.expect("settle");
    assert!(snapshot.ack_exercises.is_empty());
    assert_eq!(remote.received().await.len(), 4);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_referential_failure_reconciles_and_drops_orphans() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    next_change(&mut rx).await;
    assert!(
        remote
            .remove_exercise_externally(&workout(), &ExerciseInstanceId::from("a"))
            .await
    );

    remote.hold();
    coordinator.enqueue(patch_reps("a", "s1", 6)).expect("enqueue");
    coordinator.enqueue(log_set("a", "s1", 70.0, 6)).expect("enqueue");
    coordinator.enqueue(rename("Recovered")).expect("enqueue");
    remote.release();

    match next_change(&mut rx).await.change {
        MutationStateChange::SyncFailed {
            mutation,
            reason: SyncFailure::TargetNotFound { .. },
        } => assert_eq!(mutation.mutation.kind(), "patch_set"),
        other => panic!("expected target not found, got {:?}", other),
    }
    assert_eq!(
        next_change(&mut rx).await.change,
        MutationStateChange::NeedsReconcile
    );

    let snapshot = coordinator
        .wait_until(|s| s.phase == CoordinatorPhase::Reconciling)
        .await
        .expect("reconciling");
    assert_eq!(snapshot.pending.len(), 2);
    assert_eq!(remote.received().await.len(), 2);

    let structure = remote.fetch_structure(&workout()).await.expect("fetch");
    coordinator
        .finish_reconcile(structure.exercise_ids(), structure.set_keys())
        .expect("finish reconcile");

    match next_change(&mut rx).await.change {
        MutationStateChange::SyncFailed {
            mutation,
            reason: SyncFailure::DroppedByReconcile,
        } => assert_eq!(mutation.mutation.kind(), "log_set"),
        other => panic!("expected dropped log_set, got {:?}", other),
    }
    assert_eq!(
        success_kind(&next_change(&mut rx).await),
        "patch_workout_metadata"
    );

    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.phase, CoordinatorPhase::Idle);
    assert!(snapshot.ack_exercises.is_empty());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_finish_reconcile_outside_reconciliation_is_ignored() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    next_change(&mut rx).await;
    coordinator
        .finish_reconcile(Vec::new(), Vec::new())
        .expect("finish reconcile");

    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.ack_exercises, vec![ExerciseInstanceId::from("a")]);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_finish_reconcile_from_other_session_is_ignored() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;

    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    next_change(&mut rx).await;
    assert!(
        remote
            .remove_exercise_externally(&workout(), &ExerciseInstanceId::from("a"))
            .await
    );
    coordinator.enqueue(patch_reps("a", "s1", 6)).expect("enqueue");
    next_change(&mut rx).await;
    assert_eq!(
        next_change(&mut rx).await.change,
        MutationStateChange::NeedsReconcile
    );

    let session = coordinator.session_id().await.expect("session");
    coordinator
        .finish_reconcile_for(SessionId(session.0 + 1), Vec::new(), Vec::new())
        .expect("finish reconcile");
    let snapshot = coordinator.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.phase, CoordinatorPhase::Reconciling);
    assert_eq!(snapshot.ack_exercises, vec![ExerciseInstanceId::from("a")]);

    coordinator
        .finish_reconcile_for(session, Vec::new(), Vec::new())
        .expect("finish reconcile");
    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.phase, CoordinatorPhase::Idle);
    assert!(snapshot.ack_exercises.is_empty());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_reset_fences_in_flight_outcome() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start(&remote).await;
    let first = coordinator.session_id().await.expect("session");

    remote.hold();
    coordinator.enqueue(add_exercise("a", &["s1"])).expect("enqueue");
    coordinator.enqueue(add_set("a", "s2")).expect("enqueue");
    let second = coordinator.reset().await.expect("reset");
    assert_eq!(second, first.next());

    let snapshot = coordinator.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.session, second);
    assert!(snapshot.pending.is_empty());
    assert!(snapshot.in_flight.is_none());
    assert!(snapshot.workout_id.is_none());

    remote.release();
    let stale = next_change(&mut rx).await;
    assert_eq!(stale.session, first);
    assert_eq!(success_kind(&stale), "add_exercise");

    let snapshot = coordinator.settle().await.expect("settle");
    assert!(snapshot.ack_exercises.is_empty(), "stale success must not ack");
    assert_eq!(remote.received().await.len(), 1);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_stale_backoff_timer_is_ignored() {
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start_with(&remote, &fast_config(40)).await;
    remote
        .inject(Fault::Before {
            error: RemoteError::network("offline"),
        })
        .await;

    coordinator.enqueue(add_exercise("a", &[])).expect("enqueue");
    coordinator
        .wait_until(|s| s.phase == CoordinatorPhase::BackingOff)
        .await
        .expect("backing off");

    let session = coordinator.reset().await.expect("reset");
    coordinator.set_workout(workout()).expect("set workout");
    coordinator.enqueue(rename("Fresh")).expect("enqueue");

    let change = next_change(&mut rx).await;
    assert_eq!(change.session, session);
    assert_eq!(success_kind(&change), "patch_workout_metadata");

    tokio::time::sleep(Duration::from_millis(80)).await;
    let snapshot = coordinator.settle().await.expect("settle");
    assert_eq!(snapshot.phase, CoordinatorPhase::Idle);
    assert_eq!(
        received_kinds(&remote).await,
        vec!["add_exercise", "patch_workout_metadata"]
    );
    assert!(rx.try_recv().is_err());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_journal_records_activity() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("logs").join("sync.jsonl");
    let config = SyncConfig {
        journal: JournalConfig {
            path: Some(path.clone()),
        },
        ..fast_config(5)
    };
    let remote = InMemoryRemote::new();
    let (coordinator, mut rx) = start_with(&remote, &config).await;

    coordinator.enqueue(add_exercise("a", &[])).expect("enqueue");
    next_change(&mut rx).await;
    coordinator.shutdown().await;

    let content = std::fs::read_to_string(&path).expect("read journal");
    assert!(content.contains("\"Enqueued\""));
    assert!(content.contains("\"Dispatched\""));
    assert!(content.contains("\"StateChange\""));
}

#[tokio::test]
async fn test_spawn_fails_when_journal_cannot_open() {
    let dir = tempdir().expect("temp dir");
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "x").expect("write");
    let config = SyncConfig {
        journal: JournalConfig {
            path: Some(blocker.join("sync.jsonl")),
        },
        ..fast_config(5)
    };

    let result = MutationCoordinator::spawn(Arc::new(InMemoryRemote::new()), &config).await;
    assert!(matches!(result, Err(CoordinatorError::SpawnFailed { .. })));
}
