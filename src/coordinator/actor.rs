//! Coordinator actor.
//!
//! Owns the pending queue, acknowledgment store, in-flight marker, backoff
//! and reconciling flags, and the session id. Remote calls and backoff
//! timers run on spawned tasks that report back as messages tagged with the
//! session that started them, so the actor itself never blocks on I/O.

use super::snapshot::{CoordinatorPhase, CoordinatorSnapshot};
use crate::domain::ack::AcknowledgmentStore;
use crate::domain::events::{MutationStateChange, StateChangeHandler};
use crate::domain::failure::{classify, FailureClass, RemoteError, RetryPolicy, SyncFailure};
use crate::domain::mutation::{QueuedMutation, WorkoutMutation};
use crate::domain::queue::PendingQueue;
use crate::domain::types::{ExerciseInstanceId, SessionId, SetKey, WorkoutId};
use crate::remote::{RemoteRequest, WorkoutRemote};
use crate::sync_log::SyncJournal;
use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Messages accepted by the coordinator actor.
pub enum CoordinatorMsg {
    Enqueue(Box<WorkoutMutation>),
    /// Ends reconciliation. When `session` is set, a mismatch with the
    /// current session discards the message.
    FinishReconcile {
        session: Option<SessionId>,
        exercise_ids: Vec<ExerciseInstanceId>,
        set_keys: Vec<SetKey>,
    },
    /// Seeds acknowledgments for entities that already exist remotely.
    AcknowledgeExisting {
        exercise_ids: Vec<ExerciseInstanceId>,
        set_keys: Vec<SetKey>,
    },
    SetWorkout(WorkoutId),
    SetHandler(Arc<dyn StateChangeHandler>),
    GetSession(oneshot::Sender<SessionId>),
    Reset(oneshot::Sender<SessionId>),
    GetSnapshot(oneshot::Sender<CoordinatorSnapshot>),
    /// A remote call started under `session` has returned.
    ExecutionFinished {
        session: SessionId,
        queued: QueuedMutation,
        result: Result<(), RemoteError>,
    },
    /// The backoff timer started under `session` has fired.
    BackoffElapsed { session: SessionId },
}

/// Arguments for spawning a coordinator actor.
pub struct CoordinatorArgs {
    pub remote: Arc<dyn WorkoutRemote>,
    pub retry: RetryPolicy,
    pub journal: Option<Arc<SyncJournal>>,
    pub snapshot_tx: watch::Sender<CoordinatorSnapshot>,
}

/// State maintained by the coordinator actor.
pub struct CoordinatorState {
    session: SessionId,
    workout_id: Option<WorkoutId>,
    queue: PendingQueue,
    acks: AcknowledgmentStore,
    in_flight: Option<QueuedMutation>,
    backing_off: bool,
    reconciling: bool,
    handler: Option<Arc<dyn StateChangeHandler>>,
    remote: Arc<dyn WorkoutRemote>,
    retry: RetryPolicy,
    journal: Option<Arc<SyncJournal>>,
    snapshot_tx: watch::Sender<CoordinatorSnapshot>,
}

impl CoordinatorState {
    pub fn new(args: CoordinatorArgs) -> Self {
        Self {
            session: SessionId::first(),
            workout_id: None,
            queue: PendingQueue::new(),
            acks: AcknowledgmentStore::new(),
            in_flight: None,
            backing_off: false,
            reconciling: false,
            handler: None,
            remote: args.remote,
            retry: args.retry,
            journal: args.journal,
            snapshot_tx: args.snapshot_tx,
        }
    }

    pub fn phase(&self) -> CoordinatorPhase {
        if self.reconciling {
            CoordinatorPhase::Reconciling
        } else if self.in_flight.is_some() {
            CoordinatorPhase::Processing
        } else if self.backing_off {
            CoordinatorPhase::BackingOff
        } else if self.queue.is_empty() {
            CoordinatorPhase::Idle
        } else {
            CoordinatorPhase::AwaitingDependency
        }
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let mut ack_exercises: Vec<_> = self.acks.exercises().iter().cloned().collect();
        ack_exercises.sort();
        let mut ack_sets: Vec<_> = self.acks.sets().iter().cloned().collect();
        ack_sets.sort();

        CoordinatorSnapshot {
            session: self.session,
            phase: self.phase(),
            workout_id: self.workout_id.clone(),
            pending: self.queue.to_vec(),
            in_flight: self.in_flight.clone(),
            ack_exercises,
            ack_sets,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn notify(&self, change: MutationStateChange) {
        self.notify_for(self.session, change);
    }

    fn notify_for(&self, session: SessionId, change: MutationStateChange) {
        if let Some(journal) = &self.journal {
            journal.log_state_change(session, &change);
        }
        match &self.handler {
            Some(handler) => handler.on_state_change(change, session),
            None => tracing::debug!("No state change handler; dropping {}", change.kind()),
        }
    }

    fn enqueue(&mut self, mutation: WorkoutMutation, myself: &ActorRef<CoordinatorMsg>) {
        let (queued, outcome) = self.queue.enqueue(mutation);
        tracing::debug!(
            "Enqueued {} {} ({} purged)",
            queued.mutation.kind(),
            queued.id,
            outcome.purged.len()
        );
        if let Some(replaced) = &outcome.coalesced {
            tracing::debug!("Coalesced metadata patch {} into {}", replaced.id, queued.id);
        }
        if let Some(journal) = &self.journal {
            journal.log_enqueued(self.session, &queued, outcome.purged.len());
        }
        self.process(myself);
    }

    /// Dispatches the first ready mutation unless something is already
    /// in flight, a backoff is pending, or reconciliation is running.
    /// Re-entered after every outcome, so there is no inner loop.
    fn process(&mut self, myself: &ActorRef<CoordinatorMsg>) {
        if self.reconciling || self.backing_off || self.in_flight.is_some() {
            return;
        }
        let Some(workout_id) = self.workout_id.clone() else {
            return;
        };
        let Some(mut queued) = self.queue.take_first_ready(&self.acks) else {
            return;
        };

        queued.attempt += 1;
        self.in_flight = Some(queued.clone());
        tracing::debug!(
            "Dispatching {} {} (attempt {})",
            queued.mutation.kind(),
            queued.id,
            queued.attempt
        );
        if let Some(journal) = &self.journal {
            journal.log_dispatched(self.session, &queued);
        }

        let request = RemoteRequest {
            workout_id,
            idempotency_key: queued.id,
            mutation: queued.mutation.clone(),
        };
        let remote = Arc::clone(&self.remote);
        let session = self.session;
        let myself = myself.clone();
        tokio::spawn(async move {
            let result = remote.execute(request).await;
            let message = CoordinatorMsg::ExecutionFinished {
                session,
                queued,
                result,
            };
            if myself.send_message(message).is_err() {
                tracing::debug!("Coordinator stopped before execution finished");
            }
        });
    }

    fn execution_finished(
        &mut self,
        session: SessionId,
        queued: QueuedMutation,
        result: Result<(), RemoteError>,
        myself: &ActorRef<CoordinatorMsg>,
    ) {
        if session != self.session {
            self.report_stale(session, queued, result);
            return;
        }
        self.in_flight = None;

        match result {
            Ok(()) => {
                self.acks.mark_ack(&queued.mutation);
                self.notify(MutationStateChange::SyncSuccess { mutation: queued });
            }
            Err(error) => match classify(&error) {
                FailureClass::Transient if self.retry.can_retry(queued.attempt) => {
                    self.schedule_retry(queued, &error, myself);
                }
                FailureClass::Transient => {
                    tracing::warn!(
                        "Giving up on {} {} after {} attempts: {}",
                        queued.mutation.kind(),
                        queued.id,
                        queued.attempt,
                        error
                    );
                    let attempts = queued.attempt;
                    self.notify(MutationStateChange::SyncFailed {
                        mutation: queued,
                        reason: SyncFailure::RetriesExhausted {
                            attempts,
                            last_error: error,
                        },
                    });
                }
                FailureClass::Referential => {
                    tracing::warn!(
                        "Target of {} {} not found remotely: {}",
                        queued.mutation.kind(),
                        queued.id,
                        error
                    );
                    self.notify(MutationStateChange::SyncFailed {
                        mutation: queued,
                        reason: SyncFailure::TargetNotFound {
                            message: error.to_string(),
                        },
                    });
                    self.begin_reconcile();
                }
            },
        }

        self.process(myself);
    }

    /// Outcomes from a superseded session are reported under that session
    /// and never touch the current queue or acknowledgments.
    fn report_stale(
        &self,
        session: SessionId,
        queued: QueuedMutation,
        result: Result<(), RemoteError>,
    ) {
        tracing::debug!(
            "Outcome of {} {} arrived for {} during {}",
            queued.mutation.kind(),
            queued.id,
            session,
            self.session
        );
        let change = match result {
            Ok(()) => MutationStateChange::SyncSuccess { mutation: queued },
            Err(error) => {
                let reason = match classify(&error) {
                    FailureClass::Referential => SyncFailure::TargetNotFound {
                        message: error.to_string(),
                    },
                    FailureClass::Transient => SyncFailure::RetriesExhausted {
                        attempts: queued.attempt,
                        last_error: error,
                    },
                };
                MutationStateChange::SyncFailed {
                    mutation: queued,
                    reason,
                }
            }
        };
        self.notify_for(session, change);
    }

    fn schedule_retry(
        &mut self,
        queued: QueuedMutation,
        error: &RemoteError,
        myself: &ActorRef<CoordinatorMsg>,
    ) {
        let delay = self.retry.delay_for(queued.attempt);
        tracing::info!(
            "Retrying {} {} in {}ms after attempt {}: {}",
            queued.mutation.kind(),
            queued.id,
            delay.as_millis(),
            queued.attempt,
            error
        );
        if let Some(journal) = &self.journal {
            journal.log_retry_scheduled(self.session, &queued, delay.as_millis() as u64);
        }

        self.queue.push_front(queued);
        self.backing_off = true;

        let session = self.session;
        let myself = myself.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if myself
                .send_message(CoordinatorMsg::BackoffElapsed { session })
                .is_err()
            {
                tracing::debug!("Coordinator stopped before backoff elapsed");
            }
        });
    }

    fn backoff_elapsed(&mut self, session: SessionId, myself: &ActorRef<CoordinatorMsg>) {
        if session != self.session {
            tracing::debug!("Ignoring backoff timer from {}", session);
            return;
        }
        self.backing_off = false;
        self.process(myself);
    }

    fn begin_reconcile(&mut self) {
        if self.reconciling {
            return;
        }
        self.reconciling = true;
        tracing::info!("Reconciliation started for {}", self.session);
        self.notify(MutationStateChange::NeedsReconcile);
    }

    fn finish_reconcile(
        &mut self,
        session: Option<SessionId>,
        exercise_ids: Vec<ExerciseInstanceId>,
        set_keys: Vec<SetKey>,
        myself: &ActorRef<CoordinatorMsg>,
    ) {
        if let Some(session) = session.filter(|s| *s != self.session) {
            tracing::debug!(
                "Ignoring reconciliation result from {} during {}",
                session,
                self.session
            );
            return;
        }
        if !self.reconciling {
            tracing::warn!("finish_reconcile called while not reconciling; ignoring");
            return;
        }
        self.acks.replace(exercise_ids, set_keys);
        let dropped = self.queue.drop_unreachable(&self.acks);
        tracing::info!(
            "Reconciliation finished for {}: {} mutations dropped",
            self.session,
            dropped.len()
        );
        if let Some(journal) = &self.journal {
            journal.log_reconcile_finished(self.session, dropped.len());
        }
        for queued in dropped {
            self.notify(MutationStateChange::SyncFailed {
                mutation: queued,
                reason: SyncFailure::DroppedByReconcile,
            });
        }

        self.reconciling = false;
        self.process(myself);
    }

    fn reset(&mut self) -> SessionId {
        let previous = self.session;
        self.session = previous.next();
        self.workout_id = None;
        self.queue.clear();
        self.acks.clear();
        self.in_flight = None;
        self.backing_off = false;
        self.reconciling = false;
        tracing::info!("Coordinator reset: {} -> {}", previous, self.session);
        if let Some(journal) = &self.journal {
            journal.log_reset(previous, self.session);
        }
        self.session
    }

    fn handle(&mut self, message: CoordinatorMsg, myself: &ActorRef<CoordinatorMsg>) {
        match message {
            CoordinatorMsg::Enqueue(mutation) => self.enqueue(*mutation, myself),
            CoordinatorMsg::FinishReconcile {
                session,
                exercise_ids,
                set_keys,
            } => self.finish_reconcile(session, exercise_ids, set_keys, myself),
            CoordinatorMsg::AcknowledgeExisting {
                exercise_ids,
                set_keys,
            } => {
                self.acks.extend(exercise_ids, set_keys);
                self.process(myself);
            }
            CoordinatorMsg::SetWorkout(workout_id) => {
                self.workout_id = Some(workout_id);
                self.process(myself);
            }
            CoordinatorMsg::SetHandler(handler) => self.handler = Some(handler),
            CoordinatorMsg::GetSession(reply) => {
                if reply.send(self.session).is_err() {
                    tracing::debug!("Session reply channel closed");
                }
            }
            CoordinatorMsg::Reset(reply) => {
                let session = self.reset();
                if reply.send(session).is_err() {
                    tracing::debug!("Reset reply channel closed");
                }
            }
            CoordinatorMsg::GetSnapshot(reply) => {
                if reply.send(self.snapshot()).is_err() {
                    tracing::debug!("Snapshot reply channel closed");
                }
            }
            CoordinatorMsg::ExecutionFinished {
                session,
                queued,
                result,
            } => self.execution_finished(session, queued, result, myself),
            CoordinatorMsg::BackoffElapsed { session } => self.backoff_elapsed(session, myself),
        }
    }
}

/// The coordinator actor.
pub struct CoordinatorActor;

#[async_trait]
impl Actor for CoordinatorActor {
    type Msg = CoordinatorMsg;
    type State = CoordinatorState;
    type Arguments = CoordinatorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let state = CoordinatorState::new(args);
        state.publish();
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.handle(message, &myself);
        state.publish();
        Ok(())
    }
}
