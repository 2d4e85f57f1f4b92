//! Mutation coordinator: a single-writer queue that replays local workout
//! edits against the remote store in dependency order.
//!
//! [`MutationCoordinator`] is a cheap handle around a ractor actor. Every call
//! is a message, so callers (including state change handlers running on the
//! actor task) never observe the coordinator mid-update.

pub mod actor;
pub mod snapshot;

pub use actor::{CoordinatorActor, CoordinatorArgs, CoordinatorMsg, CoordinatorState};
pub use snapshot::{CoordinatorPhase, CoordinatorSnapshot};

use crate::config::SyncConfig;
use crate::domain::errors::CoordinatorError;
use crate::domain::events::StateChangeHandler;
use crate::domain::mutation::WorkoutMutation;
use crate::domain::types::{ExerciseInstanceId, SessionId, SetKey, WorkoutId};
use crate::remote::WorkoutRemote;
use crate::sync_log::SyncJournal;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorRef};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};

pub struct MutationCoordinator {
    actor: ActorRef<CoordinatorMsg>,
    snapshot_rx: watch::Receiver<CoordinatorSnapshot>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl MutationCoordinator {
    /// Spawns the coordinator actor. Opens the journal if one is configured.
    pub async fn spawn(
        remote: Arc<dyn WorkoutRemote>,
        config: &SyncConfig,
    ) -> Result<Self, CoordinatorError> {
        let journal = match &config.journal.path {
            Some(path) => Some(Arc::new(SyncJournal::open(path).map_err(|e| {
                CoordinatorError::SpawnFailed {
                    message: format!("journal {}: {}", path.display(), e),
                }
            })?)),
            None => None,
        };

        let (snapshot_tx, snapshot_rx) =
            watch::channel(CoordinatorSnapshot::initial(SessionId::first()));
        let args = CoordinatorArgs {
            remote,
            retry: config.retry.clone(),
            journal,
            snapshot_tx,
        };

        let (actor, join) = CoordinatorActor::spawn(None, CoordinatorActor, args)
            .await
            .map_err(|e| CoordinatorError::SpawnFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            actor,
            snapshot_rx,
            join: Mutex::new(Some(join)),
        })
    }

    fn send(&self, message: CoordinatorMsg) -> Result<(), CoordinatorError> {
        self.actor
            .send_message(message)
            .map_err(|_| CoordinatorError::Stopped)
    }

    async fn ask<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMsg,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx))?;
        rx.await.map_err(|_| CoordinatorError::NoReply)
    }

    /// Queues a mutation and kicks the executor.
    pub fn enqueue(&self, mutation: WorkoutMutation) -> Result<(), CoordinatorError> {
        self.send(CoordinatorMsg::Enqueue(Box::new(mutation)))
    }

    /// Completes a reconciliation with the authoritative entity ids.
    pub fn finish_reconcile(
        &self,
        exercise_ids: Vec<ExerciseInstanceId>,
        set_keys: Vec<SetKey>,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorMsg::FinishReconcile {
            session: None,
            exercise_ids,
            set_keys,
        })
    }

    /// Like [`MutationCoordinator::finish_reconcile`], but discarded unless
    /// `session` is still current when the coordinator handles it.
    pub fn finish_reconcile_for(
        &self,
        session: SessionId,
        exercise_ids: Vec<ExerciseInstanceId>,
        set_keys: Vec<SetKey>,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorMsg::FinishReconcile {
            session: Some(session),
            exercise_ids,
            set_keys,
        })
    }

    /// Marks entities loaded from the remote store as acknowledged.
    pub fn acknowledge_existing(
        &self,
        exercise_ids: Vec<ExerciseInstanceId>,
        set_keys: Vec<SetKey>,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorMsg::AcknowledgeExisting {
            exercise_ids,
            set_keys,
        })
    }

    /// Sets the workout every remote call targets. Nothing is dispatched
    /// until one is set.
    pub fn set_workout(&self, workout_id: WorkoutId) -> Result<(), CoordinatorError> {
        self.send(CoordinatorMsg::SetWorkout(workout_id))
    }

    pub fn set_state_change_handler(
        &self,
        handler: Arc<dyn StateChangeHandler>,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorMsg::SetHandler(handler))
    }

    pub async fn session_id(&self) -> Result<SessionId, CoordinatorError> {
        self.ask(CoordinatorMsg::GetSession).await
    }

    /// Starts a new session, discarding all queued and in-flight work.
    pub async fn reset(&self) -> Result<SessionId, CoordinatorError> {
        self.ask(CoordinatorMsg::Reset).await
    }

    /// Current state, ordered after every message sent before this call.
    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot, CoordinatorError> {
        self.ask(CoordinatorMsg::GetSnapshot).await
    }

    /// Receiver updated after every message the coordinator handles.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Waits until `predicate` holds for a snapshot taken after every
    /// message sent before this call.
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&CoordinatorSnapshot) -> bool,
    ) -> Result<CoordinatorSnapshot, CoordinatorError> {
        let mut rx = self.snapshot_rx.clone();
        rx.mark_unchanged();

        let current = self.snapshot().await?;
        if predicate(&current) {
            return Ok(current);
        }
        loop {
            rx.changed().await.map_err(|_| CoordinatorError::Stopped)?;
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return Ok(snapshot);
            }
        }
    }

    /// Waits until nothing is in flight, backing off, or reconciling and no
    /// queued mutation can run.
    pub async fn settle(&self) -> Result<CoordinatorSnapshot, CoordinatorError> {
        self.wait_until(|snapshot| snapshot.phase.is_settled()).await
    }

    /// Stops the actor and waits for it to exit. Later calls return at once.
    pub async fn shutdown(&self) {
        self.actor.stop(None);
        let join = self.join.lock().ok().and_then(|mut guard| guard.take());
        if let Some(join) = join {
            if let Err(e) = join.await {
                tracing::warn!("Coordinator task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
