//! Reference local state owner.
//!
//! Keeps the optimistic copy of the workout the user is editing. Edits are
//! applied locally first and then handed to the coordinator; notifications
//! are checked against the owner's current session before they touch the
//! local copy.

use crate::coordinator::MutationCoordinator;
use crate::domain::errors::CoordinatorError;
use crate::domain::events::{
    MutationStateChange, StateChangeEnvelope, StateChangeHandler,
};
use crate::domain::failure::{RetryPolicy, SyncFailure};
use crate::domain::mutation::{QueuedMutation, WorkoutMutation};
use crate::domain::types::{ExerciseInstanceId, SessionId, SetKey, WorkoutId};
use crate::domain::workout::{ApplyError, Workout};
use crate::remote::WorkoutRemote;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

/// The entity a mutation is syncing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SyncTarget {
    Workout,
    Exercise(ExerciseInstanceId),
    Set(SetKey),
}

impl SyncTarget {
    pub fn of(mutation: &WorkoutMutation) -> Self {
        match mutation {
            WorkoutMutation::AddExercise { instance_id, .. }
            | WorkoutMutation::RemoveExercise { instance_id } => {
                SyncTarget::Exercise(instance_id.clone())
            }
            WorkoutMutation::ReorderExercises { .. }
            | WorkoutMutation::PatchWorkoutMetadata { .. } => SyncTarget::Workout,
            WorkoutMutation::AddSet {
                exercise_instance_id,
                set_id,
                ..
            }
            | WorkoutMutation::RemoveSet {
                exercise_instance_id,
                set_id,
            }
            | WorkoutMutation::PatchSet {
                exercise_instance_id,
                set_id,
                ..
            }
            | WorkoutMutation::LogSet {
                exercise_instance_id,
                set_id,
                ..
            } => SyncTarget::Set(SetKey::new(exercise_instance_id.clone(), set_id.clone())),
        }
    }
}

/// A sync failure the user should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfacedError {
    pub mutation: String,
    pub target: SyncTarget,
    pub message: String,
    /// True if the optimistic edit was undone.
    pub rolled_back: bool,
}

#[derive(Default)]
struct OwnerState {
    session: Option<SessionId>,
    workout_id: Option<WorkoutId>,
    workout: Workout,
    syncing: HashSet<SyncTarget>,
    /// Entities whose creation has not been acknowledged yet.
    creating: HashSet<SyncTarget>,
    errors: Vec<SurfacedError>,
}

impl OwnerState {
    fn forget_exercise(&mut self, instance_id: &ExerciseInstanceId) {
        let keep = |target: &SyncTarget| match target {
            SyncTarget::Exercise(id) => id != instance_id,
            SyncTarget::Set(key) => &key.exercise_instance_id != instance_id,
            SyncTarget::Workout => true,
        };
        self.syncing.retain(keep);
        self.creating.retain(keep);
    }

    fn settled(&mut self, mutation: &WorkoutMutation) {
        let target = SyncTarget::of(mutation);
        if mutation.is_creation() {
            self.creating.remove(&target);
        }
        self.syncing.remove(&target);
    }

    fn rollback(&mut self, mutation: &WorkoutMutation) -> bool {
        let inverse = match mutation {
            WorkoutMutation::AddExercise { instance_id, .. } => WorkoutMutation::RemoveExercise {
                instance_id: instance_id.clone(),
            },
            WorkoutMutation::AddSet {
                exercise_instance_id,
                set_id,
                ..
            } => WorkoutMutation::RemoveSet {
                exercise_instance_id: exercise_instance_id.clone(),
                set_id: set_id.clone(),
            },
            _ => return false,
        };
        match self.workout.apply(&inverse) {
            Ok(()) => true,
            Err(ApplyError::NotFound { .. }) => false,
            Err(e) => {
                tracing::warn!("Rollback of {} failed: {}", mutation.kind(), e);
                false
            }
        }
    }

    fn failed(&mut self, queued: &QueuedMutation, reason: &SyncFailure) {
        let target = SyncTarget::of(&queued.mutation);
        self.settled(&queued.mutation);
        // Patches to entities that already existed stay in place.
        let rolled_back = queued.mutation.is_creation() && self.rollback(&queued.mutation);
        if rolled_back {
            if let WorkoutMutation::AddExercise { instance_id, .. } = &queued.mutation {
                self.forget_exercise(instance_id);
            }
        }
        self.errors.push(SurfacedError {
            mutation: queued.mutation.kind().to_string(),
            target,
            message: reason.to_string(),
            rolled_back,
        });
    }
}

struct OwnerShared {
    state: Mutex<OwnerState>,
    coordinator: Arc<MutationCoordinator>,
    remote: Arc<dyn WorkoutRemote>,
    retry: RetryPolicy,
    observer: Mutex<Option<mpsc::UnboundedSender<StateChangeEnvelope>>>,
}

impl OwnerShared {
    fn lock(&self) -> MutexGuard<'_, OwnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, change: &MutationStateChange, session: SessionId) {
        let observer = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = observer.as_ref() {
            let envelope = StateChangeEnvelope {
                session,
                change: change.clone(),
            };
            if tx.send(envelope).is_err() {
                tracing::debug!("Owner observer dropped");
            }
        }
    }

    fn handle(self: &Arc<Self>, change: MutationStateChange, session: SessionId) {
        self.observe(&change, session);

        let mut state = self.lock();
        if state.session != Some(session) {
            tracing::debug!(
                "Ignoring {} from {}; current session is {:?}",
                change.kind(),
                session,
                state.session
            );
            return;
        }

        match change {
            MutationStateChange::SyncSuccess { mutation } => {
                state.settled(&mutation.mutation);
            }
            MutationStateChange::SyncFailed { mutation, reason } => {
                tracing::warn!("Sync of {} failed: {}", mutation.mutation.kind(), reason);
                state.failed(&mutation, &reason);
            }
            MutationStateChange::NeedsReconcile => {
                let Some(workout_id) = state.workout_id.clone() else {
                    tracing::warn!("Reconcile requested without a workout");
                    return;
                };
                drop(state);
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = shared.reconcile(session, workout_id).await {
                        tracing::error!("Reconciliation failed: {:#}", e);
                    }
                });
            }
        }
    }

    /// Fetches the authoritative structure, prunes local entities the remote
    /// no longer has (unless their creation is still pending) and completes
    /// the coordinator's reconciliation. Pending patches do not keep an
    /// entity alive: the coordinator drops them once its parent is gone.
    async fn reconcile(&self, session: SessionId, workout_id: WorkoutId) -> Result<()> {
        let mut attempt = 0;
        let structure = loop {
            attempt += 1;
            match self.remote.fetch_structure(&workout_id).await {
                Ok(structure) => break structure,
                Err(e) if self.retry.can_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "Fetching structure failed (attempt {}), retrying in {}ms: {}",
                        attempt,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to fetch structure of workout {}", workout_id)
                    })
                }
            }
        };

        let exercise_ids = structure.exercise_ids();
        let set_keys = structure.set_keys();
        {
            let mut state = self.lock();
            if state.session != Some(session) {
                tracing::debug!("Dropping reconciliation for superseded {}", session);
                return Ok(());
            }
            let remote_exercises: HashSet<_> = exercise_ids.iter().cloned().collect();
            let remote_sets: HashSet<_> = set_keys.iter().cloned().collect();
            let creating = state.creating.clone();
            state.workout.retain(
                |id| {
                    remote_exercises.contains(id)
                        || creating.contains(&SyncTarget::Exercise(id.clone()))
                },
                |key| {
                    remote_sets.contains(key)
                        || creating.contains(&SyncTarget::Set(key.clone()))
                        || creating.contains(&SyncTarget::Exercise(key.exercise_instance_id.clone()))
                },
            );
        }

        self.coordinator
            .finish_reconcile_for(session, exercise_ids, set_keys)
            .context("Failed to finish reconciliation")?;
        Ok(())
    }
}

/// Registered with the coordinator. Holds a weak reference so the
/// coordinator does not keep the owner alive.
struct OwnerHandler(Weak<OwnerShared>);

impl StateChangeHandler for OwnerHandler {
    fn on_state_change(&self, change: MutationStateChange, session: SessionId) {
        match self.0.upgrade() {
            Some(shared) => shared.handle(change, session),
            None => tracing::debug!("Owner dropped; ignoring {}", change.kind()),
        }
    }
}

/// Optimistic local copy of a workout, kept in sync through a coordinator.
pub struct LocalWorkout {
    shared: Arc<OwnerShared>,
}

impl LocalWorkout {
    /// Creates the owner and registers it as the coordinator's handler.
    pub fn new(
        coordinator: Arc<MutationCoordinator>,
        remote: Arc<dyn WorkoutRemote>,
        retry: RetryPolicy,
    ) -> Result<Self, CoordinatorError> {
        let shared = Arc::new(OwnerShared {
            state: Mutex::new(OwnerState::default()),
            coordinator,
            remote,
            retry,
            observer: Mutex::new(None),
        });
        shared
            .coordinator
            .set_state_change_handler(Arc::new(OwnerHandler(Arc::downgrade(&shared))))?;
        Ok(Self { shared })
    }

    /// Begins editing `workout_id` starting from `initial`, which must
    /// mirror what the remote store already holds. Resets the coordinator,
    /// so anything still pending for a previous workout is abandoned.
    pub async fn start(&self, workout_id: WorkoutId, initial: Workout) -> Result<SessionId> {
        let coordinator = &self.shared.coordinator;
        let session = coordinator
            .reset()
            .await
            .context("Failed to reset coordinator")?;

        let exercise_ids = initial.exercise_ids();
        let set_keys = initial.set_keys();
        {
            let mut state = self.shared.lock();
            *state = OwnerState {
                session: Some(session),
                workout_id: Some(workout_id.clone()),
                workout: initial,
                ..OwnerState::default()
            };
        }

        coordinator.acknowledge_existing(exercise_ids, set_keys)?;
        coordinator.set_workout(workout_id.clone())?;
        tracing::info!("Started {} for workout {}", session, workout_id);
        Ok(session)
    }

    /// Applies an edit locally, then queues it for the remote store.
    pub fn apply(&self, mutation: WorkoutMutation) -> Result<()> {
        {
            let mut state = self.shared.lock();
            if state.session.is_none() {
                anyhow::bail!("No workout started");
            }
            state
                .workout
                .apply(&mutation)
                .with_context(|| format!("Failed to apply {} locally", mutation.kind()))?;
            if let WorkoutMutation::RemoveExercise { instance_id } = &mutation {
                state.forget_exercise(instance_id);
            }
            if let WorkoutMutation::RemoveSet {
                exercise_instance_id,
                set_id,
            } = &mutation
            {
                let target = SyncTarget::Set(SetKey::new(
                    exercise_instance_id.clone(),
                    set_id.clone(),
                ));
                state.syncing.remove(&target);
                state.creating.remove(&target);
            }
            let target = SyncTarget::of(&mutation);
            if mutation.is_creation() {
                state.creating.insert(target.clone());
            }
            state.syncing.insert(target);
        }

        self.shared.coordinator.enqueue(mutation)?;
        Ok(())
    }

    /// Receives every notification the owner sees, stale ones included.
    pub fn observe(&self) -> mpsc::UnboundedReceiver<StateChangeEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    pub fn coordinator(&self) -> &Arc<MutationCoordinator> {
        &self.shared.coordinator
    }

    pub fn session(&self) -> Option<SessionId> {
        self.shared.lock().session
    }

    pub fn workout(&self) -> Workout {
        self.shared.lock().workout.clone()
    }

    pub fn is_syncing(&self, target: &SyncTarget) -> bool {
        self.shared.lock().syncing.contains(target)
    }

    pub fn errors(&self) -> Vec<SurfacedError> {
        self.shared.lock().errors.clone()
    }
}

#[cfg(test)]
#[path = "tests/owner_tests.rs"]
mod tests;
