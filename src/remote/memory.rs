//! In-process authoritative workout store.
//!
//! Applies every mutation variant with real semantics, de-duplicates retried
//! attempts by idempotency key, and can be scripted to fail or to hold calls
//! so that ordering, retry and reconciliation behaviour can be observed
//! deterministically.

use super::{RemoteExerciseEntry, RemoteRequest, RemoteStructure, WorkoutRemote};
use crate::domain::failure::RemoteError;
use crate::domain::types::{ExerciseInstanceId, IdempotencyKey, WorkoutId};
use crate::domain::workout::{ApplyError, Workout};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// A scripted failure consumed by the next remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Fault {
    /// Reject the call without applying it.
    Before { error: RemoteError },
    /// Apply the call, then report failure (a lost response).
    AfterApply { error: RemoteError },
}

fn structure_of(workout: &Workout) -> RemoteStructure {
    RemoteStructure {
        exercises: workout
            .exercises
            .iter()
            .map(|e| RemoteExerciseEntry {
                instance_id: e.instance_id.clone(),
                set_ids: e.sets.iter().map(|s| s.set_id.clone()).collect(),
            })
            .collect(),
    }
}

fn to_remote_error(error: ApplyError) -> RemoteError {
    match error {
        ApplyError::NotFound { target } => RemoteError::target_not_found(target),
        ApplyError::InvalidValue { .. } => RemoteError::Server {
            status: Some(422),
            code: Some("INVALID_VALUE".to_string()),
            message: error.to_string(),
        },
    }
}

#[derive(Default)]
struct MemoryState {
    workouts: HashMap<WorkoutId, Workout>,
    applied: HashSet<IdempotencyKey>,
    received: Vec<RemoteRequest>,
    faults: VecDeque<Fault>,
}

/// In-process implementation of [`WorkoutRemote`].
#[derive(Clone)]
pub struct InMemoryRemote {
    state: Arc<Mutex<MemoryState>>,
    gate: Arc<watch::Sender<bool>>,
    latency: Duration,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            gate: Arc::new(gate),
            latency: Duration::ZERO,
        }
    }

    /// Adds a fixed delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Creates an empty workout. Existing workouts are left untouched.
    pub async fn create_workout(&self, workout_id: &WorkoutId) {
        let mut state = self.state.lock().await;
        state.workouts.entry(workout_id.clone()).or_default();
    }

    /// Replaces a workout's contents, as if loaded from storage.
    pub async fn seed_workout(&self, workout_id: &WorkoutId, workout: Workout) {
        let mut state = self.state.lock().await;
        state.workouts.insert(workout_id.clone(), workout);
    }

    pub async fn workout(&self, workout_id: &WorkoutId) -> Option<Workout> {
        self.state.lock().await.workouts.get(workout_id).cloned()
    }

    /// Deletes an exercise behind the client's back, as another device would.
    pub async fn remove_exercise_externally(
        &self,
        workout_id: &WorkoutId,
        instance_id: &ExerciseInstanceId,
    ) -> bool {
        let mut state = self.state.lock().await;
        match state.workouts.get_mut(workout_id) {
            Some(workout) => {
                let before = workout.exercises.len();
                workout.exercises.retain(|e| &e.instance_id != instance_id);
                workout.exercises.len() != before
            }
            None => false,
        }
    }

    /// Queues a fault for the next call that does not already have one.
    pub async fn inject(&self, fault: Fault) {
        self.state.lock().await.faults.push_back(fault);
    }

    /// Every request received, in arrival order, including retries.
    pub async fn received(&self) -> Vec<RemoteRequest> {
        self.state.lock().await.received.clone()
    }

    /// Blocks subsequent calls until [`InMemoryRemote::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    async fn wait_for_gate(&self) {
        let mut rx = self.gate.subscribe();
        if rx.wait_for(|open| *open).await.is_err() {
            tracing::debug!("Remote gate closed");
        }
    }
}

#[async_trait]
impl WorkoutRemote for InMemoryRemote {
    async fn execute(&self, request: RemoteRequest) -> Result<(), RemoteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        {
            // Record arrival before the gate so held calls are observable.
            let mut state = self.state.lock().await;
            state.received.push(request.clone());
        }
        self.wait_for_gate().await;

        let mut state = self.state.lock().await;
        let fault = state.faults.pop_front();
        if let Some(Fault::Before { error }) = fault {
            return Err(error);
        }

        if !state.applied.contains(&request.idempotency_key) {
            let workout = state.workouts.get_mut(&request.workout_id).ok_or_else(|| {
                RemoteError::target_not_found(format!("workout {}", request.workout_id))
            })?;
            workout.apply(&request.mutation).map_err(to_remote_error)?;
            state.applied.insert(request.idempotency_key);
        }

        match fault {
            Some(Fault::AfterApply { error }) => Err(error),
            _ => Ok(()),
        }
    }

    async fn fetch_structure(
        &self,
        workout_id: &WorkoutId,
    ) -> Result<RemoteStructure, RemoteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let state = self.state.lock().await;
        state
            .workouts
            .get(workout_id)
            .map(structure_of)
            .ok_or_else(|| RemoteError::target_not_found(format!("workout {}", workout_id)))
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
