//! Remote store contract and its adapters.
//!
//! The coordinator only knows the [`WorkoutRemote`] trait. Two adapters ship
//! with the crate: an in-process authoritative store used by tests and the
//! replay CLI, and a blocking HTTP client run on tokio's blocking pool.

pub mod http;
pub mod memory;

pub use http::HttpRemote;
pub use memory::{Fault, InMemoryRemote};

use crate::domain::failure::RemoteError;
use crate::domain::mutation::WorkoutMutation;
use crate::domain::types::{ExerciseInstanceId, IdempotencyKey, SetId, SetKey, WorkoutId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One remote attempt of a queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub workout_id: WorkoutId,
    /// Identical for every attempt of the same queued mutation.
    pub idempotency_key: IdempotencyKey,
    pub mutation: WorkoutMutation,
}

/// Authoritative shape of a workout: exercise instances and their sets, in
/// remote order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStructure {
    pub exercises: Vec<RemoteExerciseEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteExerciseEntry {
    pub instance_id: ExerciseInstanceId,
    #[serde(default)]
    pub set_ids: Vec<SetId>,
}

impl RemoteStructure {
    pub fn exercise_ids(&self) -> Vec<ExerciseInstanceId> {
        self.exercises.iter().map(|e| e.instance_id.clone()).collect()
    }

    pub fn set_keys(&self) -> Vec<SetKey> {
        self.exercises
            .iter()
            .flat_map(|e| {
                e.set_ids
                    .iter()
                    .map(move |set_id| SetKey::new(e.instance_id.clone(), set_id.clone()))
            })
            .collect()
    }
}

/// Response envelope of the remote contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<RemoteErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    pub code: String,
    pub message: String,
}

/// Authoritative remote store for workouts.
#[async_trait]
pub trait WorkoutRemote: Send + Sync {
    /// Applies one mutation. Must be idempotent per `idempotency_key`.
    async fn execute(&self, request: RemoteRequest) -> Result<(), RemoteError>;

    /// Returns the exercise instances and sets that currently exist.
    async fn fetch_structure(&self, workout_id: &WorkoutId)
        -> Result<RemoteStructure, RemoteError>;
}
