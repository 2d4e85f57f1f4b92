//! Structural edits of a workout and their dependencies.
//!
//! Every edit the Local State Owner applies optimistically is described by a
//! [`WorkoutMutation`]. Each variant declares which previously created entity
//! must already be acknowledged by the remote system before it may execute.

use crate::domain::types::{
    ExerciseId, ExerciseInstanceId, IdempotencyKey, MetadataField, PatchValue, SetField, SetId,
    SetKey, SetSpec, SetType, TimestampUtc,
};
use serde::{Deserialize, Serialize};

/// A structural edit of the workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkoutMutation {
    /// Create an exercise instance together with its initial sets.
    AddExercise {
        instance_id: ExerciseInstanceId,
        exercise_id: ExerciseId,
        name: String,
        position: usize,
        #[serde(default)]
        sets: Vec<SetSpec>,
    },
    RemoveExercise {
        instance_id: ExerciseInstanceId,
    },
    AddSet {
        exercise_instance_id: ExerciseInstanceId,
        set_id: SetId,
        #[serde(default)]
        set_type: SetType,
        reps: u32,
        #[serde(default)]
        rir: Option<u32>,
        #[serde(default)]
        weight: Option<f64>,
    },
    RemoveSet {
        exercise_instance_id: ExerciseInstanceId,
        set_id: SetId,
    },
    PatchSet {
        exercise_instance_id: ExerciseInstanceId,
        set_id: SetId,
        field: SetField,
        value: PatchValue,
    },
    /// Record the performed values of a set.
    LogSet {
        exercise_instance_id: ExerciseInstanceId,
        set_id: SetId,
        #[serde(default)]
        weight: Option<f64>,
        reps: u32,
        #[serde(default)]
        rir: Option<u32>,
        #[serde(default)]
        is_failure: Option<bool>,
    },
    ReorderExercises {
        order: Vec<ExerciseInstanceId>,
    },
    PatchWorkoutMetadata {
        field: MetadataField,
        value: PatchValue,
    },
}

impl WorkoutMutation {
    /// Exercise instance that must be acknowledged before this edit can run.
    pub fn exercise_dependency(&self) -> Option<&ExerciseInstanceId> {
        match self {
            WorkoutMutation::RemoveExercise { instance_id } => Some(instance_id),
            WorkoutMutation::AddSet {
                exercise_instance_id,
                ..
            }
            | WorkoutMutation::RemoveSet {
                exercise_instance_id,
                ..
            }
            | WorkoutMutation::PatchSet {
                exercise_instance_id,
                ..
            }
            | WorkoutMutation::LogSet {
                exercise_instance_id,
                ..
            } => Some(exercise_instance_id),
            WorkoutMutation::AddExercise { .. }
            | WorkoutMutation::ReorderExercises { .. }
            | WorkoutMutation::PatchWorkoutMetadata { .. } => None,
        }
    }

    /// Set that must be acknowledged before this edit can run.
    pub fn set_dependency(&self) -> Option<SetKey> {
        match self {
            WorkoutMutation::RemoveSet {
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
            } => Some(SetKey::new(exercise_instance_id.clone(), set_id.clone())),
            _ => None,
        }
    }

    /// Returns true for edits that create an addressable entity.
    ///
    /// The Local State Owner rolls these back when they fail terminally.
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            WorkoutMutation::AddExercise { .. } | WorkoutMutation::AddSet { .. }
        )
    }

    /// Short machine-readable name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkoutMutation::AddExercise { .. } => "add_exercise",
            WorkoutMutation::RemoveExercise { .. } => "remove_exercise",
            WorkoutMutation::AddSet { .. } => "add_set",
            WorkoutMutation::RemoveSet { .. } => "remove_set",
            WorkoutMutation::PatchSet { .. } => "patch_set",
            WorkoutMutation::LogSet { .. } => "log_set",
            WorkoutMutation::ReorderExercises { .. } => "reorder_exercises",
            WorkoutMutation::PatchWorkoutMetadata { .. } => "patch_workout_metadata",
        }
    }
}

/// A mutation waiting in the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Stable across retries; sent as the idempotency key.
    pub id: IdempotencyKey,
    /// Number of remote attempts started so far.
    pub attempt: u32,
    pub mutation: WorkoutMutation,
    pub created_at: TimestampUtc,
}

impl QueuedMutation {
    pub fn new(mutation: WorkoutMutation) -> Self {
        Self {
            id: IdempotencyKey::new(),
            attempt: 0,
            mutation,
            created_at: TimestampUtc::now(),
        }
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
