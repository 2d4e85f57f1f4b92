//! Tracks which entities the remote system has confirmed to exist.

use crate::domain::mutation::WorkoutMutation;
use crate::domain::types::{ExerciseInstanceId, SetKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Acknowledged exercise instances and sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgmentStore {
    exercises: HashSet<ExerciseInstanceId>,
    sets: HashSet<SetKey>,
}

impl AcknowledgmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store holding exactly the given entities.
    pub fn from_parts(
        exercises: impl IntoIterator<Item = ExerciseInstanceId>,
        sets: impl IntoIterator<Item = SetKey>,
    ) -> Self {
        Self {
            exercises: exercises.into_iter().collect(),
            sets: sets.into_iter().collect(),
        }
    }

    pub fn has_exercise(&self, id: &ExerciseInstanceId) -> bool {
        self.exercises.contains(id)
    }

    pub fn has_set(&self, key: &SetKey) -> bool {
        self.sets.contains(key)
    }

    pub fn exercises(&self) -> &HashSet<ExerciseInstanceId> {
        &self.exercises
    }

    pub fn sets(&self) -> &HashSet<SetKey> {
        &self.sets
    }

    /// Adds pre-existing entities (resumed workouts) without removing any.
    pub fn extend(
        &mut self,
        exercises: impl IntoIterator<Item = ExerciseInstanceId>,
        sets: impl IntoIterator<Item = SetKey>,
    ) {
        self.exercises.extend(exercises);
        self.sets.extend(sets);
    }

    /// Replaces the whole store with authoritative state.
    pub fn replace(
        &mut self,
        exercises: impl IntoIterator<Item = ExerciseInstanceId>,
        sets: impl IntoIterator<Item = SetKey>,
    ) {
        *self = Self::from_parts(exercises, sets);
    }

    pub fn clear(&mut self) {
        self.exercises.clear();
        self.sets.clear();
    }

    /// Records the effect of a mutation the remote system accepted.
    pub fn mark_ack(&mut self, mutation: &WorkoutMutation) {
        match mutation {
            WorkoutMutation::AddExercise {
                instance_id, sets, ..
            } => {
                self.exercises.insert(instance_id.clone());
                for spec in sets {
                    self.sets
                        .insert(SetKey::new(instance_id.clone(), spec.set_id.clone()));
                }
            }
            WorkoutMutation::AddSet {
                exercise_instance_id,
                set_id,
                ..
            } => {
                self.sets.insert(SetKey::new(
                    exercise_instance_id.clone(),
                    set_id.clone(),
                ));
            }
            WorkoutMutation::RemoveExercise { instance_id } => {
                self.exercises.remove(instance_id);
                self.sets
                    .retain(|key| &key.exercise_instance_id != instance_id);
            }
            WorkoutMutation::RemoveSet {
                exercise_instance_id,
                set_id,
            } => {
                self.sets.remove(&SetKey::new(
                    exercise_instance_id.clone(),
                    set_id.clone(),
                ));
            }
            WorkoutMutation::PatchSet { .. }
            | WorkoutMutation::LogSet { .. }
            | WorkoutMutation::ReorderExercises { .. }
            | WorkoutMutation::PatchWorkoutMetadata { .. } => {}
        }
    }

    /// Dependency resolver: true when every precondition of `mutation` is
    /// acknowledged.
    pub fn can_execute(&self, mutation: &WorkoutMutation) -> bool {
        let exercise_ready = mutation
            .exercise_dependency()
            .is_none_or(|id| self.exercises.contains(id));
        let set_ready = mutation
            .set_dependency()
            .is_none_or(|key| self.sets.contains(&key));
        exercise_ready && set_ready
    }
}

#[cfg(test)]
#[path = "tests/ack_tests.rs"]
mod tests;
