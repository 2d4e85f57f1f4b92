//! Workout document model shared by the in-process remote store and the
//! local state owner.

use crate::domain::mutation::WorkoutMutation;
use crate::domain::types::{
    ExerciseId, ExerciseInstanceId, MetadataField, PatchValue, SetField, SetId, SetKey, SetSpec,
    SetType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Why a mutation could not be applied to a [`Workout`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyError {
    /// The exercise or set the mutation targets does not exist.
    NotFound { target: String },
    /// The patch value has the wrong type or range for the field.
    InvalidValue { field: &'static str, value: String },
}

impl Display for ApplyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { target } => write!(f, "{} not found", target),
            Self::InvalidValue { field, value } => {
                write!(f, "invalid value {} for {}", value, field)
            }
        }
    }
}

impl std::error::Error for ApplyError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedSet {
    pub weight: Option<f64>,
    pub reps: u32,
    pub rir: Option<u32>,
    pub is_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    pub set_id: SetId,
    pub set_type: SetType,
    pub reps: u32,
    pub rir: Option<u32>,
    pub weight: Option<f64>,
    #[serde(default)]
    pub is_failure: bool,
    /// What was actually performed, once logged.
    #[serde(default)]
    pub logged: Option<LoggedSet>,
}

impl From<&SetSpec> for WorkoutSet {
    fn from(spec: &SetSpec) -> Self {
        Self {
            set_id: spec.set_id.clone(),
            set_type: spec.set_type,
            reps: spec.reps,
            rir: spec.rir,
            weight: spec.weight,
            is_failure: false,
            logged: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutExercise {
    pub instance_id: ExerciseInstanceId,
    pub exercise_id: ExerciseId,
    pub name: String,
    #[serde(default)]
    pub sets: Vec<WorkoutSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exercises: Vec<WorkoutExercise>,
}

impl Workout {
    pub fn exercise(&self, instance_id: &ExerciseInstanceId) -> Option<&WorkoutExercise> {
        self.exercises.iter().find(|e| &e.instance_id == instance_id)
    }

    fn exercise_mut(
        &mut self,
        instance_id: &ExerciseInstanceId,
    ) -> Result<&mut WorkoutExercise, ApplyError> {
        self.exercises
            .iter_mut()
            .find(|e| &e.instance_id == instance_id)
            .ok_or_else(|| ApplyError::NotFound {
                target: format!("exercise {}", instance_id),
            })
    }

    fn set_mut(
        &mut self,
        instance_id: &ExerciseInstanceId,
        set_id: &SetId,
    ) -> Result<&mut WorkoutSet, ApplyError> {
        self.exercise_mut(instance_id)?
            .sets
            .iter_mut()
            .find(|s| &s.set_id == set_id)
            .ok_or_else(|| ApplyError::NotFound {
                target: format!("set {}/{}", instance_id, set_id),
            })
    }

    pub fn exercise_ids(&self) -> Vec<ExerciseInstanceId> {
        self.exercises.iter().map(|e| e.instance_id.clone()).collect()
    }

    pub fn set_keys(&self) -> Vec<SetKey> {
        self.exercises
            .iter()
            .flat_map(|e| {
                e.sets
                    .iter()
                    .map(move |s| SetKey::new(e.instance_id.clone(), s.set_id.clone()))
            })
            .collect()
    }

    /// Keeps only the exercises and sets the predicates accept.
    pub fn retain(
        &mut self,
        mut keep_exercise: impl FnMut(&ExerciseInstanceId) -> bool,
        mut keep_set: impl FnMut(&SetKey) -> bool,
    ) {
        self.exercises.retain(|e| keep_exercise(&e.instance_id));
        for exercise in &mut self.exercises {
            let instance_id = exercise.instance_id.clone();
            exercise
                .sets
                .retain(|s| keep_set(&SetKey::new(instance_id.clone(), s.set_id.clone())));
        }
    }

    /// Applies one mutation. Creating something that already exists is a
    /// no-op so that replays of the same edit converge.
    pub fn apply(&mut self, mutation: &WorkoutMutation) -> Result<(), ApplyError> {
        match mutation {
            WorkoutMutation::AddExercise {
                instance_id,
                exercise_id,
                name,
                position,
                sets,
            } => {
                if self.exercise(instance_id).is_some() {
                    return Ok(());
                }
                let index = (*position).min(self.exercises.len());
                self.exercises.insert(
                    index,
                    WorkoutExercise {
                        instance_id: instance_id.clone(),
                        exercise_id: exercise_id.clone(),
                        name: name.clone(),
                        sets: sets.iter().map(WorkoutSet::from).collect(),
                    },
                );
            }
            WorkoutMutation::RemoveExercise { instance_id } => {
                let index = self
                    .exercises
                    .iter()
                    .position(|e| &e.instance_id == instance_id)
                    .ok_or_else(|| ApplyError::NotFound {
                        target: format!("exercise {}", instance_id),
                    })?;
                self.exercises.remove(index);
            }
            WorkoutMutation::AddSet {
                exercise_instance_id,
                set_id,
                set_type,
                reps,
                rir,
                weight,
            } => {
                let exercise = self.exercise_mut(exercise_instance_id)?;
                if exercise.sets.iter().all(|s| &s.set_id != set_id) {
                    exercise.sets.push(WorkoutSet {
                        set_id: set_id.clone(),
                        set_type: *set_type,
                        reps: *reps,
                        rir: *rir,
                        weight: *weight,
                        is_failure: false,
                        logged: None,
                    });
                }
            }
            WorkoutMutation::RemoveSet {
                exercise_instance_id,
                set_id,
            } => {
                let exercise = self.exercise_mut(exercise_instance_id)?;
                let index = exercise
                    .sets
                    .iter()
                    .position(|s| &s.set_id == set_id)
                    .ok_or_else(|| ApplyError::NotFound {
                        target: format!("set {}/{}", exercise_instance_id, set_id),
                    })?;
                exercise.sets.remove(index);
            }
            WorkoutMutation::PatchSet {
                exercise_instance_id,
                set_id,
                field,
                value,
            } => {
                let set = self.set_mut(exercise_instance_id, set_id)?;
                patch_set(set, *field, value)?;
            }
            WorkoutMutation::LogSet {
                exercise_instance_id,
                set_id,
                weight,
                reps,
                rir,
                is_failure,
            } => {
                let set = self.set_mut(exercise_instance_id, set_id)?;
                set.logged = Some(LoggedSet {
                    weight: *weight,
                    reps: *reps,
                    rir: *rir,
                    is_failure: is_failure.unwrap_or(false),
                });
            }
            WorkoutMutation::ReorderExercises { order } => {
                // Listed ids first, in order; unlisted ones keep their
                // relative order after them.
                let mut reordered = Vec::with_capacity(self.exercises.len());
                for instance_id in order {
                    if let Some(index) = self
                        .exercises
                        .iter()
                        .position(|e| &e.instance_id == instance_id)
                    {
                        reordered.push(self.exercises.remove(index));
                    }
                }
                reordered.append(&mut self.exercises);
                self.exercises = reordered;
            }
            WorkoutMutation::PatchWorkoutMetadata { field, value } => match field {
                MetadataField::Name => {
                    let name = value.as_text().ok_or_else(|| invalid_value("name", value))?;
                    self.name = Some(name.to_string());
                }
                MetadataField::StartTime => {
                    let parsed = value
                        .as_text()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .ok_or_else(|| invalid_value("start_time", value))?;
                    self.start_time = Some(parsed.with_timezone(&Utc));
                }
            },
        }
        Ok(())
    }
}

fn invalid_value(field: &'static str, value: &PatchValue) -> ApplyError {
    ApplyError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

fn patch_set(set: &mut WorkoutSet, field: SetField, value: &PatchValue) -> Result<(), ApplyError> {
    match field {
        SetField::Reps => {
            set.reps = value
                .as_int()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| invalid_value("reps", value))?;
        }
        SetField::Rir => {
            let rir = value
                .as_int()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| invalid_value("rir", value))?;
            set.rir = Some(rir);
        }
        SetField::Weight => {
            set.weight = Some(value.as_float().ok_or_else(|| invalid_value("weight", value))?);
        }
        SetField::SetType => {
            set.set_type = value
                .as_text()
                .and_then(SetType::parse)
                .ok_or_else(|| invalid_value("set_type", value))?;
        }
        SetField::IsFailure => {
            set.is_failure = value
                .as_bool()
                .ok_or_else(|| invalid_value("is_failure", value))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/workout_tests.rs"]
mod tests;
