//! Mutation builders shared by tests.

use crate::domain::mutation::WorkoutMutation;
use crate::domain::types::{
    ExerciseId, ExerciseInstanceId, MetadataField, PatchValue, SetField, SetId, SetSpec, SetType,
};

pub fn set_spec(set_id: &str) -> SetSpec {
    SetSpec {
        set_id: SetId::from(set_id),
        set_type: SetType::Working,
        reps: 8,
        rir: Some(2),
        weight: Some(60.0),
    }
}

pub fn add_exercise(instance: &str, sets: &[&str]) -> WorkoutMutation {
    WorkoutMutation::AddExercise {
        instance_id: ExerciseInstanceId::from(instance),
        exercise_id: ExerciseId::from("bench-press"),
        name: "Bench Press".to_string(),
        position: 0,
        sets: sets.iter().map(|s| set_spec(s)).collect(),
    }
}

pub fn remove_exercise(instance: &str) -> WorkoutMutation {
    WorkoutMutation::RemoveExercise {
        instance_id: ExerciseInstanceId::from(instance),
    }
}

pub fn add_set(instance: &str, set_id: &str) -> WorkoutMutation {
    WorkoutMutation::AddSet {
        exercise_instance_id: ExerciseInstanceId::from(instance),
        set_id: SetId::from(set_id),
        set_type: SetType::Working,
        reps: 10,
        rir: Some(1),
        weight: None,
    }
}

pub fn remove_set(instance: &str, set_id: &str) -> WorkoutMutation {
    WorkoutMutation::RemoveSet {
        exercise_instance_id: ExerciseInstanceId::from(instance),
        set_id: SetId::from(set_id),
    }
}

pub fn patch_reps(instance: &str, set_id: &str, reps: i64) -> WorkoutMutation {
    WorkoutMutation::PatchSet {
        exercise_instance_id: ExerciseInstanceId::from(instance),
        set_id: SetId::from(set_id),
        field: SetField::Reps,
        value: PatchValue::Int(reps),
    }
}

pub fn log_set(instance: &str, set_id: &str, weight: f64, reps: u32) -> WorkoutMutation {
    WorkoutMutation::LogSet {
        exercise_instance_id: ExerciseInstanceId::from(instance),
        set_id: SetId::from(set_id),
        weight: Some(weight),
        reps,
        rir: None,
        is_failure: None,
    }
}

pub fn reorder(order: &[&str]) -> WorkoutMutation {
    WorkoutMutation::ReorderExercises {
        order: order.iter().map(|s| ExerciseInstanceId::from(*s)).collect(),
    }
}

pub fn rename(name: &str) -> WorkoutMutation {
    WorkoutMutation::PatchWorkoutMetadata {
        field: MetadataField::Name,
        value: PatchValue::Text(name.to_string()),
    }
}
