use super::*;
use crate::domain::fixtures::*;

fn workout_with(instances: &[(&str, &[&str])]) -> Workout {
    let mut workout = Workout::default();
    for (position, (instance, sets)) in instances.iter().enumerate() {
        let mut mutation = add_exercise(instance, sets);
        if let WorkoutMutation::AddExercise { position: p, .. } = &mut mutation {
            *p = position;
        }
        workout.apply(&mutation).expect("add exercise");
    }
    workout
}

#[test]
fn test_add_exercise_twice_is_noop() {
    let mut workout = workout_with(&[("a", &["s1"])]);
    workout
        .apply(&add_exercise("a", &["s1", "s2"]))
        .expect("repeat add");
    assert_eq!(workout.exercises.len(), 1);
    assert_eq!(workout.exercises[0].sets.len(), 1);
}

#[test]
fn test_position_is_clamped() {
    let mut workout = workout_with(&[("a", &[])]);
    let mut mutation = add_exercise("b", &[]);
    if let WorkoutMutation::AddExercise { position, .. } = &mut mutation {
        *position = 99;
    }
    workout.apply(&mutation).expect("add");
    assert_eq!(
        workout.exercise_ids(),
        vec![ExerciseInstanceId::from("a"), ExerciseInstanceId::from("b")]
    );
}

#[test]
fn test_missing_targets_are_not_found() {
    let mut workout = workout_with(&[("a", &["s1"])]);
    for mutation in [
        remove_exercise("ghost"),
        add_set("ghost", "s1"),
        remove_set("a", "ghost"),
        patch_reps("a", "ghost", 3),
        log_set("ghost", "s1", 20.0, 5),
    ] {
        let err = workout.apply(&mutation).expect_err("should fail");
        assert!(matches!(err, ApplyError::NotFound { .. }), "{}", err);
    }
}

#[test]
fn test_patch_set_fields() {
    let mut workout = workout_with(&[("a", &["s1"])]);
    let patch = |field, value| WorkoutMutation::PatchSet {
        exercise_instance_id: ExerciseInstanceId::from("a"),
        set_id: SetId::from("s1"),
        field,
        value,
    };

    workout
        .apply(&patch(SetField::Weight, PatchValue::Int(100)))
        .expect("int widens to weight");
    workout
        .apply(&patch(SetField::SetType, PatchValue::Text("drop_set".into())))
        .expect("set type");
    workout
        .apply(&patch(SetField::IsFailure, PatchValue::Bool(true)))
        .expect("failure flag");

    let set = &workout.exercises[0].sets[0];
    assert_eq!(set.weight, Some(100.0));
    assert_eq!(set.set_type, SetType::DropSet);
    assert!(set.is_failure);

    let err = workout
        .apply(&patch(SetField::Reps, PatchValue::Int(-1)))
        .expect_err("negative reps");
    assert!(matches!(err, ApplyError::InvalidValue { field: "reps", .. }));
}

#[test]
fn test_rename_and_start_time() {
    let mut workout = Workout::default();
    workout.apply(&rename("Upper")).expect("rename");
    workout
        .apply(&WorkoutMutation::PatchWorkoutMetadata {
            field: MetadataField::StartTime,
            value: PatchValue::Text("2024-05-01T07:30:00Z".into()),
        })
        .expect("start time");

    assert_eq!(workout.name.as_deref(), Some("Upper"));
    assert!(workout.start_time.is_some());
}

#[test]
fn test_retain_prunes_exercises_and_sets() {
    let mut workout = workout_with(&[("a", &["s1", "s2"]), ("b", &["s1"])]);
    workout.retain(
        |id| id.as_str() == "a",
        |key| key.set_id.as_str() == "s2",
    );

    assert_eq!(workout.exercise_ids(), vec![ExerciseInstanceId::from("a")]);
    assert_eq!(
        workout.set_keys(),
        vec![SetKey::new("a".into(), "s2".into())]
    );
}
