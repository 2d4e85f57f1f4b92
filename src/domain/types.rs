//! Strongly typed domain primitives for workout mutations.
//!
//! These newtypes give identifiers, set attributes and patch values distinct
//! types so that an exercise instance id can never be passed where a set id
//! is expected. They are used throughout the mutation model and the remote
//! adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a workout on the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkoutId(pub String);

impl WorkoutId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkoutId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkoutId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for WorkoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one occurrence of an exercise inside a workout.
///
/// Generated client-side so that dependent edits can reference the exercise
/// before the remote system has acknowledged it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExerciseInstanceId(pub String);

impl ExerciseInstanceId {
    /// Creates a new random instance ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExerciseInstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExerciseInstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ExerciseInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog identifier of an exercise (e.g. "bench-press").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExerciseId(pub String);

impl ExerciseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExerciseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a set within its exercise instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetId(pub String);

impl SetId {
    /// Creates a new random set ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite identity of a set: `(exercise instance, set)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetKey {
    pub exercise_instance_id: ExerciseInstanceId,
    pub set_id: SetId,
}

impl SetKey {
    pub fn new(exercise_instance_id: ExerciseInstanceId, set_id: SetId) -> Self {
        Self {
            exercise_instance_id,
            set_id,
        }
    }
}

impl std::fmt::Display for SetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.exercise_instance_id, self.set_id)
    }
}

/// Idempotency key sent with every remote attempt of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub Uuid);

impl IdempotencyKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation counter identifying one workout session of the coordinator.
///
/// Replaced on every reset. Receivers compare it against their own current
/// session and drop notifications that do not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// UTC timestamp wrapper for serialization consistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl Default for TimestampUtc {
    fn default() -> Self {
        Self::now()
    }
}

/// Kind of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    Warmup,
    #[default]
    Working,
    DropSet,
    Failure,
}

impl SetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetType::Warmup => "warmup",
            SetType::Working => "working",
            SetType::DropSet => "drop_set",
            SetType::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "warmup" => Some(SetType::Warmup),
            "working" => Some(SetType::Working),
            "drop_set" => Some(SetType::DropSet),
            "failure" => Some(SetType::Failure),
            _ => None,
        }
    }
}

/// Initial description of a set created together with its exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSpec {
    pub set_id: SetId,
    #[serde(default)]
    pub set_type: SetType,
    pub reps: u32,
    #[serde(default)]
    pub rir: Option<u32>,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// Patchable attribute of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetField {
    Reps,
    Rir,
    Weight,
    SetType,
    IsFailure,
}

/// Patchable attribute of the workout itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Name,
    StartTime,
}

/// Value carried by a field patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PatchValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl PatchValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PatchValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; floats are not truncated.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PatchValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PatchValue::Float(v) => Some(*v),
            PatchValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PatchValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for PatchValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchValue::Text(s) => write!(f, "{:?}", s),
            PatchValue::Int(v) => write!(f, "{}", v),
            PatchValue::Float(v) => write!(f, "{}", v),
            PatchValue::Bool(v) => write!(f, "{}", v),
        }
    }
}
