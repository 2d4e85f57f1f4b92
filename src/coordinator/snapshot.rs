//! Read-only view of coordinator state, broadcast after every message.

use crate::domain::mutation::QueuedMutation;
use crate::domain::types::{ExerciseInstanceId, SessionId, SetKey, WorkoutId};
use serde::{Deserialize, Serialize};

/// Where the executor currently is in its per-session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorPhase {
    /// Nothing queued, nothing in flight.
    Idle,
    /// A remote call is in flight.
    Processing,
    /// Work is queued but none of it can run yet.
    AwaitingDependency,
    /// Waiting out the backoff before retrying a transient failure.
    BackingOff,
    /// Waiting for the owner to call `finish_reconcile`.
    Reconciling,
}

impl CoordinatorPhase {
    /// True when the coordinator will not make progress without new input.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            CoordinatorPhase::Idle | CoordinatorPhase::AwaitingDependency
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub session: SessionId,
    pub phase: CoordinatorPhase,
    pub workout_id: Option<WorkoutId>,
    pub pending: Vec<QueuedMutation>,
    pub in_flight: Option<QueuedMutation>,
    /// Sorted for stable comparison.
    pub ack_exercises: Vec<ExerciseInstanceId>,
    /// Sorted for stable comparison.
    pub ack_sets: Vec<SetKey>,
}

impl CoordinatorSnapshot {
    pub fn initial(session: SessionId) -> Self {
        Self {
            session,
            phase: CoordinatorPhase::Idle,
            workout_id: None,
            pending: Vec::new(),
            in_flight: None,
            ack_exercises: Vec::new(),
            ack_sets: Vec::new(),
        }
    }
}
