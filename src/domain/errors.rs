//! Error types for the coordinator handle.

use std::fmt::{Display, Formatter};

/// Errors returned by [`crate::coordinator::MutationCoordinator`] calls.
#[derive(Debug, Clone)]
pub enum CoordinatorError {
    /// The coordinator actor could not be spawned.
    SpawnFailed { message: String },
    /// The coordinator actor has stopped; no further messages are accepted.
    Stopped,
    /// The actor dropped a reply channel before answering.
    NoReply,
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpawnFailed { message } => write!(f, "failed to spawn coordinator: {}", message),
            Self::Stopped => write!(f, "coordinator has stopped"),
            Self::NoReply => write!(f, "coordinator did not reply"),
        }
    }
}

impl std::error::Error for CoordinatorError {}
