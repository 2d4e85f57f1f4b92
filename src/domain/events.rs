//! Notifications the coordinator delivers to the Local State Owner.

use crate::domain::failure::SyncFailure;
use crate::domain::mutation::QueuedMutation;
use crate::domain::types::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Outcome reported for queued work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationStateChange {
    SyncSuccess {
        mutation: QueuedMutation,
    },
    SyncFailed {
        mutation: QueuedMutation,
        reason: SyncFailure,
    },
    /// The owner must fetch authoritative state and call `finish_reconcile`.
    NeedsReconcile,
}

impl MutationStateChange {
    pub fn kind(&self) -> &'static str {
        match self {
            MutationStateChange::SyncSuccess { .. } => "sync_success",
            MutationStateChange::SyncFailed { .. } => "sync_failed",
            MutationStateChange::NeedsReconcile => "needs_reconcile",
        }
    }
}

/// A notification together with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeEnvelope {
    pub session: SessionId,
    pub change: MutationStateChange,
}

/// Receiver of coordinator notifications.
///
/// Called from the coordinator's actor task, so implementations must not
/// block. Calling back into the coordinator is fine: every call is a message
/// and is served after the current one.
pub trait StateChangeHandler: Send + Sync {
    fn on_state_change(&self, change: MutationStateChange, session: SessionId);
}

impl<F> StateChangeHandler for F
where
    F: Fn(MutationStateChange, SessionId) + Send + Sync,
{
    fn on_state_change(&self, change: MutationStateChange, session: SessionId) {
        self(change, session)
    }
}

/// Forwards notifications into an unbounded channel.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<StateChangeEnvelope>,
}

impl ChannelHandler {
    /// Creates a handler and the receiver its notifications arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StateChangeEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StateChangeHandler for ChannelHandler {
    fn on_state_change(&self, change: MutationStateChange, session: SessionId) {
        if self
            .tx
            .send(StateChangeEnvelope { session, change })
            .is_err()
        {
            tracing::debug!("State change receiver dropped");
        }
    }
}
