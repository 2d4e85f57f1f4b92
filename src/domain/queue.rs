//! Ordered queue of mutations that have not executed yet.
//!
//! The queue owns purge-on-remove and coalescing. Selection of the next
//! runnable mutation takes the acknowledgment store as input so the queue
//! itself stays free of remote concerns.

use crate::domain::ack::AcknowledgmentStore;
use crate::domain::mutation::{QueuedMutation, WorkoutMutation};
use std::collections::VecDeque;

/// What [`PendingQueue::enqueue`] did besides appending.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EnqueueOutcome {
    /// Mutations removed because the incoming edit deletes their target.
    pub purged: Vec<QueuedMutation>,
    /// Metadata patch replaced by the incoming one.
    pub coalesced: Option<QueuedMutation>,
}

#[derive(Debug, Default, Clone)]
pub struct PendingQueue {
    items: VecDeque<QueuedMutation>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMutation> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<QueuedMutation> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Purges or coalesces against the incoming mutation, then appends it
    /// with a fresh idempotency key.
    pub fn enqueue(&mut self, mutation: WorkoutMutation) -> (QueuedMutation, EnqueueOutcome) {
        let mut outcome = EnqueueOutcome::default();

        match &mutation {
            WorkoutMutation::RemoveExercise { instance_id } => {
                outcome.purged =
                    self.remove_where(|m| m.exercise_dependency() == Some(instance_id));
            }
            WorkoutMutation::RemoveSet { .. } => {
                let target = mutation.set_dependency();
                outcome.purged = self.remove_where(|m| m.set_dependency() == target);
            }
            WorkoutMutation::PatchWorkoutMetadata { field, .. } => {
                let field = *field;
                outcome.coalesced = self
                    .remove_where(|m| {
                        matches!(
                            m,
                            WorkoutMutation::PatchWorkoutMetadata { field: queued, .. }
                                if *queued == field
                        )
                    })
                    .pop();
            }
            _ => {}
        }

        let queued = QueuedMutation::new(mutation);
        self.items.push_back(queued.clone());
        (queued, outcome)
    }

    /// Removes and returns the first mutation whose dependencies are met.
    pub fn take_first_ready(&mut self, acks: &AcknowledgmentStore) -> Option<QueuedMutation> {
        let index = self
            .items
            .iter()
            .position(|queued| acks.can_execute(&queued.mutation))?;
        self.items.remove(index)
    }

    /// Puts a mutation back at the head of the queue for retry.
    pub fn push_front(&mut self, queued: QueuedMutation) {
        self.items.push_front(queued);
    }

    /// Drops every mutation whose dependency is missing from `acks`.
    pub fn drop_unreachable(&mut self, acks: &AcknowledgmentStore) -> Vec<QueuedMutation> {
        self.remove_where(|m| {
            let exercise_missing = m
                .exercise_dependency()
                .is_some_and(|id| !acks.has_exercise(id));
            let set_missing = m.set_dependency().is_some_and(|key| !acks.has_set(&key));
            exercise_missing || set_missing
        })
    }

    fn remove_where(
        &mut self,
        mut predicate: impl FnMut(&WorkoutMutation) -> bool,
    ) -> Vec<QueuedMutation> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.items.len());
        for queued in self.items.drain(..) {
            if predicate(&queued.mutation) {
                removed.push(queued);
            } else {
                kept.push_back(queued);
            }
        }
        self.items = kept;
        removed
    }
}

#[cfg(test)]
#[path = "tests/queue_tests.rs"]
mod tests;
