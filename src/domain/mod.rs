//! Domain model for coordinating workout mutations with a remote store.
//!
//! # Architecture
//!
//! - **Types** (`types.rs`): Identifiers, set attributes and patch values
//! - **Mutations** (`mutation.rs`): Structural edits and their dependencies
//! - **Acknowledgments** (`ack.rs`): Entities the remote system confirmed
//! - **Queue** (`queue.rs`): Pending edits with purge-on-remove and coalescing
//! - **Failure** (`failure.rs`): Error taxonomy, classification, retry policy
//! - **Events** (`events.rs`): Notifications delivered to the state owner
//! - **Workout** (`workout.rs`): The document model mutations apply to

pub mod ack;
pub mod errors;
pub mod events;
pub mod failure;
pub mod mutation;
pub mod queue;
pub mod types;
pub mod workout;

pub use ack::AcknowledgmentStore;
pub use errors::CoordinatorError;
pub use events::{ChannelHandler, MutationStateChange, StateChangeEnvelope, StateChangeHandler};
pub use failure::{classify, FailureClass, RemoteError, RetryPolicy, SyncFailure};
pub use mutation::{QueuedMutation, WorkoutMutation};
pub use queue::{EnqueueOutcome, PendingQueue};
pub use types::{
    ExerciseId, ExerciseInstanceId, IdempotencyKey, MetadataField, PatchValue, SessionId,
    SetField, SetId, SetKey, SetSpec, SetType, TimestampUtc, WorkoutId,
};
pub use workout::{ApplyError, LoggedSet, Workout, WorkoutExercise, WorkoutSet};

#[cfg(test)]
pub mod fixtures;
