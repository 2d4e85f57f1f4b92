//! Dependency-aware synchronization of optimistic workout edits with a
//! remote store.
//!
//! - [`coordinator`]: the single-writer mutation queue and executor
//! - [`domain`]: mutations, acknowledgments, failures and the workout model
//! - [`remote`]: the remote contract with in-memory and HTTP adapters
//! - [`owner`]: a reference local state owner
//! - [`scenario`]: YAML-scripted replay used by the CLI

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod owner;
pub mod remote;
pub mod scenario;
pub mod sync_log;

pub use config::SyncConfig;
pub use coordinator::{CoordinatorPhase, CoordinatorSnapshot, MutationCoordinator};
pub use domain::{MutationStateChange, StateChangeHandler, WorkoutMutation};
pub use owner::LocalWorkout;
