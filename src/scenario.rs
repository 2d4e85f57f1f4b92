//! Scripted replay of edits against the in-process remote store.
//!
//! A scenario is a YAML document:
//!
//! ```yaml
//! workout_id: w1
//! initial:
//!   exercises: []
//! steps:
//!   - apply: { type: add_exercise, instance_id: a, exercise_id: squat, name: Squat, position: 0, sets: [] }
//!   - fault: { when: before, error: { kind: network, message: offline } }
//!   - settle
//!   - restart: { workout_id: w2 }
//! ```

use crate::config::SyncConfig;
use crate::coordinator::{CoordinatorSnapshot, MutationCoordinator};
use crate::domain::events::StateChangeEnvelope;
use crate::domain::mutation::WorkoutMutation;
use crate::domain::types::{ExerciseInstanceId, WorkoutId};
use crate::domain::workout::Workout;
use crate::owner::{LocalWorkout, SurfacedError};
use crate::remote::{Fault, InMemoryRemote, WorkoutRemote};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Apply an edit through the local owner.
    Apply(WorkoutMutation),
    /// Script the next remote call to fail.
    Fault(Fault),
    /// Wait until the coordinator has nothing it can run.
    Settle,
    /// Delete an exercise remotely, as another device would.
    RemoveExternally(ExerciseInstanceId),
    /// Hold remote calls until `release`.
    Hold,
    Release,
    /// Start a new session, optionally on another workout.
    Restart {
        #[serde(default)]
        workout_id: Option<WorkoutId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub workout_id: WorkoutId,
    /// Contents of the workout on both sides before the first step.
    #[serde(default)]
    pub initial: Workout,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
    /// Upper bound for each settle. Default: 30
    #[serde(default = "default_settle_timeout_secs")]
    pub settle_timeout_secs: u64,
}

fn default_settle_timeout_secs() -> u64 {
    30
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse scenario as YAML: {}", path.display()))
    }
}

/// Everything observed while replaying a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub notifications: Vec<StateChangeEnvelope>,
    pub errors: Vec<SurfacedError>,
    pub coordinator: CoordinatorSnapshot,
    pub local: Workout,
    pub remote: Option<Workout>,
}

async fn settle(coordinator: &MutationCoordinator, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, coordinator.settle())
        .await
        .context("Timed out waiting for the coordinator to settle")?
        .context("Coordinator stopped while settling")?;
    Ok(())
}

pub async fn replay(scenario: Scenario, config: &SyncConfig) -> Result<ScenarioReport> {
    let timeout = Duration::from_secs(scenario.settle_timeout_secs);
    let remote = InMemoryRemote::new();
    remote
        .seed_workout(&scenario.workout_id, scenario.initial.clone())
        .await;

    let shared_remote: Arc<dyn WorkoutRemote> = Arc::new(remote.clone());
    let coordinator = MutationCoordinator::spawn(Arc::clone(&shared_remote), config)
        .await
        .context("Failed to start coordinator")?;
    let owner = LocalWorkout::new(Arc::new(coordinator), shared_remote, config.retry.clone())?;
    let mut observed = owner.observe();

    let mut workout_id = scenario.workout_id.clone();
    owner.start(workout_id.clone(), scenario.initial).await?;

    for (index, step) in scenario.steps.into_iter().enumerate() {
        tracing::debug!("Step {}: {:?}", index + 1, step);
        match step {
            ScenarioStep::Apply(mutation) => {
                if let Err(e) = owner.apply(mutation) {
                    tracing::warn!("Step {} rejected: {:#}", index + 1, e);
                }
            }
            ScenarioStep::Fault(fault) => remote.inject(fault).await,
            ScenarioStep::Settle => settle(owner.coordinator(), timeout).await?,
            ScenarioStep::RemoveExternally(instance_id) => {
                if !remote
                    .remove_exercise_externally(&workout_id, &instance_id)
                    .await
                {
                    tracing::warn!("Step {}: exercise {} not present remotely", index + 1, instance_id);
                }
            }
            ScenarioStep::Hold => remote.hold(),
            ScenarioStep::Release => remote.release(),
            ScenarioStep::Restart { workout_id: next } => {
                if let Some(next) = next {
                    workout_id = next;
                }
                remote.create_workout(&workout_id).await;
                let initial = remote.workout(&workout_id).await.unwrap_or_default();
                owner.start(workout_id.clone(), initial).await?;
            }
        }
    }

    remote.release();
    settle(owner.coordinator(), timeout).await?;

    let coordinator = owner
        .coordinator()
        .snapshot()
        .await
        .context("Failed to read coordinator state")?;
    owner.coordinator().shutdown().await;

    let mut notifications = Vec::new();
    while let Ok(envelope) = observed.try_recv() {
        notifications.push(envelope);
    }

    Ok(ScenarioReport {
        notifications,
        errors: owner.errors(),
        coordinator,
        local: owner.workout(),
        remote: remote.workout(&workout_id).await,
    })
}

#[cfg(test)]
#[path = "tests/scenario_tests.rs"]
mod tests;
