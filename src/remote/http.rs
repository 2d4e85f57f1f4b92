//! HTTP adapter for the remote workout store.
//!
//! Uses a blocking `ureq` agent on tokio's blocking pool. Each mutation
//! variant maps to one REST call under `{base_url}/workouts/{workout_id}`
//! carrying the queued mutation's idempotency key in the `Idempotency-Key`
//! header.

use super::{RemoteRequest, RemoteResponse, RemoteStructure, WorkoutRemote};
use crate::config::RemoteConfig;
use crate::domain::failure::RemoteError;
use crate::domain::mutation::WorkoutMutation;
use crate::domain::types::WorkoutId;
use async_trait::async_trait;
use std::time::Duration;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Resolved HTTP call for one request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Route {
    pub method: Method,
    pub url: String,
}

/// Percent-encodes one path segment.
fn segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub(crate) fn route_for(base_url: &str, workout_id: &WorkoutId, mutation: &WorkoutMutation) -> Route {
    let workout = format!(
        "{}/workouts/{}",
        base_url.trim_end_matches('/'),
        segment(workout_id.as_str())
    );
    let (method, url) = match mutation {
        WorkoutMutation::AddExercise { .. } => (Method::Post, format!("{}/exercises", workout)),
        WorkoutMutation::RemoveExercise { instance_id } => (
            Method::Delete,
            format!("{}/exercises/{}", workout, segment(instance_id.as_str())),
        ),
        WorkoutMutation::AddSet {
            exercise_instance_id,
            ..
        } => (
            Method::Post,
            format!(
                "{}/exercises/{}/sets",
                workout,
                segment(exercise_instance_id.as_str())
            ),
        ),
        WorkoutMutation::RemoveSet {
            exercise_instance_id,
            set_id,
        } => (
            Method::Delete,
            format!(
                "{}/exercises/{}/sets/{}",
                workout,
                segment(exercise_instance_id.as_str()),
                segment(set_id.as_str())
            ),
        ),
        WorkoutMutation::PatchSet {
            exercise_instance_id,
            set_id,
            ..
        } => (
            Method::Patch,
            format!(
                "{}/exercises/{}/sets/{}",
                workout,
                segment(exercise_instance_id.as_str()),
                segment(set_id.as_str())
            ),
        ),
        WorkoutMutation::LogSet {
            exercise_instance_id,
            set_id,
            ..
        } => (
            Method::Post,
            format!(
                "{}/exercises/{}/sets/{}/log",
                workout,
                segment(exercise_instance_id.as_str()),
                segment(set_id.as_str())
            ),
        ),
        WorkoutMutation::ReorderExercises { .. } => {
            (Method::Put, format!("{}/exercise-order", workout))
        }
        WorkoutMutation::PatchWorkoutMetadata { .. } => (Method::Patch, workout),
    };
    Route { method, url }
}

/// Maps a status code and body onto the remote contract.
pub(crate) fn interpret(status: u16, body: &str) -> Result<(), RemoteError> {
    let envelope: Option<RemoteResponse> = serde_json::from_str(body).ok();
    if (200..300).contains(&status) {
        return match envelope {
            Some(RemoteResponse {
                success: false,
                error,
            }) => Err(RemoteError::Server {
                status: Some(status),
                code: error.as_ref().map(|e| e.code.clone()),
                message: error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "request reported failure".to_string()),
            }),
            _ => Ok(()),
        };
    }

    let (code, message) = match envelope.and_then(|e| e.error) {
        Some(error) => (Some(error.code), error.message),
        None => (None, body.trim().to_string()),
    };
    Err(RemoteError::Server {
        status: Some(status),
        code,
        message,
    })
}

/// [`WorkoutRemote`] over HTTP.
#[derive(Clone)]
pub struct HttpRemote {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            base_url: config.base_url.clone(),
        }
    }

    fn call(
        agent: &ureq::Agent,
        route: &Route,
        idempotency_key: Option<&str>,
        body: Option<String>,
    ) -> Result<(u16, String), ureq::Error> {
        let key = idempotency_key.unwrap_or_default();
        let body = body.unwrap_or_default();
        let mut response = match route.method {
            Method::Get => agent.get(&route.url).call()?,
            Method::Delete => agent
                .delete(&route.url)
                .header(IDEMPOTENCY_HEADER, key)
                .call()?,
            Method::Post => agent
                .post(&route.url)
                .header(IDEMPOTENCY_HEADER, key)
                .header("Content-Type", "application/json")
                .send(body)?,
            Method::Put => agent
                .put(&route.url)
                .header(IDEMPOTENCY_HEADER, key)
                .header("Content-Type", "application/json")
                .send(body)?,
            Method::Patch => agent
                .patch(&route.url)
                .header(IDEMPOTENCY_HEADER, key)
                .header("Content-Type", "application/json")
                .send(body)?,
        };
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        Ok((status, text))
    }
}

#[async_trait]
impl WorkoutRemote for HttpRemote {
    async fn execute(&self, request: RemoteRequest) -> Result<(), RemoteError> {
        let route = route_for(&self.base_url, &request.workout_id, &request.mutation);
        let body = serde_json::to_string(&request.mutation).map_err(|e| RemoteError::Server {
            status: None,
            code: Some("ENCODE_FAILED".to_string()),
            message: e.to_string(),
        })?;
        let key = request.idempotency_key.to_string();
        let agent = self.agent.clone();

        let (status, text) = tokio::task::spawn_blocking(move || {
            let body = (route.method != Method::Delete).then_some(body);
            Self::call(&agent, &route, Some(&key), body)
        })
        .await
        .map_err(|e| RemoteError::network(format!("request task failed: {}", e)))?
        .map_err(|e| RemoteError::network(e.to_string()))?;

        interpret(status, &text)
    }

    async fn fetch_structure(
        &self,
        workout_id: &WorkoutId,
    ) -> Result<RemoteStructure, RemoteError> {
        let route = Route {
            method: Method::Get,
            url: format!(
                "{}/workouts/{}/structure",
                self.base_url.trim_end_matches('/'),
                segment(workout_id.as_str())
            ),
        };
        let agent = self.agent.clone();

        let (status, text) = tokio::task::spawn_blocking(move || Self::call(&agent, &route, None, None))
            .await
            .map_err(|e| RemoteError::network(format!("request task failed: {}", e)))?
            .map_err(|e| RemoteError::network(e.to_string()))?;

        interpret(status, &text)?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Server {
            status: Some(status),
            code: Some("DECODE_FAILED".to_string()),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
