//! Failure taxonomy, classification and retry policy for remote execution.
//!
//! Remote errors are classified into transient failures (retried with
//! exponential backoff) and referential failures (the local entity graph has
//! diverged from the remote one and must be reconciled).

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Error code the remote contract uses for a missing target entity.
pub const TARGET_NOT_FOUND_CODE: &str = "TARGET_NOT_FOUND";

/// Message pattern recognised as a missing target when a remote reports no
/// structured code. Compatibility fallback only.
pub const NOT_FOUND_MESSAGE_PATTERN: &str = r"(?i)target[\s_-]*not[\s_-]*found|\bnot\s+found\b";

/// Errors reported by a remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteError {
    /// Transport-level failure; the request may or may not have arrived.
    Network { message: String },
    /// Non-success response from the remote system.
    Server {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
    /// The entity addressed by the request does not exist remotely.
    TargetNotFound { message: String },
}

impl RemoteError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    pub fn target_not_found(message: impl Into<String>) -> Self {
        Self::TargetNotFound {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network { message } => write!(f, "network error: {}", message),
            Self::Server {
                status,
                code,
                message,
            } => {
                write!(f, "server error")?;
                if let Some(status) = status {
                    write!(f, " {}", status)?;
                }
                if let Some(code) = code {
                    write!(f, " [{}]", code)?;
                }
                write!(f, ": {}", message)
            }
            Self::TargetNotFound { message } => write!(f, "target not found: {}", message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// How the executor reacts to a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry with backoff until the budget runs out.
    Transient,
    /// Never retry; reconcile with the authoritative state.
    Referential,
}

fn not_found_regex() -> Option<&'static regex::Regex> {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(NOT_FOUND_MESSAGE_PATTERN).ok())
        .as_ref()
}

/// Classifies a remote error.
///
/// Structured signals win: the `TARGET_NOT_FOUND` code or HTTP 404, whatever
/// code accompanies the 404. The message text is consulted only for server
/// errors that carry neither a code nor a status.
pub fn classify(error: &RemoteError) -> FailureClass {
    match error {
        RemoteError::TargetNotFound { .. } => FailureClass::Referential,
        RemoteError::Network { .. } => FailureClass::Transient,
        RemoteError::Server {
            status,
            code,
            message,
        } => {
            if code.as_deref() == Some(TARGET_NOT_FOUND_CODE) || *status == Some(404) {
                return FailureClass::Referential;
            }
            if code.is_some() || status.is_some() {
                return FailureClass::Transient;
            }
            if not_found_regex().is_some_and(|re| re.is_match(message)) {
                FailureClass::Referential
            } else {
                FailureClass::Transient
            }
        }
    }
}

/// Reason attached to a `SyncFailed` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SyncFailure {
    /// Transient failures used up the retry budget.
    RetriesExhausted { attempts: u32, last_error: RemoteError },
    /// The remote system no longer has the target; reconciliation started.
    TargetNotFound { message: String },
    /// Removed from the queue during reconciliation; never sent.
    DroppedByReconcile,
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            Self::TargetNotFound { message } => write!(f, "target not found: {}", message),
            Self::DroppedByReconcile => {
                write!(f, "dropped during reconciliation: target no longer exists")
            }
        }
    }
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum remote attempts per mutation. Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, doubled per further attempt. Default: 500ms
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Relative jitter applied to every delay (0.25 = ±25%). Default: 0.25
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_jitter() -> f64 {
    0.25
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Validates the policy configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("retry.max_retries must be at least 1");
        }
        if !(0.0..1.0).contains(&self.jitter) {
            anyhow::bail!("retry.jitter must be in [0, 1), got {}", self.jitter);
        }
        Ok(())
    }

    /// Returns true if a mutation that just failed its `attempt`-th try may
    /// be tried again.
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Backoff before the retry that follows failed attempt `attempt`,
    /// without jitter: `base * 2^(attempt - 1)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exponent))
    }

    /// Backoff with random jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let delay_ms = self.base_delay(attempt).as_millis() as f64;
        let mut rng = rand::thread_rng();
        let jitter = delay_ms * self.jitter * (rng.gen::<f64>() * 2.0 - 1.0);
        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }
}

#[cfg(test)]
#[path = "tests/failure_tests.rs"]
mod tests;
