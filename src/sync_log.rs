//! Structured JSONL journal of coordinator activity.
//!
//! Each line carries:
//! - Monotonic sequence number for ordering
//! - ISO 8601 timestamp with microsecond precision
//! - The coordinator session the entry belongs to
//! - The component that emitted it and structured event data

use crate::domain::events::MutationStateChange;
use crate::domain::mutation::QueuedMutation;
use crate::domain::types::SessionId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Append-only JSONL journal.
pub struct SyncJournal {
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single journal line.
#[derive(Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub ts: String,
    pub session: u64,
    pub component: String,
    pub event: Value,
}

impl SyncJournal {
    /// Opens (or creates) the journal file, creating parent directories.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Writes one entry. Failures to write are ignored.
    pub fn log(&self, session: SessionId, component: &str, event: impl Serialize) {
        let entry = JournalEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            session: session.0,
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    pub fn log_enqueued(&self, session: SessionId, queued: &QueuedMutation, purged: usize) {
        self.log(
            session,
            "Queue",
            serde_json::json!({
                "type": "Enqueued",
                "id": queued.id,
                "mutation": queued.mutation.kind(),
                "purged": purged
            }),
        );
    }

    pub fn log_dispatched(&self, session: SessionId, queued: &QueuedMutation) {
        self.log(
            session,
            "Executor",
            serde_json::json!({
                "type": "Dispatched",
                "id": queued.id,
                "attempt": queued.attempt,
                "mutation": queued.mutation.kind()
            }),
        );
    }

    pub fn log_retry_scheduled(&self, session: SessionId, queued: &QueuedMutation, delay_ms: u64) {
        self.log(
            session,
            "Executor",
            serde_json::json!({
                "type": "RetryScheduled",
                "id": queued.id,
                "attempt": queued.attempt,
                "delay_ms": delay_ms
            }),
        );
    }

    pub fn log_state_change(&self, session: SessionId, change: &MutationStateChange) {
        self.log(
            session,
            "Notify",
            serde_json::json!({
                "type": "StateChange",
                "change": change
            }),
        );
    }

    pub fn log_reconcile_finished(&self, session: SessionId, dropped: usize) {
        self.log(
            session,
            "Reconcile",
            serde_json::json!({
                "type": "ReconcileFinished",
                "dropped": dropped
            }),
        );
    }

    pub fn log_reset(&self, previous: SessionId, next: SessionId) {
        self.log(
            next,
            "Session",
            serde_json::json!({
                "type": "Reset",
                "previous": previous.0
            }),
        );
    }
}

#[cfg(test)]
#[path = "tests/sync_log_tests.rs"]
mod tests;
