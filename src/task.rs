//! Task records and id generation.
//!
//! A [`Task`] describes one deferred shell command: what to run, when it
//! becomes due, and (once it has run) how it went. The same record shape
//! is used on the wire, in memory, and in the persisted snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide sequence number folded into every task id.
static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Mint a fresh task id.
///
/// The id is `"{epoch_millis}-{seq:06}"`: the counter keeps ids unique even
/// when two tasks are created within the same millisecond, and the leading
/// timestamp keeps ids minted by one daemon process sortable in creation
/// order.
pub fn next_task_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0);
    let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{seq:06}")
}

/// One deferred shell command, scheduled or completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Literal text handed to the shell.
    pub command: String,
    /// Absolute time at which the task becomes due.
    pub target_time: DateTime<Utc>,
    /// Unique task id (wire name `task_id`).
    #[serde(rename = "task_id")]
    pub id: String,
    /// `false` while the task waits in the active set.
    #[serde(default)]
    pub completed: bool,
    /// Exit code of the finished command; absent until completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// When the command finished; absent until completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with a fresh id.
    #[must_use]
    pub fn new(command: impl Into<String>, target_time: DateTime<Utc>) -> Self {
        Self {
            command: command.into(),
            target_time,
            id: next_task_id(),
            completed: false,
            exit_code: None,
            completion_time: None,
        }
    }

    /// Reconstruct a completed task from an execution outcome.
    ///
    /// The active copy was dropped when the task was dequeued, so the
    /// target time is approximated as one second before completion.
    #[must_use]
    pub fn from_outcome(
        id: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        completion_time: DateTime<Utc>,
    ) -> Self {
        Self {
            command: command.into(),
            target_time: completion_time - chrono::Duration::seconds(1),
            id: id.into(),
            completed: true,
            exit_code: Some(exit_code),
            completion_time: Some(completion_time),
        }
    }

    /// Returns `true` once the task's target time has arrived.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.target_time <= now
    }
}
