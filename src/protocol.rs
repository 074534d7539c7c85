//! Wire protocol for the control socket.
//!
//! One connection carries exactly one request and one response, both UTF-8
//! JSON objects; end-of-stream is the message boundary on each side. The
//! request names its operation in an `action` field; every response carries
//! `status`, and error responses carry a human-readable `message`.

use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// History responses return at most this many tasks when the request does
/// not say otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// The recognized request actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Schedule a command to run after a delay.
    Schedule,
    /// List active tasks.
    List,
    /// List completed tasks.
    History,
    /// Cancel an active task.
    Cancel,
}

impl Action {
    /// Render the action to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::List => "list",
            Self::History => "history",
            Self::Cancel => "cancel",
        }
    }

    /// Parse an action from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "schedule" => Some(Self::Schedule),
            "list" => Some(Self::List),
            "history" => Some(Self::History),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Payload of a `schedule` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    /// Shell command to run.
    pub command: String,
    /// Delay before the command becomes due.
    pub delay_seconds: u64,
}

/// Payload of a `history` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRequest {
    /// Maximum number of completed tasks to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Payload of a `cancel` request.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    /// Id of the task to cancel.
    pub task_id: String,
}

/// Response status discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The single response shape; fields irrelevant to an action are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<BTreeMap<String, Task>>,
}

impl Response {
    /// Build a successful `schedule` response.
    #[must_use]
    pub fn scheduled(task_id: impl Into<String>, target_time: DateTime<Utc>) -> Self {
        Self {
            status: Status::Success,
            message: Some("Task scheduled".to_owned()),
            task_id: Some(task_id.into()),
            target_time: Some(target_time),
            tasks: None,
        }
    }

    /// Build a successful `list`/`history` response.
    #[must_use]
    pub fn tasks(tasks: BTreeMap<String, Task>) -> Self {
        Self {
            status: Status::Success,
            message: None,
            task_id: None,
            target_time: None,
            tasks: Some(tasks),
        }
    }

    /// Build a successful message-only response.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: Some(message.into()),
            task_id: None,
            target_time: None,
            tasks: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            task_id: None,
            target_time: None,
            tasks: None,
        }
    }

    /// Returns `true` for a success response.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
