//! Session, task identifier and validation types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length every task identifier must have after normalization
pub const TASK_ID_LEN: usize = 10;

/// Message shown when a task identifier fails the local format check
pub const TASK_ID_FORMAT_MESSAGE: &str = "Task ID must be exactly 10 alphanumeric characters.";

/// Message shown when the user id is blank
pub const EMPTY_USER_ID_MESSAGE: &str = "User ID cannot be empty.";

/// Display name for a saved session that has none
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// An authenticated user, as persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Login name accepted by the identity check (persisted as `username`)
    #[serde(rename = "username")]
    pub user_id: String,
    /// Display name returned by the identity check (persisted as `fullname`)
    #[serde(rename = "fullname", default = "default_display_name")]
    pub display_name: String,
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

impl Session {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Rejection for raw task input that cannot become a [`TaskId`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Task ID must be exactly 10 alphanumeric characters.")]
pub struct TaskIdError {
    /// The normalized form that was rejected
    pub normalized: String,
}

/// A 10 character, upper-case, ASCII alphanumeric task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    /// Canonical form of raw input: surrounding whitespace stripped, upper-cased.
    ///
    /// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_ascii_uppercase()
    }

    /// Normalize and check the format. Never touches the network.
    pub fn parse(raw: &str) -> Result<Self, TaskIdError> {
        let normalized = Self::normalize(raw);
        let well_formed = normalized.chars().count() == TASK_ID_LEN
            && normalized.chars().all(|c| c.is_ascii_alphanumeric());
        if well_formed {
            Ok(Self(normalized))
        } else {
            Err(TaskIdError { normalized })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of a remote check.
///
/// `Invalid` is an authoritative "no" from the server (including HTTP error
/// statuses); `TransportFailure` means the server could not be reached or
/// answered with something unreadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(String),
    Invalid(String),
    TransportFailure(String),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The detail (for `Valid`) or reason (otherwise), verbatim
    pub fn message(&self) -> &str {
        match self {
            Self::Valid(m) | Self::Invalid(m) | Self::TransportFailure(m) => m,
        }
    }
}

/// The validated pair handed to the recorder. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub task_id: TaskId,
    pub user_id: String,
}

impl LaunchRequest {
    pub fn new(task_id: TaskId, user_id: impl Into<String>) -> Self {
        Self {
            task_id,
            user_id: user_id.into(),
        }
    }

    /// Positional arguments for the recorder: task id, then user id
    pub fn args(&self) -> [&str; 2] {
        [self.task_id.as_str(), self.user_id.as_str()]
    }
}

/// Controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Session),
    /// Assignment check in flight
    TaskPending(Session, TaskId),
    CountingDown(Session, TaskId),
    /// Recorder spawned (or failed to spawn) for this cycle
    Launched(Session, LaunchRequest),
}

impl SessionState {
    /// The session carried by this state, if any
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated(s)
            | Self::TaskPending(s, _)
            | Self::CountingDown(s, _)
            | Self::Launched(s, _) => Some(s),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated(_) => "authenticated",
            Self::TaskPending(..) => "task_pending",
            Self::CountingDown(..) => "counting_down",
            Self::Launched(..) => "launched",
        }
    }
}
