//! Build states reported by Cloud Build and commit states accepted by GitHub.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a build, as emitted by the build service.
///
/// Codes outside the documented set are kept verbatim so they can be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    StatusUnknown,
    Unrecognized(String),
}

impl BuildState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<&str> for BuildState {
    fn from(raw: &str) -> Self {
        match raw {
            "QUEUED" => Self::Queued,
            "WORKING" => Self::Working,
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "INTERNAL_ERROR" => Self::InternalError,
            "TIMEOUT" => Self::Timeout,
            "CANCELLED" => Self::Cancelled,
            "STATUS_UNKNOWN" => Self::StatusUnknown,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit status state on the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
    Unknown,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a commit status push. Field names match the GitHub statuses API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub state: CommitState,
    pub description: String,
    pub context: String,
    pub target_url: String,
}
