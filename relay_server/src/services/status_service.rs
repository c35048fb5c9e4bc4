//! Build state → commit status translation.

use crate::models::notification::BuildNotification;
use crate::models::status::{BuildState, CommitState, StatusUpdate};

/// Description attached to every status push.
pub const STATUS_DESCRIPTION: &str = "Build";

/// Map a build state onto a commit state. Never fails: codes outside the
/// known set become `Unknown`.
pub fn commit_state(state: &BuildState) -> CommitState {
    match state {
        BuildState::Queued | BuildState::Working => CommitState::Pending,
        BuildState::Success => CommitState::Success,
        BuildState::Failure | BuildState::Timeout => CommitState::Failure,
        BuildState::InternalError | BuildState::Cancelled | BuildState::StatusUnknown => {
            CommitState::Error
        }
        BuildState::Unrecognized(_) => CommitState::Unknown,
    }
}

/// Build the status update for a notification.
pub fn status_update(notification: &BuildNotification, context: &str) -> StatusUpdate {
    let state = commit_state(&notification.status);
    if state == CommitState::Unknown {
        tracing::warn!(
            build_id = %notification.id,
            status = %notification.status,
            "Unhandled build status code"
        );
    }

    StatusUpdate {
        state,
        description: STATUS_DESCRIPTION.to_string(),
        context: context.to_string(),
        target_url: notification.log_url.clone(),
    }
}
