//! Cloud Build notification — one build's lifecycle update from the `cloud-builds` topic.

use super::status::BuildState;

/// A decoded build notification.
///
/// Only `id` is guaranteed non-empty; every other field falls back to an
/// empty string when the payload omits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildNotification {
    pub id: String,
    pub project_id: String,
    pub log_url: String,
    pub status: BuildState,
    pub resolved_source: ResolvedRepoSource,
}

/// The commit and repository a build was triggered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRepoSource {
    pub commit_sha: String,
    pub source_project_id: String,
    pub source_repo_name: String,
}
