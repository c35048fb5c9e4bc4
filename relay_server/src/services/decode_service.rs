//! Notification decoding — raw Pub/Sub payload to `BuildNotification`.

use serde_json::Value;

use crate::errors::DecodeError;
use crate::models::notification::{BuildNotification, ResolvedRepoSource};
use crate::models::status::BuildState;

/// Decode one notification payload.
///
/// Any JSON document carrying a non-empty string `id` is accepted. Every other
/// field is best-effort: absent, `null` or wrongly typed values come back as
/// empty strings.
pub fn decode(payload: &[u8]) -> Result<BuildNotification, DecodeError> {
    let build: Value = serde_json::from_slice(payload)?;

    let id = text(Some(&build), "id");
    if id.is_empty() {
        return Err(DecodeError::MissingId);
    }

    let source = build.pointer("/sourceProvenance/resolvedRepoSource");

    Ok(BuildNotification {
        id,
        project_id: text(Some(&build), "projectId"),
        log_url: text(Some(&build), "logUrl"),
        status: BuildState::from(text(Some(&build), "status").as_str()),
        resolved_source: ResolvedRepoSource {
            commit_sha: text(source, "commitSha"),
            source_project_id: text(source, "projectId"),
            source_repo_name: text(source, "repoName"),
        },
    })
}

fn text(object: Option<&Value>, key: &str) -> String {
    object
        .and_then(|o| o.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
