//! GitHub integration — commit status updates.

use async_trait::async_trait;
use url::Url;

use crate::errors::DeliveryError;
use crate::models::status::StatusUpdate;
use crate::services::api_endpoint;
use crate::services::relay_service::StatusSink;

/// Post a commit status to GitHub.
pub async fn post_status(
    http: &reqwest::Client,
    api_url: &Url,
    token: &str,
    owner: &str,
    repo: &str,
    sha: &str,
    update: &StatusUpdate,
) -> Result<(), DeliveryError> {
    let url = api_endpoint(api_url, ["repos", owner, repo, "statuses", sha])
        .ok_or_else(|| DeliveryError::InvalidEndpoint(api_url.to_string()))?;

    let resp = http
        .post(url)
        .header("Authorization", format!("Bearer {token}"))
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .json(update)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(DeliveryError::Rejected { status, body });
    }

    Ok(())
}

/// Token-authenticated status sink for github.com or a GitHub Enterprise API.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    token: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, api_url: Url, token: impl Into<String>) -> Self {
        Self {
            http,
            api_url,
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StatusSink for GitHubClient {
    async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        update: &StatusUpdate,
    ) -> Result<(), DeliveryError> {
        post_status(&self.http, &self.api_url, &self.token, owner, repo, sha, update).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::Json;
    use axum::routing::post;
    use axum::Router;

    use super::*;
    use crate::models::status::CommitState;
    use crate::test_support::serve;

    #[derive(Debug, Clone)]
    struct Received {
        path: (String, String, String),
        auth: String,
        body: serde_json::Value,
    }

    #[derive(Clone, Default)]
    struct Api {
        received: Arc<Mutex<Vec<Received>>>,
    }

    async fn create_status(
        State(api): State<Api>,
        Path(path): Path<(String, String, String)>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let unknown_state = body["state"] == "unknown";
        api.received.lock().unwrap().push(Received { path, auth, body });

        if unknown_state {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "message": "Validation Failed" })),
            );
        }
        (StatusCode::CREATED, Json(serde_json::json!({ "id": 1 })))
    }

    async fn fake_github() -> (Url, Api) {
        let api = Api::default();
        let router = Router::new()
            .route("/repos/{owner}/{repo}/statuses/{sha}", post(create_status))
            .with_state(api.clone());
        let base = serve(router).await;
        (Url::parse(&base).unwrap(), api)
    }

    fn update(state: CommitState) -> StatusUpdate {
        StatusUpdate {
            state,
            description: "Build".to_string(),
            context: "Google Container Builder".to_string(),
            target_url: "http://x/log".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_status_to_commit() {
        let (api_url, api) = fake_github().await;
        let client = GitHubClient::new(reqwest::Client::new(), api_url, "gh-token");

        client
            .create_status("acme", "proj", "abc123", &update(CommitState::Success))
            .await
            .unwrap();

        let received = api.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let req = &received[0];
        assert_eq!(
            req.path,
            ("acme".to_string(), "proj".to_string(), "abc123".to_string())
        );
        assert_eq!(req.auth, "Bearer gh-token");
        assert_eq!(
            req.body,
            serde_json::json!({
                "state": "success",
                "description": "Build",
                "context": "Google Container Builder",
                "target_url": "http://x/log",
            })
        );
    }

    #[tokio::test]
    async fn path_segments_are_encoded() {
        let (api_url, api) = fake_github().await;
        let client = GitHubClient::new(reqwest::Client::new(), api_url, "gh-token");

        client
            .create_status("acme", "proj?x", "abc123", &update(CommitState::Success))
            .await
            .unwrap();

        let received = api.received.lock().unwrap();
        assert_eq!(
            received[0].path,
            ("acme".to_string(), "proj?x".to_string(), "abc123".to_string())
        );
    }

    #[tokio::test]
    async fn rejected_status_is_delivery_error() {
        let (api_url, _) = fake_github().await;
        let client = GitHubClient::new(reqwest::Client::new(), api_url, "gh-token");

        match client
            .create_status("acme", "proj", "abc123", &update(CommitState::Unknown))
            .await
        {
            Err(DeliveryError::Rejected { status, body }) => {
                assert_eq!(status, 422);
                assert!(body.contains("Validation Failed"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_api_is_transport_error() {
        let api_url = Url::parse("http://127.0.0.1:9").unwrap();
        let client = GitHubClient::new(reqwest::Client::new(), api_url, "gh-token");

        let err = client
            .create_status("acme", "proj", "abc123", &update(CommitState::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[test]
    fn debug_hides_token() {
        let client = GitHubClient::new(
            reqwest::Client::new(),
            Url::parse("https://api.github.com").unwrap(),
            "secret-token",
        );
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
