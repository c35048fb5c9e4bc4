//! Cloud Source Repositories client — mirror URL lookup.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::errors::LookupError;
use crate::services::api_endpoint;
use crate::services::identity_service::MirrorRegistry;

/// OAuth scope needed to read repository metadata.
const SOURCE_READ_ONLY_SCOPE: &str = "https://www.googleapis.com/auth/source.read_only";

/// Where registry access tokens come from.
#[derive(Clone, Debug)]
pub enum TokenSource {
    /// A token supplied at startup.
    Static(String),
    /// The default service account of the GCE/GKE/Cloud Run metadata server.
    Metadata(Url),
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl TokenSource {
    async fn token(&self, http: &reqwest::Client) -> Result<String, LookupError> {
        let base = match self {
            Self::Static(token) => return Ok(token.clone()),
            Self::Metadata(base) => base,
        };

        let url = api_endpoint(
            base,
            ["computeMetadata", "v1", "instance", "service-accounts", "default", "token"],
        )
        .ok_or_else(|| LookupError::InvalidEndpoint(base.to_string()))?;
        let resp = http
            .get(url)
            .query(&[("scopes", SOURCE_READ_ONLY_SCOPE)])
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| LookupError::Token(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LookupError::Token(format!(
                "metadata server returned {status}: {text}"
            )));
        }

        let token: MetadataToken = resp
            .json()
            .await
            .map_err(|e| LookupError::Token(e.to_string()))?;
        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoResource {
    #[serde(default)]
    url: String,
    mirror_config: Option<MirrorConfig>,
}

#[derive(Debug, Deserialize)]
struct MirrorConfig {
    #[serde(default)]
    url: String,
}

/// Reads repository metadata from the Source Repositories REST API.
#[derive(Clone)]
pub struct SourceRepoClient {
    http: reqwest::Client,
    api_url: Url,
    tokens: TokenSource,
}

impl SourceRepoClient {
    pub fn new(http: reqwest::Client, api_url: Url, tokens: TokenSource) -> Self {
        Self {
            http,
            api_url,
            tokens,
        }
    }
}

#[async_trait]
impl MirrorRegistry for SourceRepoClient {
    /// Return the mirror URL of `projects/{project_id}/repos/{repo_name}`, or
    /// the repository's own URL when it is not a mirror.
    async fn resolve_mirror_url(
        &self,
        project_id: &str,
        repo_name: &str,
    ) -> Result<String, LookupError> {
        if project_id.is_empty() || repo_name.is_empty() {
            return Err(LookupError::MissingSource {
                project: project_id.to_string(),
                repo: repo_name.to_string(),
            });
        }

        let name = format!("projects/{project_id}/repos/{repo_name}");
        let url = api_endpoint(&self.api_url, ["v1", "projects", project_id, "repos", repo_name])
            .ok_or_else(|| LookupError::InvalidEndpoint(self.api_url.to_string()))?;
        let token = self.tokens.token(&self.http).await?;

        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LookupError::Registry { name, status, body });
        }

        let repo: RepoResource = resp.json().await?;
        let mirror_url = repo
            .mirror_config
            .map(|m| m.url)
            .filter(|u| !u.is_empty())
            .unwrap_or(repo.url);
        if mirror_url.is_empty() {
            return Err(LookupError::NoUrl(name));
        }

        tracing::debug!(repo = %name, url = %mirror_url, "Resolved source repository mirror");
        Ok(mirror_url)
    }
}
