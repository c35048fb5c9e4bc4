//! Relay configuration — loaded from command-line flags with environment fallbacks.

use std::time::Duration;

use clap::{Args, ValueEnum};
use url::Url;

use crate::errors::ConfigError;

/// How a notification's target repository is worked out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ResolverStrategy {
    /// Ask Cloud Source Repositories for the mirror URL.
    MirrorLookup,
    /// Parse the `github-<owner>-<repo>` mirror name.
    NamingConvention,
}

/// What the push endpoint answers when the status API rejects an update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DeliveryFailurePolicy {
    /// Log the failure and acknowledge the message.
    #[default]
    Acknowledge,
    /// Nack the message so Pub/Sub redelivers it with its own backoff.
    Redeliver,
}

/// Flags shared by every subcommand.
#[derive(Args, Clone, Debug)]
pub struct RelayArgs {
    /// GitHub access token used to post commit statuses
    #[arg(long, env = "GITHUB_ACCESS_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Host that mirror URLs must point at
    #[arg(long, env = "GITHUB_HOST", default_value = "github.com")]
    pub github_host: String,

    /// Repository identity resolution strategy
    #[arg(long, env = "RELAY_STRATEGY", value_enum, default_value = "mirror-lookup")]
    pub strategy: ResolverStrategy,

    /// Context label attached to every commit status
    #[arg(long, env = "RELAY_STATUS_CONTEXT", default_value = "Google Container Builder")]
    pub status_context: String,

    /// Only push statuses for these repository owners (default: any)
    #[arg(long = "allowed-owner", env = "RELAY_ALLOWED_OWNERS", value_delimiter = ',')]
    pub allowed_owners: Vec<String>,

    /// Behaviour when the status API rejects an update
    #[arg(long, env = "RELAY_ON_DELIVERY_FAILURE", value_enum, default_value = "acknowledge")]
    pub on_delivery_failure: DeliveryFailurePolicy,

    /// Cloud Source Repositories API base URL
    #[arg(long, env = "SOURCEREPO_API_URL", default_value = "https://sourcerepo.googleapis.com")]
    pub sourcerepo_api_url: String,

    /// Static access token for Cloud Source Repositories (default: metadata server)
    #[arg(long, env = "SOURCEREPO_ACCESS_TOKEN", hide_env_values = true)]
    pub sourcerepo_token: Option<String>,

    /// GCE metadata server base URL
    #[arg(long, env = "GCE_METADATA_URL", default_value = "http://metadata.google.internal")]
    pub metadata_url: String,

    /// Timeout for each outbound HTTP request, in seconds
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout_secs: u64,
}

/// Validated relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub github_token: String,
    pub github_api_url: Url,
    pub github_host: String,
    pub strategy: ResolverStrategy,
    pub status_context: String,
    pub allowed_owners: Vec<String>,
    pub on_delivery_failure: DeliveryFailurePolicy,
    pub sourcerepo_api_url: Url,
    pub sourcerepo_token: Option<String>,
    pub metadata_url: Url,
    pub request_timeout: Duration,
}

impl RelayConfig {
    pub fn from_args(args: RelayArgs) -> Result<Self, ConfigError> {
        let github_token = non_empty(args.github_token).ok_or(ConfigError::Missing("github-token"))?;
        let github_host = args.github_host.trim().to_string();
        if github_host.is_empty() {
            return Err(ConfigError::Missing("github-host"));
        }
        let status_context = args.status_context.trim().to_string();
        if status_context.is_empty() {
            return Err(ConfigError::Missing("status-context"));
        }

        let allowed_owners = args
            .allowed_owners
            .into_iter()
            .map(|owner| owner.trim().to_string())
            .filter(|owner| !owner.is_empty())
            .collect();

        let sourcerepo_token = non_empty(args.sourcerepo_token);
        if args.strategy == ResolverStrategy::MirrorLookup && sourcerepo_token.is_none() {
            tracing::info!("SOURCEREPO_ACCESS_TOKEN not set -- using metadata server credentials");
        }

        Ok(Self {
            github_token,
            github_api_url: parse_url("github-api-url", &args.github_api_url)?,
            github_host,
            strategy: args.strategy,
            status_context,
            allowed_owners,
            on_delivery_failure: args.on_delivery_failure,
            sourcerepo_api_url: parse_url("sourcerepo-api-url", &args.sourcerepo_api_url)?,
            sourcerepo_token,
            metadata_url: parse_url("metadata-url", &args.metadata_url)?,
            request_timeout: Duration::from_secs(args.request_timeout_secs.max(1)),
        })
    }

    /// Shared HTTP client for every outbound call.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("build-status-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { field, source })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::NotBaseUrl(field));
    }
    Ok(url)
}
