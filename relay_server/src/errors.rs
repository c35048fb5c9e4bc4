//! Error taxonomy for the relay pipeline.
//!
//! None of these are fatal to the process except `ConfigError`, which is only
//! produced while starting up.

use thiserror::Error;

/// The payload could not be turned into a build notification.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("build notification has no id")]
    MissingId,
}

/// The mirror registry could not produce a URL for a source repository.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("source repository is not identified (project {project:?}, repo {repo:?})")]
    MissingSource { project: String, repo: String },
    #[error("failed to obtain registry access token: {0}")]
    Token(String),
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry returned HTTP {status} for {name}: {body}")]
    Registry {
        name: String,
        status: u16,
        body: String,
    },
    #[error("registry entry {0} has no URL")]
    NoUrl(String),
    #[error("URL cannot carry a path: {0}")]
    InvalidEndpoint(String),
}

/// A notification does not identify exactly one repository and commit.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("mirror lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("failed to parse repository URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unknown repository provider for {url} (expected host {expected})")]
    UnknownHost { url: String, expected: String },
    #[error("repository URL path must be /<owner>/<repo>: {url}")]
    MalformedPath { url: String },
    #[error("failed to parse repository identity from name {0:?}")]
    MalformedName(String),
    #[error("unknown repository type {prefix:?} in name {name:?}")]
    UnknownRepoType { prefix: String, name: String },
    #[error("repository owner {0:?} is not allowed")]
    OwnerNotAllowed(String),
    #[error("notification carries no commit sha")]
    MissingCommit,
}

/// The commit status API did not accept an update.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("status request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status API returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("status API base URL cannot carry a path: {0}")]
    InvalidEndpoint(String),
}

impl DeliveryError {
    /// Whether sending the same update again could succeed.
    ///
    /// Transport failures, rate limiting and 5xx answers are transient; any
    /// other rejection will be repeated for the same update.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidEndpoint(_) => false,
        }
    }
}

/// A Pub/Sub push request could not be unwrapped into a payload.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("push body is not a Pub/Sub envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("push message has no data")]
    EmptyData,
    #[error("push message data is not base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Startup configuration is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a mandatory field ({0}) is unspecified or empty")]
    Missing(&'static str),
    #[error("{field} is not a valid URL: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{0} must be an http(s) base URL")]
    NotBaseUrl(&'static str),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
