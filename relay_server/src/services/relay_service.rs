//! Status publishing — decode, map, resolve, and deliver one build notification.
//!
//! Every failure is contained within the message that caused it: the publisher
//! never returns an error, only a `RelayOutcome` the subscription driver turns
//! into an acknowledgement decision.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::DeliveryError;
use crate::models::status::StatusUpdate;
use crate::services::identity_service::IdentityResolver;
use crate::services::{decode_service, status_service};

/// Records a commit status on the hosting platform.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        update: &StatusUpdate,
    ) -> Result<(), DeliveryError>;
}

/// Why a message was dropped without a status push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Decode,
    Resolution,
}

/// Result of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    Dropped(DropReason),
    /// The status API refused or never received the update. `transient` is
    /// set when another attempt could succeed.
    DeliveryFailed { transient: bool },
}

impl RelayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Dropped(DropReason::Decode) => "decode_error",
            Self::Dropped(DropReason::Resolution) => "resolution_error",
            Self::DeliveryFailed { .. } => "delivery_error",
        }
    }
}

/// Per-subscription handler. Holds immutable configuration and the lock that
/// keeps at most one status push in flight.
pub struct StatusPublisher {
    resolver: IdentityResolver,
    sink: Arc<dyn StatusSink>,
    context: String,
    lock: Mutex<()>,
}

impl StatusPublisher {
    pub fn new(
        resolver: IdentityResolver,
        sink: Arc<dyn StatusSink>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            sink,
            context: context.into(),
            lock: Mutex::new(()),
        }
    }

    /// Handle one raw notification payload.
    ///
    /// Concurrent callers are serialized for the whole pipeline. Dropping the
    /// returned future abandons the message and releases the lock.
    pub async fn publish(&self, payload: &[u8]) -> RelayOutcome {
        let _guard = self.lock.lock().await;
        let outcome = self.publish_locked(payload).await;
        crate::metrics::message_handled(outcome.as_str());
        outcome
    }

    async fn publish_locked(&self, payload: &[u8]) -> RelayOutcome {
        let notification = match decode_service::decode(payload) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Failed to decode build notification"
                );
                return RelayOutcome::Dropped(DropReason::Decode);
            }
        };

        let source = &notification.resolved_source;
        tracing::info!(
            build_id = %notification.id,
            status = %notification.status,
            project = %notification.project_id,
            sha = %source.commit_sha,
            repo = %source.source_repo_name,
            "Got build update"
        );

        let update = status_service::status_update(&notification, &self.context);

        let identity = match self.resolver.resolve(&notification).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!(
                    build_id = %notification.id,
                    status = %notification.status,
                    project = %notification.project_id,
                    source_project = %source.source_project_id,
                    source_repo = %source.source_repo_name,
                    sha = %source.commit_sha,
                    strategy = self.resolver.strategy_name(),
                    error = %e,
                    "Failed to resolve target repository"
                );
                return RelayOutcome::Dropped(DropReason::Resolution);
            }
        };

        let started = std::time::Instant::now();
        let result = self
            .sink
            .create_status(&identity.owner, &identity.repo, &identity.commit_sha, &update)
            .await;
        crate::metrics::delivery_duration(started.elapsed().as_millis() as u64);

        match result {
            Ok(()) => {
                crate::metrics::status_pushed(update.state.as_str());
                tracing::info!(
                    build_id = %notification.id,
                    owner = %identity.owner,
                    repo = %identity.repo,
                    sha = %identity.commit_sha,
                    state = %update.state,
                    "Status sent"
                );
                RelayOutcome::Delivered
            }
            Err(e) => {
                tracing::error!(
                    build_id = %notification.id,
                    owner = %identity.owner,
                    repo = %identity.repo,
                    sha = %identity.commit_sha,
                    state = %update.state,
                    description = %update.description,
                    target_url = %update.target_url,
                    transient = e.is_transient(),
                    error = %e,
                    "Failed to push status update"
                );
                RelayOutcome::DeliveryFailed {
                    transient: e.is_transient(),
                }
            }
        }
    }
}
