//! Pub/Sub push handler — unwraps the push envelope and relays its payload.
//!
//! A 2xx answer acknowledges the message; anything else makes Pub/Sub
//! redeliver it.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::config::DeliveryFailurePolicy;
use crate::errors::EnvelopeError;
use crate::services::relay_service::{RelayOutcome, StatusPublisher};

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
    #[serde(default)]
    subscription: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    data: Option<String>,
    #[serde(default)]
    message_id: String,
    attributes: Option<HashMap<String, String>>,
}

/// A message unwrapped from a push request.
#[derive(Debug)]
pub struct PushedMessage {
    pub message_id: String,
    pub subscription: String,
    pub attributes: HashMap<String, String>,
    pub data: Vec<u8>,
}

/// Parse a push request body and base64-decode its payload.
pub fn unwrap_envelope(body: &[u8]) -> Result<PushedMessage, EnvelopeError> {
    let envelope: PushEnvelope = serde_json::from_slice(body)?;
    let data = envelope
        .message
        .data
        .filter(|d| !d.is_empty())
        .ok_or(EnvelopeError::EmptyData)?;

    Ok(PushedMessage {
        message_id: envelope.message.message_id,
        subscription: envelope.subscription,
        attributes: envelope.message.attributes.unwrap_or_default(),
        data: STANDARD.decode(data.trim())?,
    })
}

/// Handle one push request and decide whether to acknowledge it.
pub async fn handle_push(
    publisher: &StatusPublisher,
    policy: DeliveryFailurePolicy,
    body: Bytes,
) -> StatusCode {
    let message = match unwrap_envelope(&body) {
        Ok(message) => message,
        Err(e) => {
            // Redelivery cannot repair a broken envelope.
            tracing::error!(error = %e, "Dropping unreadable push request");
            crate::metrics::message_handled("envelope_error");
            return StatusCode::NO_CONTENT;
        }
    };

    tracing::debug!(
        message_id = %message.message_id,
        subscription = %message.subscription,
        build_id = message.attributes.get("buildId").map(String::as_str).unwrap_or_default(),
        "Received push message"
    );

    match (publisher.publish(&message.data).await, policy) {
        (RelayOutcome::DeliveryFailed { transient: true }, DeliveryFailurePolicy::Redeliver) => {
            tracing::warn!(message_id = %message.message_id, "Requesting redelivery");
            StatusCode::SERVICE_UNAVAILABLE
        }
        (RelayOutcome::DeliveryFailed { transient: false }, DeliveryFailurePolicy::Redeliver) => {
            tracing::warn!(
                message_id = %message.message_id,
                "Status API rejected the update; acknowledging without redelivery"
            );
            StatusCode::NO_CONTENT
        }
        _ => StatusCode::NO_CONTENT,
    }
}
