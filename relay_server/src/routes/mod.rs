//! Relay HTTP routes — Pub/Sub push endpoint and health check.

pub mod pubsub;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::DeliveryFailurePolicy;
use crate::services::relay_service::StatusPublisher;

/// Shared state for relay route handlers.
#[derive(Clone)]
pub struct RelayRouterState {
    pub publisher: Arc<StatusPublisher>,
    pub on_delivery_failure: DeliveryFailurePolicy,
}

/// Build the relay's Axum router.
pub fn relay_router(state: RelayRouterState, handler_timeout: Duration) -> Router {
    Router::new()
        .route("/pubsub/push", post(push_handler))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            handler_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

async fn push_handler(State(state): State<RelayRouterState>, body: Bytes) -> StatusCode {
    crate::metrics::message_received("push");
    pubsub::handle_push(&state.publisher, state.on_delivery_failure, body).await
}

async fn health() -> &'static str {
    "ok"
}
