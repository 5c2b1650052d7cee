//! # HTTP Wiring
//!
//! Assembles the process router:
//!
//! | Route | Source |
//! |-------|--------|
//! | `POST /webhooks/:source` | webhook ingress |
//! | `GET /status` | consumer status query |
//! | `GET /health` | liveness |
//! | `GET /metrics` | Prometheus text exposition |

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use ev_05_durable_consumer::ConsumerStatusQuery;
use ev_06_webhook_ingress::WebhookIngress;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Read-only status routes. No side effects.
pub fn status_routes(status: Arc<dyn ConsumerStatusQuery>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(status)
}

/// Full process router.
pub fn app_router(
    ingress: Arc<WebhookIngress>,
    status: Arc<dyn ConsumerStatusQuery>,
    request_timeout: Duration,
) -> Router {
    ev_06_webhook_ingress::router(ingress)
        .merge(status_routes(status))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}

async fn status_handler(State(status): State<Arc<dyn ConsumerStatusQuery>>) -> impl IntoResponse {
    Json(serde_json::json!({ "topics": status.statuses() }))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn metrics_handler() -> impl IntoResponse {
    match stream_telemetry::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
