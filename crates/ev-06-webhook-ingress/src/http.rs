//! `POST /webhooks/:source`

use crate::error::WebhookError;
use crate::service::WebhookIngress;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use stream_telemetry::WEBHOOK_REQUESTS;
use tower_http::limit::RequestBodyLimitLayer;

/// Router serving the webhook endpoint for every source.
pub fn router(ingress: Arc<WebhookIngress>) -> Router {
    let limit = ingress.config().max_body_bytes;
    Router::new()
        .route("/webhooks/:source", post(handle_webhook))
        .layer(RequestBodyLimitLayer::new(limit))
        .with_state(ingress)
}

async fn handle_webhook(
    State(ingress): State<Arc<WebhookIngress>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = match body {
        Ok(body) => ingress.ingest(&source, &headers, &body).await,
        Err(rejection) => Err(WebhookError::UnreadableBody(rejection.body_text())),
    };

    let (status, response) = match result {
        Ok(outcome) => {
            let status_label = if outcome.duplicate { "duplicate" } else { "accepted" };
            let mut body = serde_json::json!({
                "status": status_label,
                "duplicate": outcome.duplicate,
            });
            if let Some(event_id) = outcome.event_id {
                body["event_id"] = serde_json::Value::String(event_id);
            }
            (StatusCode::OK, Json(body).into_response())
        }
        Err(e) => (e.status(), e.into_response()),
    };

    WEBHOOK_REQUESTS
        .with_label_values(&[source.as_str(), status.as_str()])
        .inc();
    response
}
