//! Error types for webhook ingress

use crate::ports::TranslationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ev_02_event_publisher::PublishError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing signature header {header}")]
    MissingSignature { header: String },

    #[error("Signature does not match request body")]
    InvalidSignature,

    #[error("Empty request body")]
    EmptyBody,

    #[error("Request body could not be read: {0}")]
    UnreadableBody(String),

    #[error("Webhook body could not be translated: {0}")]
    Translation(#[from] TranslationError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl WebhookError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature { .. } | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::EmptyBody
            | WebhookError::UnreadableBody(_)
            | WebhookError::Translation(_) => StatusCode::BAD_REQUEST,
            // includes schema rejections
            WebhookError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "status": "error",
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type WebhookResult<T> = Result<T, WebhookError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::BrokerError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            WebhookError::MissingSignature { header: "x".into() }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(WebhookError::InvalidSignature.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(WebhookError::EmptyBody.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WebhookError::Publish(PublishError::Transport(BrokerError::Timeout)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            WebhookError::Publish(PublishError::SchemaValidation {
                topic: "domain.x".into(),
                errors: vec![],
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
