//! # Webhook Ingress
//!
//! Signed webhook deliveries are forwarded to the publisher at most once
//! per idempotency key within the TTL.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use ev_06_webhook_ingress::{router, sign, WebhookConfig, WebhookIngress, DELIVERY_ID_HEADER};
    use shared_bus::InMemoryStreamBroker;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "whsec_integration";

    fn body(rmssd: &str) -> String {
        format!(
            r#"{{"topic":"{HRV_TOPIC}","userId":"athlete-1","payload":{{"rmssd":{rmssd},"measuredAt":"2024-05-01T06:30:00Z"}}}}"#
        )
    }

    async fn app(ttl: Duration) -> (Router, Arc<WebhookIngress>, InMemoryStreamBroker) {
        let broker = broker().await;
        let publisher = Arc::new(publisher(&broker, schemas()));
        let config = WebhookConfig {
            secret: SECRET.into(),
            idempotency_ttl: ttl,
            ..WebhookConfig::default()
        };
        let ingress = Arc::new(WebhookIngress::new(config, publisher));
        (router(Arc::clone(&ingress)), ingress, broker)
    }

    fn post(body: &str, signature: Option<&str>, delivery_id: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/webhooks/wearable");
        if let Some(sig) = signature {
            builder = builder.header("x-signature-256", sig);
        }
        if let Some(id) = delivery_id {
            builder = builder.header(DELIVERY_ID_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_delivery_twice_publishes_once_until_ttl() {
        let (app, _, broker) = app(Duration::from_secs(300)).await;
        let body = body("42.5");
        let sig = sign(SECRET.as_bytes(), body.as_bytes());

        let (first, first_json) = send(&app, post(&body, Some(&sig), Some("dlv-1"))).await;
        let (second, second_json) = send(&app, post(&body, Some(&sig), Some("dlv-1"))).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::OK);
        assert_eq!(first_json["duplicate"], false);
        assert_eq!(second_json["duplicate"], true);
        assert_eq!(broker.messages(STREAM).len(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        let (third, third_json) = send(&app, post(&body, Some(&sig), Some("dlv-1"))).await;
        assert_eq!(third, StatusCode::OK);
        assert_eq!(third_json["duplicate"], false);
        assert_eq!(broker.messages(STREAM).len(), 2);
    }

    #[tokio::test]
    async fn test_content_hash_dedupes_without_delivery_id() {
        let (app, _, broker) = app(Duration::from_secs(300)).await;
        let body = body("40");
        let sig = sign(SECRET.as_bytes(), body.as_bytes());

        send(&app, post(&body, Some(&sig), None)).await;
        let (status, json) = send(&app, post(&body, Some(&sig), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["duplicate"], true);
        assert_eq!(broker.messages(STREAM).len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected_regardless_of_payload() {
        let (app, ingress, broker) = app(Duration::from_secs(300)).await;
        let valid = body("42.5");
        let invalid = body("\"high\"");
        let forged = sign(b"not-the-secret", valid.as_bytes());

        let cases = [
            post(&valid, Some(&forged), Some("dlv-2")),
            post(&valid, None, Some("dlv-2")),
            post(&invalid, Some(&forged), None),
            post(&invalid, Some("sha256=zz"), None),
        ];
        for request in cases {
            let (status, _) = send(&app, request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        assert!(broker.messages(STREAM).is_empty());
        assert!(ingress.cache().is_empty());
    }

    #[tokio::test]
    async fn test_schema_invalid_webhook_not_published_and_key_released() {
        let (app, ingress, broker) = app(Duration::from_secs(300)).await;
        let invalid = body("\"high\"");
        let sig = sign(SECRET.as_bytes(), invalid.as_bytes());

        let (status, json) = send(&app, post(&invalid, Some(&sig), Some("dlv-3"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["status"], "error");
        assert!(broker.messages(STREAM).is_empty());
        assert!(ingress.cache().is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_is_bad_request() {
        let (app, _, _) = app(Duration::from_secs(300)).await;
        let sig = sign(SECRET.as_bytes(), b"");
        let (status, _) = send(&app, post("", Some(&sig), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
