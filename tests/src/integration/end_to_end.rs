//! # End to End
//!
//! Publish through consume with transient failures, and a signed webhook
//! travelling through the whole runtime.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use ev_02_event_publisher::EventPublishing;
    use ev_05_durable_consumer::{ConsumerConfig, TopicRegistry};
    use ev_06_webhook_ingress::{sign, DELIVERY_ID_HEADER};
    use event_runtime::{EventCore, EventRuntime, RuntimeConfig};
    use shared_bus::{DeploymentMode, StreamBroker};
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_recover_without_dead_letters() {
        let broker = broker().await;
        let schemas = schemas();
        let publisher = publisher(&broker, schemas.clone());
        let handler = ScriptedHandler::new(schemas, Script::FailTransientTimes(2));

        let ids: Vec<String> = (0..10).map(|i| format!("evt-{i}")).collect();
        for (i, id) in ids.iter().enumerate() {
            publisher
                .publish(&hrv_topic(), &hrv_event(id, hrv_payload(35.0 + i as f64)))
                .await
                .unwrap();
        }

        let config = ConsumerConfig {
            max_deliver: 5,
            ..consumer_config()
        };
        let running = RunningConsumer::start(&broker, handler.clone(), config).await;
        wait_until(|| running.consumer.stats().snapshot().acked == 10).await;

        let stats = running.consumer.stats().snapshot();
        assert_eq!(stats.dead_lettered(), 0);
        assert_eq!(stats.redeliveries, 20);
        for id in &ids {
            assert_eq!(handler.attempts(id), 3);
        }
        let mut succeeded = handler.succeeded();
        succeeded.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(succeeded, expected);

        running.stop().await;
        assert!(dead_letters(&broker, "max-deliver").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_webhook_reaches_handler_through_runtime() {
        let mut config = RuntimeConfig::default();
        config.streams.mode = DeploymentMode::Shared {
            stream: STREAM.into(),
        };
        config.webhook.secret = "whsec_runtime".into();
        config.consumer.idle_backoff_ms = 100;

        let broker: Arc<dyn StreamBroker> = Arc::new(shared_bus::InMemoryStreamBroker::new());
        let schemas = schemas();
        let handler = ScriptedHandler::new(schemas.clone(), Script::Succeed);
        let topics = TopicRegistry::builder()
            .register(handler.clone())
            .unwrap()
            .build();
        let core = EventCore::with_topics(config, broker, schemas, topics);
        let mut runtime = EventRuntime::from_core(core);
        runtime.start().await.unwrap();
        let app = runtime.router().unwrap();

        let body = format!(
            r#"{{"topic":"{HRV_TOPIC}","userId":"athlete-7","payload":{{"rmssd":51.2,"measuredAt":"2024-05-02T06:10:00Z"}}}}"#
        );
        let request = Request::post("/webhooks/wearable")
            .header("x-signature-256", sign(b"whsec_runtime", body.as_bytes()))
            .header(DELIVERY_ID_HEADER, "dlv-e2e")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        wait_until(|| handler.succeeded().len() == 1).await;

        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let topics = status["topics"].as_array().unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0]["topic"], HRV_TOPIC);

        runtime.shutdown().await;
    }
}
