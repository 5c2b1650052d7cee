//! # Bounded Redelivery
//!
//! `delivery_count` alone decides between retrying and dead-lettering:
//! a transient failure is retried until `max_deliver`, a permanent one is
//! dead-lettered on its first delivery.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use ev_02_event_publisher::EventPublishing;
    use ev_05_durable_consumer::ConsumerConfig;
    use shared_types::DeadLetterReason;

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_max_deliver() {
        let broker = broker().await;
        let schemas = schemas();
        let publisher = publisher(&broker, schemas.clone());
        let handler = ScriptedHandler::new(schemas, Script::AlwaysTransient);

        publisher
            .publish(&hrv_topic(), &hrv_event("evt-flaky", hrv_payload(38.0)))
            .await
            .unwrap();

        let config = ConsumerConfig {
            max_deliver: 5,
            ..consumer_config()
        };
        let started = tokio::time::Instant::now();
        let running = RunningConsumer::start(&broker, handler.clone(), config).await;
        wait_until(|| running.consumer.stats().snapshot().dead_lettered() == 1).await;

        let stats = running.consumer.stats().snapshot();
        assert_eq!(handler.attempts("evt-flaky"), 5);
        assert_eq!(stats.redeliveries, 4);
        assert_eq!(stats.naks, 4);
        assert_eq!(stats.dead_lettered_max_deliver, 1);
        assert_eq!(stats.acked, 0);

        // Four fixed 5 s nak delays separate the five deliveries.
        assert!(started.elapsed() >= std::time::Duration::from_secs(20));

        let letters = dead_letters(&broker, DeadLetterReason::MaxDeliver.as_str());
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].headers.get("msg-id").map(String::as_str), Some("evt-flaky"));

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_short_circuits() {
        let broker = broker().await;
        let schemas = schemas();
        let publisher = publisher(&broker, schemas.clone());
        let handler = ScriptedHandler::new(schemas, Script::Permanent);

        publisher
            .publish(&hrv_topic(), &hrv_event("evt-unknown", hrv_payload(44.0)))
            .await
            .unwrap();

        let running = RunningConsumer::start(&broker, handler.clone(), consumer_config()).await;
        wait_until(|| running.consumer.stats().snapshot().dead_lettered() == 1).await;

        let stats = running.consumer.stats().snapshot();
        assert_eq!(handler.attempts("evt-unknown"), 1);
        assert_eq!(stats.redeliveries, 0);
        assert_eq!(stats.dead_lettered_non_retryable, 1);
        assert_eq!(dead_letters(&broker, "non-retryable").len(), 1);

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_prefix_is_configurable() {
        let broker = broker().await;
        let schemas = schemas();
        let publisher = publisher(&broker, schemas.clone());
        let handler = ScriptedHandler::new(schemas, Script::Permanent);

        publisher
            .publish(&hrv_topic(), &hrv_event("evt-1", hrv_payload(44.0)))
            .await
            .unwrap();

        let config = ConsumerConfig {
            dlq_subject_prefix: Some("dlq.hrv".into()),
            ..consumer_config()
        };
        let running = RunningConsumer::start(&broker, handler, config).await;
        wait_until(|| running.consumer.stats().snapshot().dead_lettered() == 1).await;

        assert_eq!(broker.messages_for_subject("dlq.hrv.non-retryable").len(), 1);
        assert!(dead_letters(&broker, "non-retryable").is_empty());

        running.stop().await;
    }
}
