//! # Schema Gate
//!
//! An envelope failing schema validation is never appended by the
//! publisher and never handed to business logic by the consumer.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use bytes::Bytes;
    use ev_02_event_publisher::{EventPublishing, PublishError};
    use serde_json::json;
    use shared_types::DeadLetterReason;

    #[tokio::test]
    async fn test_publisher_never_appends_invalid_event() {
        let broker = broker().await;
        let publisher = publisher(&broker, schemas());

        let invalid = hrv_event("evt-bad", json!({"rmssd": "high"}));
        let err = publisher.publish(&hrv_topic(), &invalid).await.unwrap_err();

        match err {
            PublishError::SchemaValidation { topic, errors } => {
                assert_eq!(topic, HRV_TOPIC);
                assert!(!errors.is_empty());
            }
            other => panic!("expected schema rejection, got {other:?}"),
        }
        assert!(broker.messages(STREAM).is_empty());
        assert_eq!(publisher.stats().rejected, 1);

        let valid = hrv_event("evt-good", hrv_payload(41.0));
        publisher.publish(&hrv_topic(), &valid).await.unwrap();
        assert_eq!(broker.messages(STREAM).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_dead_letters_invalid_without_retry() {
        let broker = broker().await;
        let handler = ScriptedHandler::new(schemas(), Script::Succeed);

        // A producer that skipped validation.
        append_unchecked(&broker, &hrv_event("evt-bad", json!({"rmssd": -3}))).await;
        append_raw(&broker, "evt-garbage", Bytes::from_static(b"{not json")).await;

        let running = RunningConsumer::start(&broker, handler.clone(), consumer_config()).await;
        wait_until(|| running.consumer.stats().snapshot().dead_lettered_schema_invalid == 2).await;

        let stats = running.consumer.stats().snapshot();
        assert_eq!(dead_letters(&broker, DeadLetterReason::SchemaInvalid.as_str()).len(), 2);
        assert_eq!(stats.redeliveries, 0);
        assert_eq!(stats.naks, 0);
        assert_eq!(handler.calls(), 0);

        // Original bytes and headers travel to the dead-letter subject.
        let letters = dead_letters(&broker, "schema-invalid");
        for original in broker.messages_for_subject(HRV_TOPIC) {
            let letter = letters
                .iter()
                .find(|l| l.headers.get("msg-id") == original.headers.get("msg-id"))
                .unwrap();
            assert_eq!(letter.payload, original.payload);
        }

        running.stop().await;
        assert_eq!(broker.ack_pending(STREAM, "domain-hrv-raw-received-consumer"), 0);
    }
}
