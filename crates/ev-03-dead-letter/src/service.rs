//! Dead-Letter Router Service

use crate::error::{RouteError, RouteResult};
use crate::ports::inbound::DeadLetterRouting;
use async_trait::async_trait;
use shared_bus::{DeliveredMessage, PublishAck, StreamBroker};
use shared_types::{DeadLetterReason, Subject, HEADER_TOPIC};
use std::sync::Arc;
use stream_telemetry::EVENT_DEAD_LETTERS;
use tracing::{error, warn};

/// Republishes failed deliveries under `<prefix>.<reason>`.
///
/// Without a configured prefix the original subject is the prefix, so
/// `domain.hrv.raw-received` dead-letters to
/// `domain.hrv.raw-received.max-deliver`.
pub struct DeadLetterRouter {
    broker: Arc<dyn StreamBroker>,
    prefix: Option<Subject>,
}

impl DeadLetterRouter {
    pub fn new(broker: Arc<dyn StreamBroker>, prefix: Option<String>) -> Self {
        Self {
            broker,
            prefix: prefix.filter(|p| !p.is_empty()).map(Subject::new),
        }
    }

    /// Subject a message on `original` is dead-lettered to.
    #[must_use]
    pub fn target_subject(&self, original: &Subject, reason: DeadLetterReason) -> Subject {
        self.prefix
            .as_ref()
            .unwrap_or(original)
            .child(reason.as_str())
    }
}

#[async_trait]
impl DeadLetterRouting for DeadLetterRouter {
    async fn route(
        &self,
        message: &DeliveredMessage,
        reason: DeadLetterReason,
    ) -> RouteResult<PublishAck> {
        let target = self.target_subject(&message.subject, reason);
        let topic = message
            .headers
            .get(HEADER_TOPIC)
            .map_or(message.subject.as_str(), String::as_str);

        let ack = self
            .broker
            .publish(&target, message.headers.clone(), message.payload.clone())
            .await
            .map_err(|source| {
                error!(
                    topic = %topic,
                    subject = %target,
                    reason = %reason,
                    stream_seq = message.info.stream_seq,
                    error = %source,
                    "Dead-letter republish failed"
                );
                RouteError::Republish {
                    subject: target.to_string(),
                    reason,
                    source,
                }
            })?;

        EVENT_DEAD_LETTERS
            .with_label_values(&[topic, reason.as_str()])
            .inc();
        warn!(
            topic = %topic,
            subject = %target,
            reason = %reason,
            stream = %message.info.stream,
            stream_seq = message.info.stream_seq,
            delivery_count = message.info.delivery_count,
            dlq_sequence = ack.sequence,
            "Message dead-lettered"
        );
        Ok(ack)
    }
}
