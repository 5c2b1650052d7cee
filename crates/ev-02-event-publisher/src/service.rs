//! Event Publisher Service - validate, stamp headers, append

use crate::domain::BackoffConfig;
use crate::error::{PublishError, PublishResult};
use crate::ports::inbound::EventPublishing;
use async_trait::async_trait;
use bytes::Bytes;
use ev_01_schema_validation::SchemaValidation;
use shared_bus::{BrokerError, PublishAck, StreamBroker, StreamInfo, StreamResolver};
use shared_types::{EventEnvelope, Headers, Topic, HEADER_MSG_ID, HEADER_TOPIC};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stream_telemetry::{
    inject_trace_context, HistogramTimer, EVENT_PUBLISH_DURATION, EVENT_PUBLISH_TOTAL,
    EVENT_SCHEMA_VALIDATIONS,
};
use tracing::{debug, info, warn, Instrument};

/// Publisher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Events appended (duplicates included)
    pub published: u64,
    /// Events rejected before reaching the broker
    pub rejected: u64,
    /// Appends the broker refused
    pub failed: u64,
}

/// Schema-gated publisher.
pub struct EventPublisher {
    broker: Arc<dyn StreamBroker>,
    validator: Arc<dyn SchemaValidation>,
    resolver: StreamResolver,
    backoff: BackoffConfig,
    published: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl EventPublisher {
    /// Create a publisher.
    pub fn new(
        broker: Arc<dyn StreamBroker>,
        validator: Arc<dyn SchemaValidation>,
        resolver: StreamResolver,
    ) -> Self {
        Self {
            broker,
            validator,
            resolver,
            backoff: BackoffConfig::default(),
            published: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Use a custom backoff for [`publish_with_retry`](Self::publish_with_retry).
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Make sure a candidate stream exists.
    ///
    /// The first existing candidate wins; when none exists the primary
    /// candidate is created. Safe to call repeatedly.
    pub async fn ensure_stream(&self) -> PublishResult<StreamInfo> {
        let candidates = self.resolver.candidate_streams();
        for name in &candidates {
            match self.broker.stream_info(name).await {
                Ok(info) => {
                    debug!(stream = %name, "Using existing stream");
                    return Ok(info);
                }
                Err(BrokerError::StreamNotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let primary = candidates
            .first()
            .ok_or_else(|| BrokerError::InvalidRequest("no stream candidates configured".into()))?;
        let info = self
            .broker
            .ensure_stream(&self.resolver.stream_spec(primary))
            .await?;
        info!(stream = %primary, subjects = ?info.spec.subjects, "Stream created");
        Ok(info)
    }

    /// Publish, retrying transient broker failures with exponential backoff.
    ///
    /// The `msg-id` header makes a retried append of an already stored event
    /// a broker-side duplicate rather than a second copy.
    pub async fn publish_with_retry(
        &self,
        topic: &Topic,
        event: &EventEnvelope,
    ) -> PublishResult<PublishAck> {
        let mut retry = 0;
        loop {
            match self.publish(topic, event).await {
                Err(e) if e.is_retryable() && retry < self.backoff.max_retries => {
                    retry += 1;
                    let delay = self.backoff.delay_for_retry(retry);
                    warn!(
                        topic = %topic,
                        event_id = %event.event_id,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    async fn append(&self, topic: &Topic, event: &EventEnvelope) -> PublishResult<PublishAck> {
        if event.topic != topic.as_str() {
            return Err(PublishError::TopicMismatch {
                topic: topic.to_string(),
                envelope_topic: event.topic.clone(),
            });
        }

        let validation = self.validator.validate(topic.as_str(), &event.payload);
        EVENT_SCHEMA_VALIDATIONS
            .with_label_values(&[topic.as_str(), if validation.valid { "valid" } else { "invalid" }])
            .inc();
        if !validation.valid {
            warn!(
                topic = %topic,
                event_id = %event.event_id,
                errors = %validation.summary(),
                "Event rejected by schema"
            );
            return Err(PublishError::SchemaValidation {
                topic: topic.to_string(),
                errors: validation.errors,
            });
        }

        let payload = event.to_bytes()?;
        let mut headers = Headers::new();
        headers.insert(HEADER_MSG_ID.to_string(), event.event_id.clone());
        headers.insert(HEADER_TOPIC.to_string(), topic.to_string());
        inject_trace_context(&mut headers);

        let ack = self
            .broker
            .publish(&topic.subject(), headers, Bytes::from(payload))
            .await?;

        debug!(
            topic = %topic,
            event_id = %event.event_id,
            stream = %ack.stream,
            stream_seq = ack.sequence,
            duplicate = ack.duplicate,
            "Event published"
        );
        Ok(ack)
    }
}

#[async_trait]
impl EventPublishing for EventPublisher {
    async fn publish(&self, topic: &Topic, event: &EventEnvelope) -> PublishResult<PublishAck> {
        let _timer =
            HistogramTimer::new(&EVENT_PUBLISH_DURATION.with_label_values(&[topic.as_str()]));
        let span = tracing::info_span!(
            "event.publish",
            otel.kind = "producer",
            messaging.destination = %topic,
            event_id = %event.event_id,
        );

        let result = self.append(topic, event).instrument(span).await;

        let outcome = match &result {
            Ok(_) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                "success"
            }
            Err(e @ PublishError::Transport(_)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %topic, event_id = %event.event_id, error = %e, "Broker append failed");
                e.outcome()
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                e.outcome()
            }
        };
        EVENT_PUBLISH_TOTAL
            .with_label_values(&[topic.as_str(), outcome])
            .inc();
        result
    }
}
