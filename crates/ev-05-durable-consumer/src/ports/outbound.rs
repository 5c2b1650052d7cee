//! Driven Ports (SPI - Outbound)

use async_trait::async_trait;
use serde_json::Value;
use shared_types::{EventEnvelope, HandlerError, Topic, ValidationResult};

/// Business logic for one topic.
///
/// `validate` runs before `process`; an invalid payload is dead-lettered
/// and never reaches `process`. Errors from `process` must pick the
/// [`HandlerError`] variant that describes them, since the variant decides
/// whether the delivery is retried.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    fn topic(&self) -> &Topic;

    fn validate(&self, payload: &Value) -> ValidationResult;

    async fn process(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}
