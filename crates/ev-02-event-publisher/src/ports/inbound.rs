//! Driving Ports (API - Inbound)

use crate::error::PublishResult;
use async_trait::async_trait;
use shared_bus::PublishAck;
use shared_types::{EventEnvelope, Topic};

/// Schema-gated event publishing.
///
/// Webhook ingress and other producers depend on this port rather than on
/// the concrete publisher.
#[async_trait]
pub trait EventPublishing: Send + Sync {
    /// Validate and append `event` under `topic`'s subject.
    ///
    /// Exactly one broker append happens for a valid event; none for an
    /// invalid one.
    async fn publish(&self, topic: &Topic, event: &EventEnvelope) -> PublishResult<PublishAck>;
}
