//! Driving Ports (API - Inbound)

use crate::error::RouteResult;
use async_trait::async_trait;
use shared_bus::{DeliveredMessage, PublishAck};
use shared_types::DeadLetterReason;

/// Moves a delivery to its dead-letter subject.
#[async_trait]
pub trait DeadLetterRouting: Send + Sync {
    /// Republish the raw bytes and headers of `message` under its
    /// dead-letter subject for `reason`.
    async fn route(
        &self,
        message: &DeliveredMessage,
        reason: DeadLetterReason,
    ) -> RouteResult<PublishAck>;
}
