//! Per-message disposition
//!
//! | Outcome | `delivery_count` | Disposition |
//! |---|---|---|
//! | decode/schema failure | any | dead-letter `schema-invalid` |
//! | success | any | ack |
//! | handler error | `>= max_deliver` | dead-letter `max-deliver` |
//! | retryable error | `< max_deliver` | nak after `retry_delay` |
//! | non-retryable error | `< max_deliver` | dead-letter `non-retryable` |

use super::classifier::classify;
use shared_types::{DeadLetterReason, HandlerError};
use std::time::Duration;

/// Delay before a retryable failure is redelivered.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);

/// Redelivery bounds for one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delivery attempts before a failing message is dead-lettered.
    /// Zero disables the bound.
    pub max_deliver: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_deliver: 5,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// True if the broker will not redeliver after this attempt, so a nak
    /// would lose the message.
    #[must_use]
    pub fn is_final_delivery(&self, delivery_count: u32) -> bool {
        self.max_deliver > 0 && delivery_count >= self.max_deliver
    }
}

/// What processing a delivery produced.
#[derive(Debug, Clone, Copy)]
pub enum HandlerOutcome<'a> {
    Success,
    /// Payload could not be decoded or failed its schema.
    SchemaInvalid,
    Failed(&'a HandlerError),
}

/// Terminal decision for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nak { delay: Duration },
    DeadLetter { reason: DeadLetterReason },
}

impl Disposition {
    /// Label used for `event_consume_total{outcome}`.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Disposition::Ack => "acked",
            Disposition::Nak { .. } => "nak",
            Disposition::DeadLetter { .. } => "dead_lettered",
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Disposition::Ack)
    }
}

/// Reject a delivery before the handler runs.
///
/// A broker that redelivers past `max_deliver` is misconfigured; the message
/// is dead-lettered without another handler invocation.
#[must_use]
pub fn precheck(delivery_count: u32, policy: &RetryPolicy) -> Option<Disposition> {
    (policy.max_deliver > 0 && delivery_count > policy.max_deliver).then_some(
        Disposition::DeadLetter {
            reason: DeadLetterReason::MaxDeliver,
        },
    )
}

/// Decide what happens to a delivery after processing.
#[must_use]
pub fn decide(outcome: HandlerOutcome<'_>, delivery_count: u32, policy: &RetryPolicy) -> Disposition {
    match outcome {
        HandlerOutcome::SchemaInvalid => Disposition::DeadLetter {
            reason: DeadLetterReason::SchemaInvalid,
        },
        HandlerOutcome::Success => Disposition::Ack,
        HandlerOutcome::Failed(_) if policy.is_final_delivery(delivery_count) => Disposition::DeadLetter {
            reason: DeadLetterReason::MaxDeliver,
        },
        HandlerOutcome::Failed(err) if classify(err).retryable => Disposition::Nak {
            delay: policy.retry_delay,
        },
        HandlerOutcome::Failed(_) => Disposition::DeadLetter {
            reason: DeadLetterReason::NonRetryable,
        },
    }
}
