//! Error types for the Dead-Letter Router

use shared_bus::BrokerError;
use shared_types::DeadLetterReason;
use thiserror::Error;

/// Dead-letter republish failures.
///
/// The caller must not terminal-ack the original message when routing fails.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Failed to republish to {subject} ({reason}): {source}")]
    Republish {
        subject: String,
        reason: DeadLetterReason,
        #[source]
        source: BrokerError,
    },
}

pub type RouteResult<T> = Result<T, RouteError>;
