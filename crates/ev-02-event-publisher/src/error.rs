//! Error types for the Event Publisher

use shared_bus::BrokerError;
use shared_types::ValidationIssue;
use thiserror::Error;

/// Publish failures
#[derive(Debug, Error)]
pub enum PublishError {
    /// Payload failed schema validation; nothing was appended.
    #[error("Event for topic {topic} failed schema validation: {}", summarize(.errors))]
    SchemaValidation {
        topic: String,
        errors: Vec<ValidationIssue>,
    },

    /// Envelope topic differs from the topic it is published to.
    #[error("Envelope topic {envelope_topic} does not match publish topic {topic}")]
    TopicMismatch {
        topic: String,
        envelope_topic: String,
    },

    /// Envelope could not be encoded.
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker append failed.
    #[error("Broker append failed: {0}")]
    Transport(#[from] BrokerError),
}

impl PublishError {
    /// Short label for metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            PublishError::SchemaValidation { .. } | PublishError::TopicMismatch { .. } => {
                "schema_invalid"
            }
            PublishError::Serialization(_) => "serialization_error",
            PublishError::Transport(_) => "transport_error",
        }
    }

    /// True if the same publish may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transport(e) if e.is_transient())
    }
}

fn summarize(errors: &[ValidationIssue]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for publishing
pub type PublishResult<T> = Result<T, PublishError>;
