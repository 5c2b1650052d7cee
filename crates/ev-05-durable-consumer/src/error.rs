//! Error types for the Durable Consumer

use ev_04_concurrency_governor::GovernorError;
use shared_bus::BrokerError;
use std::fmt;
use thiserror::Error;

/// One failed attempt to bind a durable to a candidate stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAttempt {
    pub stream: String,
    pub error: BrokerError,
}

impl fmt::Display for BindAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stream, self.error)
    }
}

fn describe(attempts: &[BindAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidates configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Startup could not bind the durable on any candidate stream.
    #[error("No stream candidate for durable {durable}: {}", describe(.attempts))]
    NoStreamCandidate {
        durable: String,
        attempts: Vec<BindAttempt>,
    },

    #[error("Topic {topic} is already registered")]
    DuplicateTopic { topic: String },

    #[error("Consumer for {topic} was already started")]
    AlreadyStarted { topic: String },

    #[error("Invalid consumer configuration for {topic}: {reason}")]
    InvalidConfig { topic: String, reason: String },

    #[error(transparent)]
    Governor(#[from] GovernorError),
}

pub type ConsumerResult<T> = Result<T, ConsumerError>;
