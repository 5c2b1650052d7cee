//! # Core Stream Entities
//!
//! Routing and delivery vocabulary shared by the publisher, the durable
//! consumers and the broker adapters.
//!
//! ## Clusters
//!
//! - **Routing**: `Topic`, `Subject`, subject wildcard matching
//! - **Delivery**: `DeliveryInfo`, `Headers`
//! - **Dead letters**: `DeadLetterReason`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::TopicError;

/// Message headers carried alongside the payload bytes.
///
/// Ordered so that header sets compare and print deterministically.
pub type Headers = BTreeMap<String, String>;

/// Header carrying the event id, used by the broker for duplicate suppression.
pub const HEADER_MSG_ID: &str = "msg-id";

/// Header carrying the topic the envelope was published for.
pub const HEADER_TOPIC: &str = "event-topic";

// =============================================================================
// ROUTING
// =============================================================================

/// A registered event topic, e.g. `domain.hrv.raw-received`.
///
/// Tokens are lowercase ASCII letters, digits, `-` or `_`, separated by
/// dots. Wildcards are not allowed: the subject space is static.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Parse and validate a topic name.
    pub fn new(name: impl Into<String>) -> Result<Self, TopicError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TopicError::Empty);
        }
        for token in name.split('.') {
            let valid = !token.is_empty()
                && token
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
            if !valid {
                return Err(TopicError::InvalidToken {
                    topic: name.clone(),
                    token: token.to_string(),
                });
            }
        }
        Ok(Self(name))
    }

    /// The topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The subject this topic is published under. Derived 1:1.
    #[must_use]
    pub fn subject(&self) -> Subject {
        Subject(self.0.clone())
    }

    /// Second token of the topic (`hrv` for `domain.hrv.raw-received`),
    /// or the first token for single-token topics.
    #[must_use]
    pub fn domain(&self) -> &str {
        let mut tokens = self.0.split('.');
        let first = tokens.next().unwrap_or_default();
        tokens.next().unwrap_or(first)
    }

    /// Stable durable consumer name for this topic.
    #[must_use]
    pub fn default_durable_name(&self) -> String {
        format!("{}-consumer", self.0.replace('.', "-"))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

/// A concrete (wildcard-free) routing key a message is published under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject(String);

impl Subject {
    /// Wrap a subject string. Callers are expected to pass literal subjects.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// The subject string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a token: `domain.hrv.raw-received` + `max-deliver`.
    #[must_use]
    pub fn child(&self, token: &str) -> Subject {
        Subject(format!("{}.{}", self.0, token))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Match a literal subject against a pattern with `*` and `>` wildcards.
///
/// `*` matches exactly one token; `>` matches one or more trailing tokens
/// and must be the last token of the pattern.
#[must_use]
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(s)) if !s.is_empty() => continue,
            (Some(p), Some(s)) if p == s && !s.is_empty() => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

// =============================================================================
// DELIVERY
// =============================================================================

/// Delivery metadata attached to every pulled message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    /// Stream the message was read from.
    pub stream: String,
    /// Durable consumer that delivered it.
    pub consumer: String,
    /// Position of the message in the stream.
    pub stream_seq: u64,
    /// Monotonic delivery counter of the consumer.
    pub delivery_seq: u64,
    /// How many times this message has been delivered, starting at 1.
    pub delivery_count: u32,
}

impl DeliveryInfo {
    /// Number of deliveries beyond the first one.
    #[must_use]
    pub fn redelivery_count(&self) -> u32 {
        self.delivery_count.saturating_sub(1)
    }

    /// True if this is not the first delivery.
    #[must_use]
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

// =============================================================================
// DEAD LETTERS
// =============================================================================

/// Why a message was moved to a dead-letter subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeadLetterReason {
    /// Payload failed decoding or schema validation.
    SchemaInvalid,
    /// Handler failed with an error that will not succeed on retry.
    NonRetryable,
    /// Delivery attempts exhausted.
    MaxDeliver,
}

impl DeadLetterReason {
    /// Every reason code.
    pub const ALL: [DeadLetterReason; 3] = [
        DeadLetterReason::SchemaInvalid,
        DeadLetterReason::NonRetryable,
        DeadLetterReason::MaxDeliver,
    ];

    /// Reason code used as the last subject token.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::SchemaInvalid => "schema-invalid",
            DeadLetterReason::NonRetryable => "non-retryable",
            DeadLetterReason::MaxDeliver => "max-deliver",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
