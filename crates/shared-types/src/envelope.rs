//! # `EventEnvelope`
//!
//! The wrapper for every domain event appended to a stream.
//!
//! ## Properties
//!
//! - **Identity**: `event_id` is unique per logical event and doubles as the
//!   broker duplicate-suppression id.
//! - **Routing**: `topic` selects the subject and the registered schema.
//! - **Payload**: a schema-versioned JSON object; the envelope itself is never
//!   validated against the topic schema, only its `payload`.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::entities::Topic;

/// A domain event as it travels through the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique event identifier.
    pub event_id: String,
    /// Topic name the event belongs to.
    pub topic: String,
    /// User the event concerns.
    pub user_id: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Schema-versioned payload object.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build an envelope with a fresh id and the current time.
    #[must_use]
    pub fn new(topic: &Topic, user_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            topic: topic.as_str().to_string(),
            user_id: user_id.into(),
            timestamp: current_timestamp_ms(),
            payload,
        }
    }

    /// Replace the generated id, e.g. with an upstream delivery id.
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    /// Encode as JSON bytes for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// One validation failure, located by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer into the payload (`""` for the root).
    pub path: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationIssue {
    /// Create an issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Outcome of validating a payload. Invalid is a normal result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when no issues were found.
    pub valid: bool,
    /// Issues found, empty when valid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing result. An empty issue list still counts as invalid.
    #[must_use]
    pub fn invalid(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// Build from collected issues.
    #[must_use]
    pub fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        if errors.is_empty() {
            Self::ok()
        } else {
            Self::invalid(errors)
        }
    }

    /// Issues joined into one line, for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Current time in milliseconds since the Unix epoch.
///
/// Returns 0 if the system clock is before the epoch.
#[must_use]
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
