//! Driving Ports (API - Inbound)

use serde_json::Value;
use shared_types::ValidationResult;

/// Payload validation against the schema registered for a topic.
///
/// Implementations are pure and safe to share between tasks. An invalid
/// payload, or a topic without a schema, is reported through the result.
pub trait SchemaValidation: Send + Sync {
    /// Validate `payload` against the current schema for `topic`.
    fn validate(&self, topic: &str, payload: &Value) -> ValidationResult;
}
