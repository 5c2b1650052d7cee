//! # Topic Handlers
//!
//! Handlers registered with the durable consumers. Validation is delegated
//! to the schema registry so consumers and the publisher agree on what a
//! valid payload is.

pub mod schemas;

use async_trait::async_trait;
use ev_01_schema_validation::{SchemaRegistry, SchemaValidation};
use ev_05_durable_consumer::TopicHandler;
use serde_json::Value;
use shared_types::{EventEnvelope, HandlerError, Topic, ValidationResult};
use std::sync::Arc;
use tracing::info;

pub use schemas::{register_builtin_schemas, BUILTIN_SCHEMAS};

/// Validates against the registered schema and records the event.
///
/// Business side effects live outside the event core; this handler is the
/// sink used when no collaborator registered one for the topic.
pub struct SchemaBackedHandler {
    topic: Topic,
    schemas: Arc<SchemaRegistry>,
}

impl SchemaBackedHandler {
    pub fn new(topic: Topic, schemas: Arc<SchemaRegistry>) -> Self {
        Self { topic, schemas }
    }
}

#[async_trait]
impl TopicHandler for SchemaBackedHandler {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn validate(&self, payload: &Value) -> ValidationResult {
        self.schemas.validate(self.topic.as_str(), payload)
    }

    async fn process(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        info!(
            topic = %self.topic,
            event_id = %event.event_id,
            user_id = %event.user_id,
            "[event-runtime] Event processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_handler_uses_registry_schema() {
        let schemas = Arc::new(SchemaRegistry::new());
        register_builtin_schemas(&schemas).unwrap();
        let topic = Topic::new(schemas::HRV_RAW_RECEIVED).unwrap();
        let handler = SchemaBackedHandler::new(topic.clone(), schemas);

        assert!(!handler.validate(&json!({"rmssd": -1, "measuredAt": "x"})).valid);

        let event = EventEnvelope::new(&topic, "u1", json!({"rmssd": 40, "measuredAt": "x"}));
        assert!(handler.validate(&event.payload).valid);
        assert!(handler.process(&event).await.is_ok());
    }
}
