//! Topic handler registry
//!
//! Built once at startup and frozen before any consumer starts. One handler
//! per topic; the subject space is fixed from then on.

use crate::error::{ConsumerError, ConsumerResult};
use crate::ports::TopicHandler;
use shared_types::Topic;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub struct TopicRegistryBuilder {
    handlers: BTreeMap<Topic, Arc<dyn TopicHandler>>,
}

impl TopicRegistryBuilder {
    /// Add a handler under its own topic.
    pub fn register(mut self, handler: Arc<dyn TopicHandler>) -> ConsumerResult<Self> {
        let topic = handler.topic().clone();
        if self.handlers.contains_key(&topic) {
            return Err(ConsumerError::DuplicateTopic {
                topic: topic.to_string(),
            });
        }
        self.handlers.insert(topic, handler);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> TopicRegistry {
        TopicRegistry {
            handlers: self.handlers,
        }
    }
}

/// Frozen topic → handler map.
#[derive(Clone)]
pub struct TopicRegistry {
    handlers: BTreeMap<Topic, Arc<dyn TopicHandler>>,
}

impl TopicRegistry {
    #[must_use]
    pub fn builder() -> TopicRegistryBuilder {
        TopicRegistryBuilder::default()
    }

    #[must_use]
    pub fn get(&self, topic: &Topic) -> Option<&Arc<dyn TopicHandler>> {
        self.handlers.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.handlers.keys()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn TopicHandler>> {
        self.handlers.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use shared_types::{EventEnvelope, HandlerError, ValidationResult};

    struct Noop(Topic);

    #[async_trait]
    impl TopicHandler for Noop {
        fn topic(&self) -> &Topic {
            &self.0
        }

        fn validate(&self, _payload: &Value) -> ValidationResult {
            ValidationResult::ok()
        }

        async fn process(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn noop(name: &str) -> Arc<dyn TopicHandler> {
        Arc::new(Noop(Topic::new(name).unwrap()))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = TopicRegistry::builder()
            .register(noop("domain.hrv.raw-received"))
            .unwrap()
            .register(noop("domain.training.session-completed"))
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        let topic = Topic::new("domain.hrv.raw-received").unwrap();
        assert_eq!(registry.get(&topic).unwrap().topic(), &topic);
        assert!(registry
            .get(&Topic::new("domain.unknown.event").unwrap())
            .is_none());
    }

    #[test]
    fn test_duplicate_topic_rejected() {
        let result = TopicRegistry::builder()
            .register(noop("domain.hrv.raw-received"))
            .unwrap()
            .register(noop("domain.hrv.raw-received"));
        assert!(matches!(result, Err(ConsumerError::DuplicateTopic { .. })));
    }
}
