//! # Component Container
//!
//! Builds the event core's components from a [`RuntimeConfig`] and owns
//! them for the lifetime of the process.
//!
//! ## Initialization Order
//!
//! 1. Schema registry with the built-in topic schemas
//! 2. Stream resolver from the configured deployment mode
//! 3. Event publisher over the broker
//! 4. Topic registry (frozen before any consumer starts)
//! 5. Webhook ingress forwarding to the publisher

pub mod config;

pub use config::{ConfigError, ConsumerSettings, HttpSettings, RuntimeConfig, WebhookSettings};

use crate::handlers::{register_builtin_schemas, SchemaBackedHandler, BUILTIN_SCHEMAS};
use anyhow::{Context, Result};
use ev_01_schema_validation::SchemaRegistry;
use ev_02_event_publisher::EventPublisher;
use ev_05_durable_consumer::TopicRegistry;
use ev_06_webhook_ingress::WebhookIngress;
use shared_bus::{StreamBroker, StreamResolver};
use shared_types::Topic;
use std::sync::Arc;
use tracing::info;

/// Every long-lived component of the event core.
pub struct EventCore {
    pub config: RuntimeConfig,
    pub broker: Arc<dyn StreamBroker>,
    pub resolver: StreamResolver,
    pub schemas: Arc<SchemaRegistry>,
    pub publisher: Arc<EventPublisher>,
    pub topics: TopicRegistry,
    pub ingress: Arc<WebhookIngress>,
}

impl EventCore {
    /// Build the built-in topics over `broker`.
    pub fn new(config: RuntimeConfig, broker: Arc<dyn StreamBroker>) -> Result<Self> {
        let schemas = Arc::new(SchemaRegistry::new());
        register_builtin_schemas(&schemas).context("Failed to register built-in schemas")?;

        let mut builder = TopicRegistry::builder();
        for (name, _) in BUILTIN_SCHEMAS {
            let topic = Topic::new(name).context("Invalid built-in topic")?;
            builder = builder.register(Arc::new(SchemaBackedHandler::new(
                topic,
                Arc::clone(&schemas),
            )))?;
        }

        Ok(Self::with_topics(config, broker, schemas, builder.build()))
    }

    /// Build around a caller-provided topic registry and schemas.
    pub fn with_topics(
        config: RuntimeConfig,
        broker: Arc<dyn StreamBroker>,
        schemas: Arc<SchemaRegistry>,
        topics: TopicRegistry,
    ) -> Self {
        let resolver = StreamResolver::new(config.streams.clone());
        let publisher = Arc::new(EventPublisher::new(
            Arc::clone(&broker),
            schemas.clone(),
            resolver.clone(),
        ));
        let ingress = Arc::new(WebhookIngress::new(
            config.webhook_config(),
            publisher.clone(),
        ));

        info!(
            topics = topics.len(),
            streams = ?resolver.candidate_streams(),
            "Event core components created"
        );

        Self {
            config,
            broker,
            resolver,
            schemas,
            publisher,
            topics,
            ingress,
        }
    }
}
