//! Starts one durable consumer per registered topic.

use crate::domain::{ConsumerConfig, ConsumerStatus, TopicRegistry};
use crate::error::ConsumerResult;
use crate::ports::ConsumerStatusQuery;
use crate::service::DurableConsumer;
use ev_03_dead_letter::DeadLetterRouter;
use parking_lot::Mutex;
use shared_bus::{StreamBroker, StreamResolver};
use shared_types::Topic;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The running consumers of a process.
pub struct ConsumerSet {
    consumers: Vec<Arc<DurableConsumer>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConsumerSet {
    /// Bind every topic's durable, then start the pull loops.
    ///
    /// Nothing is started unless every consumer binds; a topic with no
    /// usable stream candidate fails the whole start.
    pub async fn start<F>(
        registry: &TopicRegistry,
        broker: Arc<dyn StreamBroker>,
        resolver: &StreamResolver,
        config_for: F,
        shutdown: watch::Receiver<bool>,
    ) -> ConsumerResult<Self>
    where
        F: Fn(&Topic) -> ConsumerConfig,
    {
        let mut bound = Vec::with_capacity(registry.len());
        for handler in registry.handlers() {
            let config = config_for(handler.topic());
            let router = Arc::new(DeadLetterRouter::new(
                Arc::clone(&broker),
                config.dlq_subject_prefix.clone(),
            ));
            let consumer = Arc::new(DurableConsumer::new(
                Arc::clone(handler),
                Arc::clone(&broker),
                resolver.clone(),
                router,
                config,
            )?);
            let stream = consumer.bind().await?;
            bound.push((consumer, stream));
        }

        let mut consumers = Vec::with_capacity(bound.len());
        let mut tasks = Vec::with_capacity(bound.len());
        for (consumer, stream) in bound {
            tasks.push(consumer.spawn(stream, shutdown.clone())?);
            consumers.push(consumer);
        }
        info!(consumers = consumers.len(), "Durable consumers started");

        Ok(Self {
            consumers,
            tasks: Mutex::new(tasks),
        })
    }

    #[must_use]
    pub fn consumers(&self) -> &[Arc<DurableConsumer>] {
        &self.consumers
    }

    #[must_use]
    pub fn get(&self, topic: &Topic) -> Option<&Arc<DurableConsumer>> {
        self.consumers.iter().find(|c| c.topic() == topic)
    }

    /// Wait for every pull loop to finish after shutdown was signalled.
    pub async fn join(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Pull loop task failed");
            }
        }
    }
}

impl ConsumerStatusQuery for ConsumerSet {
    fn statuses(&self) -> Vec<ConsumerStatus> {
        self.consumers.iter().map(|c| c.status()).collect()
    }
}
