//! Consumer configuration

use crate::error::{ConsumerError, ConsumerResult};
use ev_03_dead_letter::RetryPolicy;
use ev_04_concurrency_governor::GovernorConfig;
use serde::{Deserialize, Serialize};
use shared_bus::{AckPolicy, ConsumerDescriptor, DeliverPolicy};
use shared_types::Topic;
use std::time::Duration;

/// Whether this process creates the durable or expects it to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerLifecycle {
    /// Create the durable; "already exists" with the same config is fine.
    #[default]
    Owned,
    /// The durable is provisioned externally; only look it up.
    External,
}

/// Settings for one topic's durable consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    /// Durable name; defaults to the topic with dots replaced by dashes
    /// plus `-consumer`.
    pub durable_name: Option<String>,
    pub lifecycle: ConsumerLifecycle,
    pub deliver_policy: DeliverPolicy,
    pub max_deliver: u32,
    pub ack_wait: Duration,
    pub max_ack_pending: usize,
    pub batch: usize,
    pub expires: Duration,
    pub retry_delay: Duration,
    pub idle_backoff: Duration,
    pub pull_error_backoff: Duration,
    pub dlq_subject_prefix: Option<String>,
    pub governor: GovernorConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            durable_name: None,
            lifecycle: ConsumerLifecycle::Owned,
            deliver_policy: DeliverPolicy::All,
            max_deliver: 5,
            ack_wait: Duration::from_secs(30),
            max_ack_pending: 256,
            batch: 10,
            expires: Duration::from_secs(5),
            retry_delay: ev_03_dead_letter::DEFAULT_RETRY_DELAY,
            idle_backoff: Duration::from_secs(1),
            pull_error_backoff: Duration::from_secs(2),
            dlq_subject_prefix: None,
            governor: GovernorConfig::default(),
        }
    }
}

impl ConsumerConfig {
    #[must_use]
    pub fn durable_for(&self, topic: &Topic) -> String {
        self.durable_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| topic.default_durable_name())
    }

    /// Broker-side descriptor for `topic`.
    #[must_use]
    pub fn descriptor(&self, topic: &Topic) -> ConsumerDescriptor {
        ConsumerDescriptor {
            durable_name: self.durable_for(topic),
            filter_subject: topic.subject().to_string(),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: self.deliver_policy,
            max_deliver: self.max_deliver,
            ack_wait: self.ack_wait,
            max_ack_pending: self.max_ack_pending,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_deliver: self.max_deliver,
            retry_delay: self.retry_delay,
        }
    }

    pub fn validate(&self, topic: &Topic) -> ConsumerResult<()> {
        let invalid = |reason: &str| {
            Err(ConsumerError::InvalidConfig {
                topic: topic.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.max_deliver == 0 {
            return invalid("max_deliver must be at least 1");
        }
        if self.batch == 0 {
            return invalid("batch must be at least 1");
        }
        if self.max_ack_pending == 0 {
            return invalid("max_ack_pending must be at least 1");
        }
        if self.ack_wait.is_zero() || self.expires.is_zero() {
            return invalid("ack_wait and expires must be positive");
        }
        Ok(())
    }
}
