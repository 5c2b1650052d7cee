//! Consumer counters and status snapshot

use serde::Serialize;
use shared_types::DeadLetterReason;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of one consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConsumerState {
    Connecting,
    Bound { stream: String },
    Stopped,
    Failed { reason: String },
}

impl ConsumerState {
    #[must_use]
    pub fn stream(&self) -> Option<&str> {
        match self {
            ConsumerState::Bound { stream } => Some(stream),
            _ => None,
        }
    }
}

/// Owned per-consumer counters.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    delivered: AtomicU64,
    acked: AtomicU64,
    redeliveries: AtomicU64,
    naks: AtomicU64,
    dead_schema_invalid: AtomicU64,
    dead_non_retryable: AtomicU64,
    dead_max_deliver: AtomicU64,
    dropped: AtomicU64,
    deferred: AtomicU64,
    pull_errors: AtomicU64,
}

impl ConsumerStats {
    pub(crate) fn record_delivery(&self, redelivery: bool) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if redelivery {
            self.redeliveries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_ack(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_nak(&self) {
        self.naks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_letter(&self, reason: DeadLetterReason) {
        let counter = match reason {
            DeadLetterReason::SchemaInvalid => &self.dead_schema_invalid,
            DeadLetterReason::NonRetryable => &self.dead_non_retryable,
            DeadLetterReason::MaxDeliver => &self.dead_max_deliver,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pull_error(&self) {
        self.pull_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ConsumerStatsSnapshot {
            delivered: load(&self.delivered),
            acked: load(&self.acked),
            redeliveries: load(&self.redeliveries),
            naks: load(&self.naks),
            dead_lettered_schema_invalid: load(&self.dead_schema_invalid),
            dead_lettered_non_retryable: load(&self.dead_non_retryable),
            dead_lettered_max_deliver: load(&self.dead_max_deliver),
            dropped: load(&self.dropped),
            deferred: load(&self.deferred),
            pull_errors: load(&self.pull_errors),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub delivered: u64,
    pub acked: u64,
    pub redeliveries: u64,
    pub naks: u64,
    pub dead_lettered_schema_invalid: u64,
    pub dead_lettered_non_retryable: u64,
    pub dead_lettered_max_deliver: u64,
    pub dropped: u64,
    pub deferred: u64,
    pub pull_errors: u64,
}

impl ConsumerStatsSnapshot {
    #[must_use]
    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered_schema_invalid
            + self.dead_lettered_non_retryable
            + self.dead_lettered_max_deliver
    }
}

/// What `GET /status` reports per topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerStatus {
    pub topic: String,
    pub durable_name: String,
    #[serde(flatten)]
    pub state: ConsumerState,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub stats: ConsumerStatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = ConsumerStats::default();
        stats.record_delivery(false);
        stats.record_delivery(true);
        stats.record_ack();
        stats.record_dead_letter(DeadLetterReason::MaxDeliver);
        stats.record_dead_letter(DeadLetterReason::SchemaInvalid);

        let snap = stats.snapshot();
        assert_eq!(snap.delivered, 2);
        assert_eq!(snap.redeliveries, 1);
        assert_eq!(snap.acked, 1);
        assert_eq!(snap.dead_lettered(), 2);
    }

    #[test]
    fn test_status_serializes_flat_state() {
        let status = ConsumerStatus {
            topic: "domain.hrv.raw-received".into(),
            durable_name: "domain-hrv-raw-received-consumer".into(),
            state: ConsumerState::Bound {
                stream: "DOMAIN_EVENTS".into(),
            },
            in_flight: 0,
            max_concurrent: 8,
            stats: ConsumerStatsSnapshot::default(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "bound");
        assert_eq!(json["stream"], "DOMAIN_EVENTS");
        assert_eq!(json["max_concurrent"], 8);
    }
}
