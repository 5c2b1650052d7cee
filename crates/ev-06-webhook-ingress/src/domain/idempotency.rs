//! Idempotency Cache
//!
//! A live key means the webhook body was already forwarded and must not be
//! forwarded again. Keys come from the origin's delivery id when it sends
//! one, otherwise from a hash of the secret and the raw body.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use shared_bus::TtlStore;
use stream_telemetry::WEBHOOK_IDEMPOTENCY_EVICTIONS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const DELIVERY_ID_HEADER: &str = "x-delivery-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupeOutcome {
    pub is_duplicate: bool,
}

#[derive(Clone)]
pub struct IdempotencyCache {
    store: Arc<TtlStore>,
}

impl IdempotencyCache {
    pub fn new(store: Arc<TtlStore>) -> Self {
        Self { store }
    }

    /// Derive the dedupe key for a delivery.
    #[must_use]
    pub fn key_for(headers: &HeaderMap, secret: &[u8], body: &[u8]) -> String {
        let explicit = [IDEMPOTENCY_KEY_HEADER, DELIVERY_ID_HEADER]
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .map(str::trim)
            .find(|value| !value.is_empty());
        if let Some(key) = explicit {
            return format!("id:{key}");
        }

        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(body);
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }

    /// Record `key`; a live entry makes this delivery a duplicate.
    ///
    /// Evicting a live key to make room weakens the at-most-once guarantee
    /// for that key, so it is counted.
    pub fn dedupe(&self, key: &str) -> DedupeOutcome {
        let recorded = self.store.record(key);
        if recorded.evicted_live {
            WEBHOOK_IDEMPOTENCY_EVICTIONS.inc();
        }
        DedupeOutcome {
            is_duplicate: !recorded.inserted,
        }
    }

    /// Live keys evicted at capacity since startup.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.store.evicted()
    }

    /// Forget `key` so a retried delivery is processed again.
    pub fn release(&self, key: &str) {
        self.store.remove(key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn spawn_sweeper(&self, interval: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.store.spawn_sweeper(interval, shutdown)
    }
}
