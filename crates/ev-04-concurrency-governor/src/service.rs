//! Concurrency Governor Service

use crate::domain::{GovernorConfig, SaturationPolicy};
use crate::error::{GovernorError, GovernorResult};
use prometheus::IntGauge;
use shared_types::Topic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stream_telemetry::{EVENT_CAPACITY_EXCEEDED, EVENT_HANDLERS_IN_FLIGHT};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Result of asking for a slot under the configured saturation policy.
#[derive(Debug)]
pub enum Admission {
    Admitted(SlotGuard),
    /// No slot; the delivery should be nak'ed for later.
    Deferred,
    /// No slot; the delivery is dropped.
    Shed,
}

struct Slots {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    gauge: IntGauge,
}

impl Slots {
    fn occupy(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.gauge.inc();
    }

    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.gauge.dec();
    }
}

/// An occupied handler slot. Dropping it frees the slot.
pub struct SlotGuard {
    slots: Arc<Slots>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.release();
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard")
            .field("limited", &self.permit.is_some())
            .finish()
    }
}

/// Bounds how many handlers run at once for one topic.
pub struct ConcurrencyGovernor {
    topic: Topic,
    config: GovernorConfig,
    semaphore: Arc<Semaphore>,
    slots: Arc<Slots>,
}

impl ConcurrencyGovernor {
    pub fn new(topic: &Topic, config: GovernorConfig) -> GovernorResult<Self> {
        if config.enable_concurrency_control && config.max_concurrent == 0 {
            return Err(GovernorError::InvalidLimit {
                topic: topic.to_string(),
            });
        }
        Ok(Self {
            topic: topic.clone(),
            config,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            slots: Arc::new(Slots {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                gauge: EVENT_HANDLERS_IN_FLIGHT.with_label_values(&[topic.as_str()]),
            }),
        })
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Handlers currently holding a slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.in_flight.load(Ordering::SeqCst)
    }

    /// Highest simultaneous in-flight count seen so far.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.slots.peak.load(Ordering::SeqCst)
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> GovernorResult<SlotGuard> {
        if !self.config.enable_concurrency_control {
            return Ok(self.occupy(None));
        }
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GovernorError::Closed {
                topic: self.topic.to_string(),
            })?;
        Ok(self.occupy(Some(permit)))
    }

    /// Take a slot only if one is free right now.
    #[must_use]
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        if !self.config.enable_concurrency_control {
            return Some(self.occupy(None));
        }
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.occupy(Some(permit)))
    }

    /// Ask for a slot, applying the saturation policy when none is free.
    pub async fn admit(&self) -> GovernorResult<Admission> {
        if let Some(guard) = self.try_acquire() {
            return Ok(Admission::Admitted(guard));
        }
        match self.config.saturation {
            SaturationPolicy::Block => {
                debug!(topic = %self.topic, in_flight = self.in_flight(), "Waiting for handler slot");
                self.acquire().await.map(Admission::Admitted)
            }
            SaturationPolicy::Defer => {
                debug!(topic = %self.topic, in_flight = self.in_flight(), "No handler slot, deferring");
                Ok(Admission::Deferred)
            }
            SaturationPolicy::Shed => {
                EVENT_CAPACITY_EXCEEDED
                    .with_label_values(&[self.topic.as_str()])
                    .inc();
                warn!(
                    topic = %self.topic,
                    in_flight = self.in_flight(),
                    max_concurrent = self.config.max_concurrent,
                    "Handler capacity exceeded, dropping message"
                );
                Ok(Admission::Shed)
            }
        }
    }

    /// Wake blocked waiters with [`GovernorError::Closed`]; later
    /// `acquire` calls fail too. Held slots are unaffected.
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn occupy(&self, permit: Option<OwnedSemaphorePermit>) -> SlotGuard {
        self.slots.occupy();
        SlotGuard {
            slots: Arc::clone(&self.slots),
            permit,
        }
    }
}
