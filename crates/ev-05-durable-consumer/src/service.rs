//! Durable Consumer Service
//!
//! One pull loop per topic. Each delivery ends in exactly one of ack, nak
//! or dead-letter followed by a terminal ack.

use crate::domain::{ConsumerConfig, ConsumerLifecycle, ConsumerState, ConsumerStats, ConsumerStatus};
use crate::error::{BindAttempt, ConsumerError, ConsumerResult};
use crate::ports::TopicHandler;
use ev_03_dead_letter::{decide, precheck, DeadLetterRouting, Disposition, HandlerOutcome, RetryPolicy};
use ev_04_concurrency_governor::{
    Admission, ConcurrencyGovernor, GovernorResult, SaturationPolicy, SlotGuard,
};
use parking_lot::RwLock;
use shared_bus::{DeliveredMessage, FetchRequest, StreamBroker, StreamResolver};
use shared_types::{DeadLetterReason, EventEnvelope, HandlerError, Topic};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stream_telemetry::{
    consume_span, log_delivery, record_span_outcome, EVENT_CONSUME_TOTAL, EVENT_HANDLER_DURATION,
    EVENT_REDELIVERIES, EVENT_SCHEMA_VALIDATIONS,
};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Republish attempts before a dead-letter failure falls back to a nak.
const DEAD_LETTER_ATTEMPTS: u32 = 3;
const DEAD_LETTER_BACKOFF: Duration = Duration::from_millis(250);
const DEAD_LETTER_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How a delivery was finally left with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Acked,
    AckFailed,
    Naked,
    DeadLettered,
    DeadLetterFailed,
}

impl Settled {
    fn label(self) -> &'static str {
        match self {
            Self::Acked => "acked",
            Self::AckFailed => "ack_failed",
            Self::Naked => "nak",
            Self::DeadLettered => "dead_lettered",
            Self::DeadLetterFailed => "dead_letter_failed",
        }
    }

    /// A nak is a scheduled retry, not a failure of this span.
    fn span_ok(self) -> bool {
        matches!(self, Self::Acked | Self::Naked)
    }
}

pub struct DurableConsumer {
    topic: Topic,
    durable: String,
    handler: Arc<dyn TopicHandler>,
    broker: Arc<dyn StreamBroker>,
    resolver: StreamResolver,
    router: Arc<dyn DeadLetterRouting>,
    governor: ConcurrencyGovernor,
    config: ConsumerConfig,
    policy: RetryPolicy,
    stats: ConsumerStats,
    state: RwLock<ConsumerState>,
    started: AtomicBool,
}

impl DurableConsumer {
    pub fn new(
        handler: Arc<dyn TopicHandler>,
        broker: Arc<dyn StreamBroker>,
        resolver: StreamResolver,
        router: Arc<dyn DeadLetterRouting>,
        config: ConsumerConfig,
    ) -> ConsumerResult<Self> {
        let topic = handler.topic().clone();
        config.validate(&topic)?;
        let governor = ConcurrencyGovernor::new(&topic, config.governor)?;
        Ok(Self {
            durable: config.durable_for(&topic),
            policy: config.retry_policy(),
            topic,
            handler,
            broker,
            resolver,
            router,
            governor,
            config,
            stats: ConsumerStats::default(),
            state: RwLock::new(ConsumerState::Connecting),
            started: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn durable_name(&self) -> &str {
        &self.durable
    }

    #[must_use]
    pub fn state(&self) -> ConsumerState {
        self.state.read().clone()
    }

    #[must_use]
    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    #[must_use]
    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    #[must_use]
    pub fn status(&self) -> ConsumerStatus {
        ConsumerStatus {
            topic: self.topic.to_string(),
            durable_name: self.durable.clone(),
            state: self.state(),
            in_flight: self.governor.in_flight(),
            max_concurrent: self.governor.config().max_concurrent,
            stats: self.stats.snapshot(),
        }
    }

    /// Bind the durable to the first usable candidate stream.
    ///
    /// Owned consumers create the durable (an identical existing one counts
    /// as success); external consumers only look it up.
    pub async fn bind(&self) -> ConsumerResult<String> {
        *self.state.write() = ConsumerState::Connecting;
        let descriptor = self.config.descriptor(&self.topic);
        let mut attempts = Vec::new();

        for stream in self.resolver.candidate_streams() {
            let result = match self.config.lifecycle {
                ConsumerLifecycle::Owned => self.broker.create_consumer(&stream, &descriptor).await,
                ConsumerLifecycle::External => {
                    self.broker.consumer_info(&stream, &self.durable).await
                }
            };
            match result {
                Ok(info) => {
                    info!(
                        topic = %self.topic,
                        stream = %stream,
                        durable = %self.durable,
                        created = info.created,
                        num_pending = info.num_pending,
                        "Durable consumer bound"
                    );
                    *self.state.write() = ConsumerState::Bound {
                        stream: stream.clone(),
                    };
                    return Ok(stream);
                }
                Err(error) => {
                    debug!(topic = %self.topic, stream = %stream, error = %error, "Stream candidate unusable");
                    attempts.push(BindAttempt { stream, error });
                }
            }
        }

        let err = ConsumerError::NoStreamCandidate {
            durable: self.durable.clone(),
            attempts,
        };
        error!(topic = %self.topic, error = %err, "Durable consumer could not bind");
        *self.state.write() = ConsumerState::Failed {
            reason: err.to_string(),
        };
        Err(err)
    }

    /// Start the pull loop on a bound stream. A consumer runs at most once.
    pub fn spawn(
        self: &Arc<Self>,
        stream: String,
        shutdown: watch::Receiver<bool>,
    ) -> ConsumerResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConsumerError::AlreadyStarted {
                topic: self.topic.to_string(),
            });
        }
        Ok(tokio::spawn(Arc::clone(self).run(stream, shutdown)))
    }

    async fn run(self: Arc<Self>, stream: String, mut shutdown: watch::Receiver<bool>) {
        let request = FetchRequest {
            batch: self.config.batch,
            expires: self.config.expires,
        };
        info!(topic = %self.topic, stream = %stream, durable = %self.durable, "Pull loop started");

        while !*shutdown.borrow() {
            match self.broker.fetch(&stream, &self.durable, request).await {
                Ok(batch) if batch.is_empty() => {
                    if sleep_or_shutdown(self.config.idle_backoff, &mut shutdown).await {
                        break;
                    }
                }
                Ok(batch) => self.process_batch(batch, &shutdown).await,
                Err(e) => {
                    self.stats.record_pull_error();
                    warn!(
                        topic = %self.topic,
                        stream = %stream,
                        error = %e,
                        backoff_ms = self.config.pull_error_backoff.as_millis() as u64,
                        "Pull failed"
                    );
                    if sleep_or_shutdown(self.config.pull_error_backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        *self.state.write() = ConsumerState::Stopped;
        info!(topic = %self.topic, durable = %self.durable, "Pull loop stopped");
    }

    async fn process_batch(
        self: &Arc<Self>,
        batch: Vec<DeliveredMessage>,
        shutdown: &watch::Receiver<bool>,
    ) {
        let pulled_at = Instant::now();
        let progress_after = pulled_at + self.config.ack_wait / 2;
        let start_deadline = pulled_at + self.config.expires;

        for message in &batch {
            let redelivery = message.info.is_redelivery();
            self.stats.record_delivery(redelivery);
            if redelivery {
                EVENT_REDELIVERIES
                    .with_label_values(&[self.topic.as_str()])
                    .inc();
            }
        }

        let mut tasks = JoinSet::new();
        let mut released = 0usize;
        for message in batch {
            let final_delivery = self.policy.is_final_delivery(message.info.delivery_count);

            // A final delivery handed back would never come again.
            if !final_delivery && Instant::now() >= start_deadline {
                self.release(&message).await;
                released += 1;
                continue;
            }

            if let Some(disposition) = precheck(message.info.delivery_count, &self.policy) {
                log_delivery!(
                    warn,
                    self.topic,
                    message.info,
                    "Delivered past max_deliver, skipping handler",
                    max_deliver = self.policy.max_deliver
                );
                let span = consume_span(&message.subject, &message.info, &message.headers);
                self.settle(&message, disposition, &mut shutdown.clone())
                    .instrument(span)
                    .await;
                continue;
            }

            let must_start =
                final_delivery && self.governor.config().saturation != SaturationPolicy::Shed;
            let admission = if must_start {
                self.hold_for_slot(&message).await.map(Admission::Admitted)
            } else {
                self.governor.admit().await
            };

            match admission {
                Ok(Admission::Admitted(slot)) => {
                    if Instant::now() >= progress_after {
                        self.signal_progress(&message).await;
                    }
                    tasks.spawn(Arc::clone(self).handle(message, slot, shutdown.clone()));
                }
                Ok(Admission::Deferred) => {
                    self.stats.record_deferred();
                    self.nak(&message, Some(self.policy.retry_delay)).await;
                    self.count_outcome("deferred");
                }
                Ok(Admission::Shed) => {
                    self.stats.record_dropped();
                    if let Err(e) = message.ack().await {
                        log_delivery!(warn, self.topic, message.info, "Ack of shed message failed", error = %e);
                    }
                    self.count_outcome("shed");
                }
                Err(e) if final_delivery => {
                    log_delivery!(
                        error,
                        self.topic,
                        message.info,
                        "Handler slot unavailable on final delivery, dead-lettering",
                        error = %e
                    );
                    let span = consume_span(&message.subject, &message.info, &message.headers);
                    let disposition = Disposition::DeadLetter {
                        reason: DeadLetterReason::MaxDeliver,
                    };
                    self.settle(&message, disposition, &mut shutdown.clone())
                        .instrument(span)
                        .await;
                }
                Err(e) => {
                    error!(topic = %self.topic, error = %e, "Handler slot unavailable");
                    self.release(&message).await;
                }
            }
        }

        if released > 0 {
            warn!(
                topic = %self.topic,
                released,
                "Pull expired before the batch was started, released unstarted messages"
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(topic = %self.topic, error = %e, "Message task failed");
            }
        }
    }

    /// Wait for a handler slot, keeping the delivery alive on the broker
    /// while waiting.
    async fn hold_for_slot(&self, message: &DeliveredMessage) -> GovernorResult<SlotGuard> {
        if let Some(slot) = self.governor.try_acquire() {
            return Ok(slot);
        }
        log_delivery!(debug, self.topic, message.info, "Final delivery waiting for handler slot");
        loop {
            match tokio::time::timeout(self.config.ack_wait / 2, self.governor.acquire()).await {
                Ok(slot) => return slot,
                Err(_) => self.signal_progress(message).await,
            }
        }
    }

    async fn handle(
        self: Arc<Self>,
        message: DeliveredMessage,
        slot: SlotGuard,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let span = consume_span(&message.subject, &message.info, &message.headers);
        async {
            let disposition = self.evaluate(&message).await;
            drop(slot);
            self.settle(&message, disposition, &mut shutdown).await;
        }
        .instrument(span)
        .await;
    }

    async fn evaluate(&self, message: &DeliveredMessage) -> Disposition {
        let count = message.info.delivery_count;

        let envelope = match EventEnvelope::from_slice(&message.payload) {
            Ok(envelope) if envelope.topic == self.topic.as_str() => envelope,
            Ok(envelope) => {
                log_delivery!(
                    warn,
                    self.topic,
                    message.info,
                    "Envelope topic does not match subject",
                    envelope_topic = %envelope.topic
                );
                return decide(HandlerOutcome::SchemaInvalid, count, &self.policy);
            }
            Err(e) => {
                log_delivery!(warn, self.topic, message.info, "Undecodable payload", error = %e);
                return decide(HandlerOutcome::SchemaInvalid, count, &self.policy);
            }
        };

        let validation = self.handler.validate(&envelope.payload);
        EVENT_SCHEMA_VALIDATIONS
            .with_label_values(&[self.topic.as_str(), if validation.valid { "valid" } else { "invalid" }])
            .inc();
        if !validation.valid {
            log_delivery!(
                warn,
                self.topic,
                message.info,
                "Payload failed schema validation",
                event_id = %envelope.event_id,
                errors = %validation.summary()
            );
            return decide(HandlerOutcome::SchemaInvalid, count, &self.policy);
        }

        let event_id = envelope.event_id.clone();
        let handler = Arc::clone(&self.handler);
        let started = std::time::Instant::now();
        let result = tokio::spawn(async move { handler.process(&envelope).await }.in_current_span())
            .await
            .unwrap_or_else(|join_error| {
                Err(HandlerError::Unclassified(format!(
                    "handler task failed: {join_error}"
                )))
            });

        let label = result.as_ref().err().map_or("success", HandlerError::kind);
        EVENT_HANDLER_DURATION
            .with_label_values(&[self.topic.as_str(), label])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => decide(HandlerOutcome::Success, count, &self.policy),
            Err(err) => {
                log_delivery!(
                    warn,
                    self.topic,
                    message.info,
                    "Handler failed",
                    event_id = %event_id,
                    kind = err.kind(),
                    error = %err
                );
                decide(HandlerOutcome::Failed(err), count, &self.policy)
            }
        }
    }

    async fn settle(
        &self,
        message: &DeliveredMessage,
        disposition: Disposition,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let settled = match disposition {
            Disposition::Ack => match message.ack().await {
                Ok(()) => {
                    self.stats.record_ack();
                    log_delivery!(debug, self.topic, message.info, "Message acked");
                    Settled::Acked
                }
                Err(e) => {
                    log_delivery!(warn, self.topic, message.info, "Ack failed", error = %e);
                    Settled::AckFailed
                }
            },
            Disposition::Nak { delay } => {
                self.nak(message, Some(delay)).await;
                log_delivery!(
                    info,
                    self.topic,
                    message.info,
                    "Retryable failure, redelivery scheduled",
                    delay_ms = delay.as_millis() as u64
                );
                Settled::Naked
            }
            Disposition::DeadLetter { reason } => self.dead_letter(message, reason, shutdown).await,
        };

        self.count_outcome(settled.label());
        record_span_outcome(&tracing::Span::current(), settled.span_ok());
    }

    /// Republish to the dead-letter subject, then terminate the original.
    ///
    /// A failed republish is retried in place. When the broker still has
    /// deliveries left the message is nak'ed after [`DEAD_LETTER_ATTEMPTS`];
    /// on the final delivery it is held with progress signals until the
    /// republish succeeds or shutdown.
    async fn dead_letter(
        &self,
        message: &DeliveredMessage,
        reason: DeadLetterReason,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Settled {
        let final_delivery = self.policy.is_final_delivery(message.info.delivery_count);
        let max_backoff = (self.config.ack_wait / 2).min(DEAD_LETTER_MAX_BACKOFF);
        let mut backoff = DEAD_LETTER_BACKOFF.min(max_backoff);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match self.router.route(message, reason).await {
                Ok(_) => {
                    if let Err(e) = message.term().await {
                        log_delivery!(warn, self.topic, message.info, "Terminal ack failed", error = %e);
                    }
                    self.stats.record_dead_letter(reason);
                    return Settled::DeadLettered;
                }
                Err(e) => e,
            };

            log_delivery!(
                error,
                self.topic,
                message.info,
                "Dead-letter republish failed",
                reason = %reason,
                attempt,
                final_delivery,
                error = %error
            );

            if !final_delivery && attempt >= DEAD_LETTER_ATTEMPTS {
                self.nak(message, Some(self.policy.retry_delay)).await;
                return Settled::DeadLetterFailed;
            }
            if final_delivery {
                self.signal_progress(message).await;
            }
            if sleep_or_shutdown(backoff, shutdown).await {
                if final_delivery {
                    log_delivery!(
                        error,
                        self.topic,
                        message.info,
                        "Shutdown before dead-letter succeeded, final delivery left unacked",
                        reason = %reason
                    );
                } else {
                    self.nak(message, Some(self.policy.retry_delay)).await;
                }
                return Settled::DeadLetterFailed;
            }
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    /// Hand an unstarted message back without delay.
    async fn release(&self, message: &DeliveredMessage) {
        self.nak(message, None).await;
        self.count_outcome("released");
    }

    async fn nak(&self, message: &DeliveredMessage, delay: Option<Duration>) {
        self.stats.record_nak();
        if let Err(e) = message.nak(delay).await {
            log_delivery!(warn, self.topic, message.info, "Nak failed", error = %e);
        }
    }

    async fn signal_progress(&self, message: &DeliveredMessage) {
        if let Err(e) = message.in_progress().await {
            log_delivery!(debug, self.topic, message.info, "Progress signal failed", error = %e);
        }
    }

    fn count_outcome(&self, outcome: &str) {
        EVENT_CONSUME_TOTAL
            .with_label_values(&[self.topic.as_str(), outcome])
            .inc();
    }
}

/// Sleep, returning early with `true` when shutdown is signalled or the
/// sender is gone.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
