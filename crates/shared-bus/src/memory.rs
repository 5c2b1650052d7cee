//! # In-Memory Stream Broker
//!
//! Single-process implementation of [`StreamBroker`] with durable-consumer
//! semantics: per-consumer cursors, explicit acknowledgement, ack-wait and
//! nak-delay redelivery, `max_deliver` exhaustion, `max_ack_pending` flow
//! control and `msg-id` duplicate suppression. Duplicates are detected per
//! subject, so a dead-letter republish carrying the original headers is
//! stored even though it shares the original `msg-id`.
//!
//! Time is read from `tokio::time`, so tests running with a paused clock
//! see redelivery delays elapse instantly.

use crate::broker::{
    AckHandle, AckKind, BrokerError, BrokerResult, ConsumerDescriptor, ConsumerInfo,
    DeliverPolicy, DeliveredMessage, FetchRequest, PublishAck, StreamBroker, StreamInfo,
    StreamSpec, patterns_overlap,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use shared_types::{subject_matches, DeliveryInfo, Headers, Subject, HEADER_MSG_ID};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A message as stored in a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Stream sequence, starting at 1.
    pub sequence: u64,
    /// Subject it was published under.
    pub subject: Subject,
    /// Published headers.
    pub headers: Headers,
    /// Published payload.
    pub payload: Bytes,
}

struct PendingDelivery {
    delivery_count: u32,
    delivery_seq: u64,
    redeliver_at: Instant,
}

struct ConsumerState {
    config: ConsumerDescriptor,
    /// Next stream sequence considered for first delivery.
    cursor: u64,
    delivery_seq: u64,
    pending: BTreeMap<u64, PendingDelivery>,
    num_redelivered: u64,
}

struct StreamState {
    spec: StreamSpec,
    messages: Vec<StoredMessage>,
    /// `(subject, msg-id)` seen inside the duplicate window.
    recent_ids: HashMap<(Subject, String), (u64, Instant)>,
    consumers: HashMap<String, ConsumerState>,
}

impl StreamState {
    fn info(&self, created: bool) -> StreamInfo {
        StreamInfo {
            spec: self.spec.clone(),
            messages: self.messages.len() as u64,
            last_sequence: self.messages.last().map_or(0, |m| m.sequence),
            created,
        }
    }

    fn consumer_info(&self, durable: &str, created: bool) -> BrokerResult<ConsumerInfo> {
        let consumer = self
            .consumers
            .get(durable)
            .ok_or_else(|| BrokerError::ConsumerNotFound {
                stream: self.spec.name.clone(),
                durable: durable.to_string(),
            })?;

        let num_pending = self
            .messages
            .iter()
            .filter(|m| m.sequence >= consumer.cursor)
            .filter(|m| subject_matches(&consumer.config.filter_subject, m.subject.as_str()))
            .count() as u64;

        Ok(ConsumerInfo {
            stream: self.spec.name.clone(),
            config: consumer.config.clone(),
            created,
            num_pending,
            num_ack_pending: consumer.pending.len(),
            num_redelivered: consumer.num_redelivered,
        })
    }
}

struct Inner {
    streams: Mutex<HashMap<String, StreamState>>,
    notify: Notify,
    publish_failures: AtomicU32,
    fetch_failures: AtomicU32,
}

/// In-memory durable stream broker.
///
/// Cheap to clone; clones share the same streams.
#[derive(Clone)]
pub struct InMemoryStreamBroker {
    inner: Arc<Inner>,
}

impl InMemoryStreamBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                streams: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                publish_failures: AtomicU32::new(0),
                fetch_failures: AtomicU32::new(0),
            }),
        }
    }

    /// Make the next `count` publishes fail with `Unavailable`.
    pub fn inject_publish_failures(&self, count: u32) {
        self.inner.publish_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` fetches fail with `Unavailable`.
    pub fn inject_fetch_failures(&self, count: u32) {
        self.inner.fetch_failures.store(count, Ordering::SeqCst);
    }

    /// All messages stored in a stream, in sequence order.
    #[must_use]
    pub fn messages(&self, stream: &str) -> Vec<StoredMessage> {
        self.inner
            .streams
            .lock()
            .get(stream)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Messages published under exactly `subject`, across all streams.
    #[must_use]
    pub fn messages_for_subject(&self, subject: &str) -> Vec<StoredMessage> {
        let streams = self.inner.streams.lock();
        let mut found: Vec<StoredMessage> = streams
            .values()
            .flat_map(|s| s.messages.iter())
            .filter(|m| m.subject.as_str() == subject)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.sequence);
        found
    }

    /// Names of every stream.
    #[must_use]
    pub fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.streams.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Deliveries awaiting acknowledgement on a durable.
    #[must_use]
    pub fn ack_pending(&self, stream: &str, durable: &str) -> usize {
        self.inner
            .streams
            .lock()
            .get(stream)
            .and_then(|s| s.consumers.get(durable))
            .map_or(0, |c| c.pending.len())
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Collect ready deliveries, returning them with the next redelivery time.
    fn collect(
        &self,
        stream: &str,
        durable: &str,
        batch: usize,
        acker: &Arc<dyn AckHandle>,
    ) -> BrokerResult<(Vec<DeliveredMessage>, Option<Instant>)> {
        let now = Instant::now();
        let mut streams = self.inner.streams.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::StreamNotFound {
                stream: stream.to_string(),
            })?;
        let StreamState {
            messages, consumers, ..
        } = state;
        let consumer = consumers
            .get_mut(durable)
            .ok_or_else(|| BrokerError::ConsumerNotFound {
                stream: stream.to_string(),
                durable: durable.to_string(),
            })?;
        let ConsumerState {
            config,
            cursor,
            delivery_seq,
            pending,
            num_redelivered,
        } = consumer;

        let mut out = Vec::new();
        let mut next_wake: Option<Instant> = None;
        let mut exhausted = Vec::new();

        for (&seq, entry) in pending.iter_mut() {
            if entry.redeliver_at > now {
                next_wake = Some(next_wake.map_or(entry.redeliver_at, |t| t.min(entry.redeliver_at)));
                continue;
            }
            if out.len() >= batch {
                continue;
            }
            if config.max_deliver > 0 && entry.delivery_count >= config.max_deliver {
                exhausted.push(seq);
                continue;
            }
            let Some(message) = usize::try_from(seq - 1).ok().and_then(|i| messages.get(i)) else {
                exhausted.push(seq);
                continue;
            };

            *delivery_seq += 1;
            *num_redelivered += 1;
            entry.delivery_count += 1;
            entry.delivery_seq = *delivery_seq;
            entry.redeliver_at = now + config.ack_wait;

            out.push(DeliveredMessage::new(
                message.subject.clone(),
                message.headers.clone(),
                message.payload.clone(),
                DeliveryInfo {
                    stream: stream.to_string(),
                    consumer: durable.to_string(),
                    stream_seq: seq,
                    delivery_seq: *delivery_seq,
                    delivery_count: entry.delivery_count,
                },
                Arc::clone(acker),
            ));
        }

        for seq in exhausted {
            pending.remove(&seq);
            warn!(
                stream = stream,
                consumer = durable,
                stream_seq = seq,
                max_deliver = config.max_deliver,
                "Delivery attempts exhausted, message will not be redelivered"
            );
        }

        while out.len() < batch && pending.len() < config.max_ack_pending {
            let Some(message) = usize::try_from(*cursor - 1)
                .ok()
                .and_then(|i| messages.get(i))
            else {
                break;
            };
            *cursor += 1;
            if !subject_matches(&config.filter_subject, message.subject.as_str()) {
                continue;
            }

            *delivery_seq += 1;
            pending.insert(
                message.sequence,
                PendingDelivery {
                    delivery_count: 1,
                    delivery_seq: *delivery_seq,
                    redeliver_at: now + config.ack_wait,
                },
            );
            out.push(DeliveredMessage::new(
                message.subject.clone(),
                message.headers.clone(),
                message.payload.clone(),
                DeliveryInfo {
                    stream: stream.to_string(),
                    consumer: durable.to_string(),
                    stream_seq: message.sequence,
                    delivery_seq: *delivery_seq,
                    delivery_count: 1,
                },
                Arc::clone(acker),
            ));
        }

        Ok((out, next_wake))
    }

    fn apply_ack(
        &self,
        stream: &str,
        durable: &str,
        info: &DeliveryInfo,
        kind: AckKind,
    ) -> BrokerResult<()> {
        let now = Instant::now();
        let mut streams = self.inner.streams.lock();
        let consumer = streams
            .get_mut(stream)
            .and_then(|s| s.consumers.get_mut(durable))
            .ok_or_else(|| BrokerError::ConsumerNotFound {
                stream: stream.to_string(),
                durable: durable.to_string(),
            })?;
        let ack_wait = consumer.config.ack_wait;

        let not_pending = || BrokerError::AckNotPending {
            stream_seq: info.stream_seq,
            delivery_seq: info.delivery_seq,
        };
        let entry = consumer
            .pending
            .get_mut(&info.stream_seq)
            .filter(|e| e.delivery_seq == info.delivery_seq)
            .ok_or_else(not_pending)?;

        match kind {
            AckKind::Ack | AckKind::Term => {
                consumer.pending.remove(&info.stream_seq);
            }
            AckKind::Nak(delay) => entry.redeliver_at = now + delay.unwrap_or_default(),
            AckKind::InProgress => entry.redeliver_at = now + ack_wait,
        }
        Ok(())
    }
}

impl Default for InMemoryStreamBroker {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryAcker {
    broker: InMemoryStreamBroker,
    stream: String,
    durable: String,
}

#[async_trait]
impl AckHandle for MemoryAcker {
    async fn acknowledge(&self, info: &DeliveryInfo, kind: AckKind) -> BrokerResult<()> {
        self.broker
            .apply_ack(&self.stream, &self.durable, info, kind)?;
        if kind != AckKind::InProgress {
            self.broker.inner.notify.notify_waiters();
        }
        debug!(
            stream = %self.stream,
            consumer = %self.durable,
            stream_seq = info.stream_seq,
            kind = %kind,
            "Acknowledgement applied"
        );
        Ok(())
    }
}

#[async_trait]
impl StreamBroker for InMemoryStreamBroker {
    async fn ensure_stream(&self, spec: &StreamSpec) -> BrokerResult<StreamInfo> {
        if spec.name.is_empty() || spec.subjects.is_empty() {
            return Err(BrokerError::InvalidRequest(
                "stream needs a name and at least one subject".into(),
            ));
        }

        let mut streams = self.inner.streams.lock();
        if let Some(existing) = streams.get(&spec.name) {
            if existing.spec.subjects != spec.subjects {
                return Err(BrokerError::StreamConfigMismatch {
                    stream: spec.name.clone(),
                });
            }
            return Ok(existing.info(false));
        }

        for other in streams.values() {
            let overlaps = spec.subjects.iter().any(|a| {
                other
                    .spec
                    .subjects
                    .iter()
                    .any(|b| patterns_overlap(a, b))
            });
            if overlaps {
                return Err(BrokerError::SubjectOverlap {
                    stream: spec.name.clone(),
                    existing: other.spec.name.clone(),
                });
            }
        }

        let state = StreamState {
            spec: spec.clone(),
            messages: Vec::new(),
            recent_ids: HashMap::new(),
            consumers: HashMap::new(),
        };
        let info = state.info(true);
        streams.insert(spec.name.clone(), state);
        debug!(stream = %spec.name, subjects = ?spec.subjects, "Stream created");
        Ok(info)
    }

    async fn stream_info(&self, stream: &str) -> BrokerResult<StreamInfo> {
        self.inner
            .streams
            .lock()
            .get(stream)
            .map(|s| s.info(false))
            .ok_or_else(|| BrokerError::StreamNotFound {
                stream: stream.to_string(),
            })
    }

    async fn publish(
        &self,
        subject: &Subject,
        headers: Headers,
        payload: Bytes,
    ) -> BrokerResult<PublishAck> {
        if Self::take_failure(&self.inner.publish_failures) {
            return Err(BrokerError::Unavailable("injected publish failure".into()));
        }

        let now = Instant::now();
        let ack = {
            let mut streams = self.inner.streams.lock();
            let state = streams
                .values_mut()
                .find(|s| s.spec.captures(subject.as_str()))
                .ok_or_else(|| BrokerError::NoStreamForSubject {
                    subject: subject.to_string(),
                })?;

            let window = state.spec.duplicate_window;
            state
                .recent_ids
                .retain(|_, (_, seen)| now.saturating_duration_since(*seen) < window);

            let msg_key = headers
                .get(HEADER_MSG_ID)
                .map(|id| (subject.clone(), id.clone()));
            if let Some((sequence, _)) = msg_key.as_ref().and_then(|key| state.recent_ids.get(key)) {
                return Ok(PublishAck {
                    stream: state.spec.name.clone(),
                    sequence: *sequence,
                    duplicate: true,
                });
            }

            let sequence = state.messages.len() as u64 + 1;
            state.messages.push(StoredMessage {
                sequence,
                subject: subject.clone(),
                headers,
                payload,
            });
            if let Some(key) = msg_key {
                state.recent_ids.insert(key, (sequence, now));
            }

            PublishAck {
                stream: state.spec.name.clone(),
                sequence,
                duplicate: false,
            }
        };

        self.inner.notify.notify_waiters();
        Ok(ack)
    }

    async fn create_consumer(
        &self,
        stream: &str,
        descriptor: &ConsumerDescriptor,
    ) -> BrokerResult<ConsumerInfo> {
        if descriptor.durable_name.is_empty() || descriptor.max_ack_pending == 0 {
            return Err(BrokerError::InvalidRequest(
                "durable needs a name and a positive max_ack_pending".into(),
            ));
        }

        let mut streams = self.inner.streams.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::StreamNotFound {
                stream: stream.to_string(),
            })?;

        if !state.spec.captures(&descriptor.filter_subject) {
            return Err(BrokerError::FilterSubjectMismatch {
                stream: stream.to_string(),
                filter: descriptor.filter_subject.clone(),
            });
        }

        if let Some(existing) = state.consumers.get(&descriptor.durable_name) {
            if existing.config != *descriptor {
                return Err(BrokerError::ConsumerConfigMismatch {
                    stream: stream.to_string(),
                    durable: descriptor.durable_name.clone(),
                });
            }
            return state.consumer_info(&descriptor.durable_name, false);
        }

        let cursor = match descriptor.deliver_policy {
            DeliverPolicy::All => 1,
            DeliverPolicy::New => state.messages.len() as u64 + 1,
        };
        state.consumers.insert(
            descriptor.durable_name.clone(),
            ConsumerState {
                config: descriptor.clone(),
                cursor,
                delivery_seq: 0,
                pending: BTreeMap::new(),
                num_redelivered: 0,
            },
        );
        debug!(
            stream = stream,
            consumer = %descriptor.durable_name,
            filter = %descriptor.filter_subject,
            "Durable consumer created"
        );
        state.consumer_info(&descriptor.durable_name, true)
    }

    async fn consumer_info(&self, stream: &str, durable: &str) -> BrokerResult<ConsumerInfo> {
        let streams = self.inner.streams.lock();
        let state = streams
            .get(stream)
            .ok_or_else(|| BrokerError::StreamNotFound {
                stream: stream.to_string(),
            })?;
        state.consumer_info(durable, false)
    }

    async fn delete_consumer(&self, stream: &str, durable: &str) -> BrokerResult<()> {
        let mut streams = self.inner.streams.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::StreamNotFound {
                stream: stream.to_string(),
            })?;
        state
            .consumers
            .remove(durable)
            .map(|_| ())
            .ok_or_else(|| BrokerError::ConsumerNotFound {
                stream: stream.to_string(),
                durable: durable.to_string(),
            })
    }

    async fn fetch(
        &self,
        stream: &str,
        durable: &str,
        request: FetchRequest,
    ) -> BrokerResult<Vec<DeliveredMessage>> {
        if request.batch == 0 {
            return Err(BrokerError::InvalidRequest("batch must be positive".into()));
        }
        if Self::take_failure(&self.inner.fetch_failures) {
            return Err(BrokerError::Unavailable("injected fetch failure".into()));
        }

        let acker: Arc<dyn AckHandle> = Arc::new(MemoryAcker {
            broker: self.clone(),
            stream: stream.to_string(),
            durable: durable.to_string(),
        });
        let deadline = Instant::now() + request.expires;

        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (batch, next_wake) = self.collect(stream, durable, request.batch, &acker)?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_wake.map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}
