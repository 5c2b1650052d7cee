//! # Stream Broker Port
//!
//! Outbound port every durable-stream adapter implements: stream
//! management, appends, durable pull consumers and per-message
//! acknowledgement.
//!
//! The in-memory adapter lives in [`crate::memory`]; a network adapter
//! implements the same trait.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared_types::{DeliveryInfo, Headers, Subject};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default window in which a repeated `msg-id` is treated as a duplicate append.
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(120);

/// Errors raised by a stream broker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// No stream with this name exists.
    #[error("Stream not found: {stream}")]
    StreamNotFound { stream: String },

    /// No stream captures the published subject.
    #[error("No stream captures subject {subject}")]
    NoStreamForSubject { subject: String },

    /// A stream with this name exists with different subjects.
    #[error("Stream {stream} exists with a different configuration")]
    StreamConfigMismatch { stream: String },

    /// Subjects of a new stream overlap those of an existing one.
    #[error("Stream {stream} subjects overlap stream {existing}")]
    SubjectOverlap { stream: String, existing: String },

    /// No durable consumer with this name on the stream.
    #[error("Consumer {durable} not found on stream {stream}")]
    ConsumerNotFound { stream: String, durable: String },

    /// Durable already exists with a different configuration.
    #[error("Consumer {durable} exists on stream {stream} with a different configuration")]
    ConsumerConfigMismatch { stream: String, durable: String },

    /// Filter subject is not captured by the stream.
    #[error("Filter subject {filter} is not captured by stream {stream}")]
    FilterSubjectMismatch { stream: String, filter: String },

    /// The message is no longer pending for this delivery.
    #[error("Message {stream_seq} is not pending for delivery {delivery_seq}")]
    AckNotPending { stream_seq: u64, delivery_seq: u64 },

    /// Request parameters were rejected.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Broker could not be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Request did not complete in time.
    #[error("Broker request timed out")]
    Timeout,
}

impl BrokerError {
    /// True if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_) | BrokerError::Timeout)
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

// =============================================================================
// STREAMS
// =============================================================================

/// Definition of a persistent stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Stream name, e.g. `DOMAIN_EVENTS`.
    pub name: String,
    /// Subject patterns captured by the stream (`*` and `>` wildcards).
    pub subjects: Vec<String>,
    /// Window for `msg-id` duplicate suppression.
    pub duplicate_window: Duration,
}

impl StreamSpec {
    /// Build a spec with the default duplicate window.
    pub fn new(name: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subjects,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
        }
    }

    /// True if any subject pattern of the stream captures `subject`.
    #[must_use]
    pub fn captures(&self, subject: &str) -> bool {
        self.subjects
            .iter()
            .any(|pattern| shared_types::subject_matches(pattern, subject))
    }
}

/// Snapshot of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    /// Stream definition.
    pub spec: StreamSpec,
    /// Number of stored messages.
    pub messages: u64,
    /// Sequence of the last appended message (0 when empty).
    pub last_sequence: u64,
    /// Whether this call created the stream.
    pub created: bool,
}

/// Acknowledgement of an append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishAck {
    /// Stream the message landed in.
    pub stream: String,
    /// Stream sequence assigned to the message.
    pub sequence: u64,
    /// True if the broker dropped the append as a duplicate `msg-id`.
    pub duplicate: bool,
}

// =============================================================================
// CONSUMERS
// =============================================================================

/// How deliveries must be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Every message is acknowledged individually.
    #[default]
    Explicit,
}

/// Where a new durable starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverPolicy {
    /// From the first message in the stream.
    #[default]
    All,
    /// Only messages appended after creation.
    New,
}

/// Configuration of a durable pull consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerDescriptor {
    /// Stable durable name.
    pub durable_name: String,
    /// Literal subject this consumer reads.
    pub filter_subject: String,
    /// Acknowledgement policy.
    pub ack_policy: AckPolicy,
    /// Start position.
    pub deliver_policy: DeliverPolicy,
    /// Maximum delivery attempts per message.
    pub max_deliver: u32,
    /// Time after which an unacknowledged delivery is redelivered.
    pub ack_wait: Duration,
    /// Maximum unacknowledged deliveries outstanding at once.
    pub max_ack_pending: usize,
}

/// Snapshot of a durable consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerInfo {
    /// Stream the durable is attached to.
    pub stream: String,
    /// Consumer configuration.
    pub config: ConsumerDescriptor,
    /// Whether this call created the durable.
    pub created: bool,
    /// Matching messages not yet delivered.
    pub num_pending: u64,
    /// Deliveries awaiting acknowledgement.
    pub num_ack_pending: usize,
    /// Total redeliveries performed.
    pub num_redelivered: u64,
}

/// Parameters of a single pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    /// Maximum messages to return.
    pub batch: usize,
    /// Maximum time to wait for at least one message.
    pub expires: Duration,
}

// =============================================================================
// DELIVERIES
// =============================================================================

/// Acknowledgement sent for a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// Processing finished; never redeliver.
    Ack,
    /// Redeliver, optionally after a delay.
    Nak(Option<Duration>),
    /// Never redeliver, without claiming success.
    Term,
    /// Processing continues; reset the ack-wait timer.
    InProgress,
}

impl fmt::Display for AckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckKind::Ack => f.write_str("ack"),
            AckKind::Nak(_) => f.write_str("nak"),
            AckKind::Term => f.write_str("term"),
            AckKind::InProgress => f.write_str("in_progress"),
        }
    }
}

/// Adapter hook that applies acknowledgements for a delivery.
#[async_trait]
pub trait AckHandle: Send + Sync {
    /// Apply `kind` to the delivery described by `info`.
    async fn acknowledge(&self, info: &DeliveryInfo, kind: AckKind) -> BrokerResult<()>;
}

/// A message handed out by a pull.
#[derive(Clone)]
pub struct DeliveredMessage {
    /// Subject the message was published under.
    pub subject: Subject,
    /// Headers as published.
    pub headers: Headers,
    /// Raw payload bytes as published.
    pub payload: Bytes,
    /// Delivery metadata.
    pub info: DeliveryInfo,
    acker: Arc<dyn AckHandle>,
}

impl DeliveredMessage {
    /// Assemble a delivery. Used by adapters.
    pub fn new(
        subject: Subject,
        headers: Headers,
        payload: Bytes,
        info: DeliveryInfo,
        acker: Arc<dyn AckHandle>,
    ) -> Self {
        Self {
            subject,
            headers,
            payload,
            info,
            acker,
        }
    }

    /// Acknowledge successful processing.
    pub async fn ack(&self) -> BrokerResult<()> {
        self.acker.acknowledge(&self.info, AckKind::Ack).await
    }

    /// Request redelivery after `delay` (immediately when `None`).
    pub async fn nak(&self, delay: Option<Duration>) -> BrokerResult<()> {
        self.acker.acknowledge(&self.info, AckKind::Nak(delay)).await
    }

    /// Stop redelivery without reporting success.
    pub async fn term(&self) -> BrokerResult<()> {
        self.acker.acknowledge(&self.info, AckKind::Term).await
    }

    /// Extend the ack-wait deadline.
    pub async fn in_progress(&self) -> BrokerResult<()> {
        self.acker.acknowledge(&self.info, AckKind::InProgress).await
    }
}

impl fmt::Debug for DeliveredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveredMessage")
            .field("subject", &self.subject)
            .field("headers", &self.headers)
            .field("payload_len", &self.payload.len())
            .field("info", &self.info)
            .finish()
    }
}

// =============================================================================
// PORT
// =============================================================================

/// Durable stream broker.
///
/// Implementations must hand disjoint messages to concurrent fetches on the
/// same durable and redeliver unacknowledged messages after `ack_wait`.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Create the stream, or verify an existing one has the same subjects.
    async fn ensure_stream(&self, spec: &StreamSpec) -> BrokerResult<StreamInfo>;

    /// Look up a stream.
    async fn stream_info(&self, stream: &str) -> BrokerResult<StreamInfo>;

    /// Append a message to the stream capturing `subject`.
    async fn publish(
        &self,
        subject: &Subject,
        headers: Headers,
        payload: Bytes,
    ) -> BrokerResult<PublishAck>;

    /// Create a durable. Re-creating with an identical config succeeds.
    async fn create_consumer(
        &self,
        stream: &str,
        descriptor: &ConsumerDescriptor,
    ) -> BrokerResult<ConsumerInfo>;

    /// Look up an existing durable.
    async fn consumer_info(&self, stream: &str, durable: &str) -> BrokerResult<ConsumerInfo>;

    /// Remove a durable and its delivery state.
    async fn delete_consumer(&self, stream: &str, durable: &str) -> BrokerResult<()>;

    /// Pull up to `request.batch` messages, waiting at most `request.expires`.
    ///
    /// Returns an empty batch when nothing became available in time.
    async fn fetch(
        &self,
        stream: &str,
        durable: &str,
        request: FetchRequest,
    ) -> BrokerResult<Vec<DeliveredMessage>>;
}

/// Check whether two subject patterns can match a common subject.
#[must_use]
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (Some(">"), Some(_)) | (Some(_), Some(">")) => return true,
            (Some(l), Some(r)) if l == "*" || r == "*" || l == r => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
