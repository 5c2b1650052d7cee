//! # ev-05-durable-consumer
//!
//! Durable Consumer: binds a durable cursor per topic on a resolved stream
//! and runs a pull loop with at-least-once delivery.
//!
//! ## Per-message state machine
//!
//! ```text
//! Delivered(delivery_count)
//!     │
//!     ├── count > max_deliver ───────────────→ dead-letter .max-deliver
//!     ├── undecodable / schema invalid ──────→ dead-letter .schema-invalid
//!     ├── handler Ok ────────────────────────→ ack
//!     ├── handler Err, count >= max_deliver ─→ dead-letter .max-deliver
//!     ├── handler Err, retryable ────────────→ nak(retry_delay)
//!     └── handler Err, non-retryable ────────→ dead-letter .non-retryable
//! ```
//!
//! Dead-lettering is a republish followed by a terminal ack. A failed
//! republish is retried a few times and then nak'ed, except on the final
//! delivery, where the message is held with in-progress signals until the
//! republish succeeds.
//!
//! ## Pull loop
//!
//! - pull `batch` messages bounded by `expires`
//! - handlers overlap up to the topic's concurrency governor bound
//! - a message started after `ack_wait / 2` gets an in-progress signal
//! - messages not started within `expires` are released without delay
//! - pull errors sleep `pull_error_backoff`, empty pulls `idle_backoff`
//! - a handler panic counts as a non-retryable failure
//!
//! A final delivery (`delivery_count >= max_deliver`) is never nak'ed: it
//! is not released at the deadline, and under `Block` or `Defer` it waits
//! for a slot instead of being deferred.
//!
//! Shutdown goes through a `watch` channel; an in-flight pull and its batch
//! finish before the flag is checked.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;
pub mod supervisor;

pub use domain::{
    ConsumerConfig, ConsumerLifecycle, ConsumerState, ConsumerStats, ConsumerStatsSnapshot,
    ConsumerStatus, TopicRegistry, TopicRegistryBuilder,
};
pub use error::{BindAttempt, ConsumerError, ConsumerResult};
pub use ports::{ConsumerStatusQuery, TopicHandler};
pub use service::DurableConsumer;
pub use supervisor::ConsumerSet;
