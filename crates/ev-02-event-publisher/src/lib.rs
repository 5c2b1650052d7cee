//! # ev-02-event-publisher
//!
//! Event Publisher: appends domain events to the durable stream, but only
//! after they pass the topic schema.
//!
//! ## Flow
//!
//! ```text
//! publish(topic, event)
//!     │
//!     ├── schema invalid ──→ PublishError::SchemaValidation (nothing appended)
//!     │
//!     ├── headers: msg-id, event-topic, traceparent
//!     │
//!     └── StreamBroker::publish(topic subject) ──→ PublishAck
//!                                               └─→ PublishError::Transport
//! ```
//!
//! Every call records one validation outcome, one latency observation and
//! one `event_publish_total{topic,outcome}` increment.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::BackoffConfig;
pub use error::{PublishError, PublishResult};
pub use ports::EventPublishing;
pub use service::{EventPublisher, PublisherStats};
