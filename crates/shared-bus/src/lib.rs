//! # Shared Bus - Durable Stream Plumbing
//!
//! The outbound broker port every event-processing crate talks to, plus
//! the in-memory adapter, the stream resolver and the TTL key store.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   publish()    ┌──────────────┐   fetch()    ┌──────────────┐
//! │  Publisher   │ ─────────────→ │ StreamBroker │ ───────────→ │   Durable    │
//! │              │                │  (stream)    │ ←─────────── │   Consumer   │
//! └──────────────┘                └──────────────┘  ack/nak/term└──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **At-least-once:** unacknowledged deliveries return after `ack_wait`.
//! - **Bounded redelivery:** a message is delivered at most `max_deliver` times.
//! - **Duplicate appends:** a repeated `msg-id` inside the window is dropped.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod memory;
pub mod resolver;
pub mod ttl_store;

// Re-export main types
pub use broker::{
    AckHandle, AckKind, AckPolicy, BrokerError, BrokerResult, ConsumerDescriptor, ConsumerInfo,
    DeliverPolicy, DeliveredMessage, FetchRequest, PublishAck, StreamBroker, StreamInfo,
    StreamSpec, DEFAULT_DUPLICATE_WINDOW,
};
pub use memory::{InMemoryStreamBroker, StoredMessage};
pub use resolver::{DeploymentMode, ResolverConfig, StreamResolver};
pub use ttl_store::{Recorded, TtlStore};
