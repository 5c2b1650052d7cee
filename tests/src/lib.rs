//! # Event Core Test Suite
//!
//! Unified test crate for behavior that spans crates.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (validation, signatures, TTL store)
//! └── src/integration/  # Cross-crate scenarios
//!     ├── fixtures.rs       # Broker, publisher and handler builders
//!     ├── schema_gate.rs    # Invalid payloads never reach handlers
//!     ├── redelivery.rs     # Bounded retry and non-retryable short-circuit
//!     ├── webhook.rs        # Idempotent, signed webhook ingress
//!     ├── concurrency.rs    # Slot bound under Block, Defer and Shed
//!     └── end_to_end.rs     # Publish → consume → ack through the runtime
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ev-tests
//! cargo test -p ev-tests integration::webhook
//! cargo bench -p ev-tests
//! ```
//!
//! Scenarios run on paused tokio time, so multi-second nak delays and
//! idempotency TTLs elapse instantly.

#![allow(dead_code)]

pub mod integration;
