//! # ev-06-webhook-ingress
//!
//! Webhook ingress in front of the Event Publisher.
//!
//! ## Request pipeline
//!
//! ```text
//! POST /webhooks/:source
//!     │
//!     ├── body empty or unreadable ─────→ 400
//!     ├── signature missing / mismatch ─→ 401
//!     ├── idempotency key live ─────────→ 200 {duplicate: true}
//!     ├── translation fails ────────────→ 400 (key released)
//!     ├── publish fails ────────────────→ 500 (key released)
//!     └── published ────────────────────→ 200 {event_id}
//! ```
//!
//! Signatures are HMAC-SHA256 over the raw body, compared in constant
//! time. The idempotency key is the `Idempotency-Key` or `X-Delivery-Id`
//! header, or a SHA-256 of the secret and the body when neither is sent.
//! Keys live in a bounded TTL store swept by a background task.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod http;
pub mod ports;
pub mod service;

pub use domain::{
    parse_signature_header, sign, verify, DedupeOutcome, IdempotencyCache, WebhookConfig,
    DELIVERY_ID_HEADER, IDEMPOTENCY_KEY_HEADER,
};
pub use error::{WebhookError, WebhookResult};
pub use http::router;
pub use ports::{JsonEnvelopeTranslator, TranslationError, WebhookTranslator};
pub use service::{IngestOutcome, WebhookIngress};
