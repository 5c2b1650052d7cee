//! Domain module for webhook ingress

pub mod config;
pub mod idempotency;
pub mod signature;

pub use config::WebhookConfig;
pub use idempotency::{DedupeOutcome, IdempotencyCache, DELIVERY_ID_HEADER, IDEMPOTENCY_KEY_HEADER};
pub use signature::{parse_signature_header, sign, verify};
