//! Ports for webhook ingress
//!
//! Verified bodies leave through the `EventPublishing` port of the event
//! publisher.

pub mod outbound;

pub use outbound::{JsonEnvelopeTranslator, TranslationError, WebhookTranslator};
