use shared_bus::TtlStore;
use std::time::Duration;

pub const DEFAULT_SIGNATURE_HEADER: &str = "x-signature-256";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// HMAC key shared with the webhook origin.
    pub secret: String,
    pub signature_header: String,
    pub idempotency_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_idempotency_keys: usize,
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            idempotency_ttl: TtlStore::DEFAULT_TTL,
            sweep_interval: Duration::from_secs(60),
            max_idempotency_keys: TtlStore::DEFAULT_MAX_ENTRIES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}
