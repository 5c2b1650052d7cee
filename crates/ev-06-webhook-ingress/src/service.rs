//! Webhook ingest: verify, dedupe, translate, publish.

use crate::domain::{signature, IdempotencyCache, WebhookConfig};
use crate::error::{WebhookError, WebhookResult};
use crate::ports::{JsonEnvelopeTranslator, WebhookTranslator};
use axum::http::HeaderMap;
use ev_02_event_publisher::EventPublishing;
use serde::Serialize;
use shared_bus::TtlStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub duplicate: bool,
}

pub struct WebhookIngress {
    config: WebhookConfig,
    cache: IdempotencyCache,
    translator: Arc<dyn WebhookTranslator>,
    publisher: Arc<dyn EventPublishing>,
}

impl WebhookIngress {
    /// Ingress with a TTL store sized from `config` and the JSON envelope
    /// translator.
    pub fn new(config: WebhookConfig, publisher: Arc<dyn EventPublishing>) -> Self {
        let store = TtlStore::with_capacity(config.idempotency_ttl, config.max_idempotency_keys);
        let cache = IdempotencyCache::new(Arc::new(store));
        Self::with_parts(config, cache, Arc::new(JsonEnvelopeTranslator), publisher)
    }

    pub fn with_parts(
        config: WebhookConfig,
        cache: IdempotencyCache,
        translator: Arc<dyn WebhookTranslator>,
        publisher: Arc<dyn EventPublishing>,
    ) -> Self {
        Self {
            config,
            cache,
            translator,
            publisher,
        }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    pub fn cache(&self) -> &IdempotencyCache {
        &self.cache
    }

    /// Process one webhook delivery from `source`.
    ///
    /// Order: body present, signature valid, not a duplicate, translated,
    /// published. A failure after the dedupe step releases the key.
    pub async fn ingest(
        &self,
        source: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> WebhookResult<IngestOutcome> {
        if body.is_empty() {
            return Err(WebhookError::EmptyBody);
        }

        let header_name = self.config.signature_header.as_str();
        let provided = headers
            .get(header_name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| WebhookError::MissingSignature {
                header: header_name.to_string(),
            })?;
        if !signature::verify(self.config.secret.as_bytes(), body, provided) {
            warn!(source, "[ev-06] Webhook signature mismatch");
            return Err(WebhookError::InvalidSignature);
        }

        let key = IdempotencyCache::key_for(headers, self.config.secret.as_bytes(), body);
        if self.cache.dedupe(&key).is_duplicate {
            debug!(source, key = %key, "[ev-06] Duplicate webhook suppressed");
            return Ok(IngestOutcome {
                event_id: None,
                duplicate: true,
            });
        }

        match self.forward(source, body).await {
            Ok(event_id) => {
                info!(source, event_id = %event_id, "[ev-06] Webhook forwarded");
                Ok(IngestOutcome {
                    event_id: Some(event_id),
                    duplicate: false,
                })
            }
            Err(e) => {
                self.cache.release(&key);
                warn!(source, error = %e, "[ev-06] Webhook not forwarded, key released");
                Err(e)
            }
        }
    }

    async fn forward(&self, source: &str, body: &[u8]) -> WebhookResult<String> {
        let (topic, envelope) = self.translator.translate(source, body)?;
        self.publisher.publish(&topic, &envelope).await?;
        Ok(envelope.event_id)
    }
}
