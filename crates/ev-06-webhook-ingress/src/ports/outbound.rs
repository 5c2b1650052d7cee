//! Driven Ports (SPI - Outbound)

use serde::Deserialize;
use serde_json::Value;
use shared_types::{EventEnvelope, Topic};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TranslationError(pub String);

/// Turns a verified webhook body into a domain event.
pub trait WebhookTranslator: Send + Sync {
    fn translate(&self, source: &str, body: &[u8]) -> Result<(Topic, EventEnvelope), TranslationError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeBody {
    topic: String,
    user_id: String,
    #[serde(default)]
    event_id: Option<String>,
    payload: Value,
}

/// Accepts bodies of the form
/// `{"topic": ..., "userId": ..., "eventId"?: ..., "payload": {...}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeTranslator;

impl WebhookTranslator for JsonEnvelopeTranslator {
    fn translate(&self, _source: &str, body: &[u8]) -> Result<(Topic, EventEnvelope), TranslationError> {
        let parsed: EnvelopeBody =
            serde_json::from_slice(body).map_err(|e| TranslationError(e.to_string()))?;
        let topic = Topic::new(parsed.topic).map_err(|e| TranslationError(e.to_string()))?;
        let mut envelope = EventEnvelope::new(&topic, parsed.user_id, parsed.payload);
        if let Some(event_id) = parsed.event_id.filter(|id| !id.is_empty()) {
            envelope = envelope.with_event_id(event_id);
        }
        Ok((topic, envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_envelope_body() {
        let body = br#"{"topic":"domain.hrv.raw-received","userId":"u1","eventId":"wh-1","payload":{"rmssd":40}}"#;
        let (topic, envelope) = JsonEnvelopeTranslator.translate("garmin", body).unwrap();
        assert_eq!(topic.as_str(), "domain.hrv.raw-received");
        assert_eq!(envelope.event_id, "wh-1");
        assert_eq!(envelope.user_id, "u1");
        assert_eq!(envelope.payload["rmssd"], 40);
    }

    #[test]
    fn test_translate_generates_event_id() {
        let body = br#"{"topic":"domain.hrv.raw-received","userId":"u1","payload":{}}"#;
        let (_, envelope) = JsonEnvelopeTranslator.translate("garmin", body).unwrap();
        assert!(!envelope.event_id.is_empty());
    }

    #[test]
    fn test_translate_rejects_bad_topic() {
        let body = br#"{"topic":"Domain.HRV","userId":"u1","payload":{}}"#;
        assert!(JsonEnvelopeTranslator.translate("garmin", body).is_err());
        assert!(JsonEnvelopeTranslator.translate("garmin", b"not json").is_err());
    }
}
