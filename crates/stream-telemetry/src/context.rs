//! Trace context propagation through message headers.
//!
//! A publisher injects the active span context as a W3C `traceparent`
//! header (plus `tracestate` when present). A consumer extracts it and
//! opens its `event.consume` span as a child of the remote parent, so one
//! trace covers publish and every delivery attempt.
//!
//! ## Example
//!
//! ```rust,ignore
//! // Publishing side
//! let mut headers = Headers::new();
//! inject_trace_context(&mut headers);
//!
//! // Consuming side
//! let span = consume_span(&message.subject, &message.info, &message.headers);
//! let outcome = handle(&message).instrument(span.clone()).await;
//! record_span_outcome(&span, outcome.is_ok());
//! ```

use opentelemetry::{
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};
use serde::{Deserialize, Serialize};
use shared_types::{DeliveryInfo, Headers, Subject};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// W3C trace parent header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// W3C trace state header.
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Value of `messaging.system` on consume spans.
pub const MESSAGING_SYSTEM: &str = "durable-stream";

/// Trace context in header form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedContext {
    /// Trace ID (32 hex characters)
    pub trace_id: String,
    /// Parent span ID (16 hex characters)
    pub span_id: String,
    /// Trace flags (sampled, etc.)
    pub trace_flags: u8,
    /// Optional trace state (vendor-specific data)
    pub trace_state: Option<String>,
}

impl PropagatedContext {
    /// Capture a span context. Returns `None` for invalid contexts.
    pub fn from_span_context(ctx: &SpanContext) -> Option<Self> {
        if !ctx.is_valid() {
            return None;
        }
        let state = ctx.trace_state().header();
        Some(Self {
            trace_id: ctx.trace_id().to_string(),
            span_id: ctx.span_id().to_string(),
            trace_flags: ctx.trace_flags().to_u8(),
            trace_state: (!state.is_empty()).then_some(state),
        })
    }

    /// Parse `traceparent` (and `tracestate`) from headers.
    ///
    /// Only version `00` is accepted; all-zero ids are rejected.
    pub fn from_headers(headers: &Headers) -> Option<Self> {
        let value = headers.get(TRACEPARENT_HEADER)?;
        let mut parts = value.trim().split('-');
        let (version, trace_id, span_id, flags) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != "00" {
            return None;
        }

        let is_hex = |s: &str, len: usize| {
            s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        };
        if !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
            return None;
        }
        if trace_id.chars().all(|c| c == '0') || span_id.chars().all(|c| c == '0') {
            return None;
        }

        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            trace_flags: u8::from_str_radix(flags, 16).ok()?,
            trace_state: headers
                .get(TRACESTATE_HEADER)
                .filter(|s| !s.is_empty())
                .cloned(),
        })
    }

    /// Write `traceparent` (and `tracestate`) into headers.
    pub fn write_headers(&self, headers: &mut Headers) {
        headers.insert(
            TRACEPARENT_HEADER.to_string(),
            format!("00-{}-{}-{:02x}", self.trace_id, self.span_id, self.trace_flags),
        );
        if let Some(state) = &self.trace_state {
            headers.insert(TRACESTATE_HEADER.to_string(), state.clone());
        }
    }

    /// Convert to a remote OpenTelemetry span context.
    pub fn to_span_context(&self) -> Option<SpanContext> {
        let trace_id = TraceId::from_hex(&self.trace_id).ok()?;
        let span_id = SpanId::from_hex(&self.span_id).ok()?;
        let trace_state = self
            .trace_state
            .as_deref()
            .and_then(|s| s.parse::<TraceState>().ok())
            .unwrap_or_default();

        let ctx = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::new(self.trace_flags),
            true,
            trace_state,
        );
        ctx.is_valid().then_some(ctx)
    }
}

/// Inject the current span's context into `headers`.
///
/// Does nothing when no valid span context is active, e.g. when the
/// OpenTelemetry layer is not installed.
pub fn inject_trace_context(headers: &mut Headers) {
    let context = tracing::Span::current().context();
    let span = context.span();
    if let Some(propagated) = PropagatedContext::from_span_context(span.span_context()) {
        propagated.write_headers(headers);
    }
}

/// Extract a remote parent context from `headers`.
pub fn extract_trace_context(headers: &Headers) -> Option<Context> {
    let span_context = PropagatedContext::from_headers(headers)?.to_span_context()?;
    Some(Context::new().with_remote_span_context(span_context))
}

/// Open the `event.consume` span for a delivery, parented on the
/// publisher's context when the headers carry one.
pub fn consume_span(subject: &Subject, info: &DeliveryInfo, headers: &Headers) -> tracing::Span {
    let span = tracing::info_span!(
        "event.consume",
        otel.kind = "consumer",
        otel.status_code = tracing::field::Empty,
        messaging.system = MESSAGING_SYSTEM,
        messaging.destination = %subject,
        messaging.stream = %info.stream,
        messaging.consumer = %info.consumer,
        messaging.stream_sequence = info.stream_seq,
        messaging.delivery_sequence = info.delivery_seq,
        redelivery_count = info.redelivery_count(),
    );
    if let Some(parent) = extract_trace_context(headers) {
        span.set_parent(parent);
    }
    span
}

/// Mark a consume span OK or ERROR.
pub fn record_span_outcome(span: &tracing::Span, success: bool) {
    span.record("otel.status_code", if success { "OK" } else { "ERROR" });
}
