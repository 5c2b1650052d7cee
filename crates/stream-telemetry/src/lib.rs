//! # Stream Telemetry
//!
//! Observability for the event core.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an env filter, pretty or JSON output
//! - **Traces**: OpenTelemetry spans exported over OTLP, with trace context
//!   carried in message headers from publisher to consumer
//! - **Metrics**: Prometheus counters, gauges and histograms per topic
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stream_telemetry::{TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).await.expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `http://localhost:4317` | OTLP endpoint |
//! | `OTEL_SERVICE_NAME` | `event-core` | Service name in traces |
//! | `EV_OTLP_ENABLED` | `false` | Export spans over OTLP |
//! | `EV_LOG_LEVEL` | `info` | Log level filter |
//! | `EV_JSON_LOGS` | `false` | JSON log output |

mod config;
pub mod context;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use context::{
    consume_span, extract_trace_context, inject_trace_context, record_span_outcome,
    PropagatedContext, TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
pub use logging::init_logging_only;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, EVENT_CAPACITY_EXCEEDED,
    EVENT_CONSUME_TOTAL, EVENT_DEAD_LETTERS, EVENT_HANDLERS_IN_FLIGHT, EVENT_HANDLER_DURATION,
    EVENT_PUBLISH_DURATION, EVENT_PUBLISH_TOTAL, EVENT_REDELIVERIES, EVENT_SCHEMA_VALIDATIONS,
    WEBHOOK_IDEMPOTENCY_EVICTIONS, WEBHOOK_REQUESTS,
};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize OpenTelemetry tracer: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging, tracing and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
/// When dropped, it flushes pending spans.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;

    let tracing_guard = if config.otlp_enabled {
        Some(tracing_setup::init_tracing(&config).await?)
    } else {
        init_logging_only(&config)?;
        None
    };

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    _tracing: Option<TracingGuard>,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Config("bad filter".into());
        assert_eq!(err.to_string(), "Invalid configuration: bad filter");
    }
}
