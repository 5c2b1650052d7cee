//! Structured console logging.
//!
//! Every delivery-related log line carries the same fields so a log
//! pipeline can group them by message:
//! - `topic`: topic name
//! - `stream`: stream the message was read from
//! - `stream_seq`: position of the message in the stream
//! - `delivery_count`: attempt number, starting at 1

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Build the level filter: `RUST_LOG` wins, then the configured level.
pub(crate) fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))
}

/// Install a console subscriber without span export.
pub fn init_logging_only(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    let result = if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    result.map_err(|e| TelemetryError::Config(e.to_string()))?;

    tracing::debug!(json_logs = config.json_logs, "Console logging initialized");
    Ok(())
}

/// Log a delivery-related event with the standard message fields.
///
/// ```rust,ignore
/// log_delivery!(warn, topic, message.info, "Handler failed", error = %err);
/// ```
#[macro_export]
macro_rules! log_delivery {
    ($level:ident, $topic:expr, $info:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            topic = %$topic,
            stream = %$info.stream,
            stream_seq = $info.stream_seq,
            delivery_count = $info.delivery_count,
            $($($field)*,)?
            $msg
        )
    };
}
