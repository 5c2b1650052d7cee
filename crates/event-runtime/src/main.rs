//! # Event Core Runtime
//!
//! Entry point for the durable event-processing core.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging, optional OTLP export, metrics)
//! 2. Load configuration (defaults, `EV_CONFIG_FILE`, `EV_*` overrides)
//! 3. Validate configuration for the deployment environment
//! 4. Ensure streams, bind durable consumers, start pull loops
//! 5. Serve webhooks, `/status`, `/health` and `/metrics`
//!
//! Ctrl+C signals shutdown; pull loops finish their current batch.

use anyhow::{Context, Result};
use event_runtime::{EventRuntime, RuntimeConfig};
use stream_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .await
        .context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    let mut runtime = EventRuntime::new(config)?;
    runtime.start().await?;

    info!("Event core is running. Press Ctrl+C to stop.");
    let served = tokio::select! {
        result = runtime.serve() => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")
        }
    };
    if let Err(e) = &served {
        error!("Runtime stopped with error: {:#}", e);
    }

    runtime.shutdown().await;
    served
}
