//! # Event Runtime Library
//!
//! Wires the event core together. The binary in `main.rs` is a thin shell
//! around [`EventRuntime`]; tests drive the same type.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration (production requires a webhook secret)
//! 2. Build components (schemas, publisher, topic registry, ingress)
//! 3. Ensure the primary stream exists (or reuse an existing candidate)
//! 4. Bind every durable consumer; any topic without a usable stream
//!    candidate aborts startup
//! 5. Start pull loops and the idempotency sweeper
//! 6. Serve HTTP until shutdown
//!
//! ## Shutdown
//!
//! A `watch` channel fans the signal out to pull loops, the sweeper and
//! the HTTP server. Pull loops finish their current batch.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod container;
pub mod handlers;
pub mod wiring;

use anyhow::{Context, Result};
use axum::Router;
use ev_05_durable_consumer::ConsumerSet;
use shared_bus::{InMemoryStreamBroker, StreamBroker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use container::{ConfigError, EventCore, RuntimeConfig};

/// The event core runtime.
pub struct EventRuntime {
    core: EventCore,
    consumers: Option<Arc<ConsumerSet>>,
    sweeper: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EventRuntime {
    /// Runtime over the in-memory broker.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_broker(config, Arc::new(InMemoryStreamBroker::new()))
    }

    pub fn with_broker(config: RuntimeConfig, broker: Arc<dyn StreamBroker>) -> Result<Self> {
        config.validate().context("Invalid runtime configuration")?;
        let core = EventCore::new(config, broker)?;
        Ok(Self::from_core(core))
    }

    /// Runtime around components the caller already built.
    pub fn from_core(core: EventCore) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            core,
            consumers: None,
            sweeper: None,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn core(&self) -> &EventCore {
        &self.core
    }

    /// Running consumers; `None` before [`start`](Self::start).
    pub fn consumers(&self) -> Option<&Arc<ConsumerSet>> {
        self.consumers.as_ref()
    }

    /// Ensure the stream, bind consumers and start background tasks.
    pub async fn start(&mut self) -> Result<()> {
        info!("===========================================");
        info!("  Event Core Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("  Environment: {}", self.core.config.environment);
        info!("===========================================");

        let stream = self
            .core
            .publisher
            .ensure_stream()
            .await
            .context("Failed to ensure event stream")?;
        info!(stream = %stream.spec.name, created = stream.created, "Event stream ready");

        let config = &self.core.config;
        let consumers = ConsumerSet::start(
            &self.core.topics,
            Arc::clone(&self.core.broker),
            &self.core.resolver,
            |topic| config.consumer_config(topic),
            self.shutdown_rx.clone(),
        )
        .await
        .context("Failed to start durable consumers")?;
        self.consumers = Some(Arc::new(consumers));

        let webhook = self.core.ingress.config();
        self.sweeper = Some(
            self.core
                .ingress
                .cache()
                .spawn_sweeper(webhook.sweep_interval, self.shutdown_rx.clone()),
        );

        info!("All consumers bound and running");
        Ok(())
    }

    /// Router for the webhook, status, health and metrics endpoints.
    pub fn router(&self) -> Result<Router> {
        let consumers = self
            .consumers
            .clone()
            .context("Runtime must be started before serving HTTP")?;
        Ok(wiring::app_router(
            Arc::clone(&self.core.ingress),
            consumers,
            Duration::from_secs(self.core.config.http.request_timeout_secs),
        ))
    }

    /// Serve HTTP on the configured address until shutdown is signalled.
    pub async fn serve(&self) -> Result<()> {
        let addr = &self.core.config.http.bind_address;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
        info!("HTTP listening on {}", addr);

        let mut shutdown = self.shutdown_rx.clone();
        axum::serve(listener, self.router()?)
            .with_graceful_shutdown(async move {
                // Resolves on the signal or when the sender is gone.
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .context("HTTP server failed")
    }

    /// Signal shutdown and wait for pull loops and the sweeper.
    pub async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        if let Some(consumers) = &self.consumers {
            consumers.join().await;
        }
        if let Some(sweeper) = self.sweeper.take() {
            if let Err(e) = sweeper.await {
                error!("Idempotency sweeper failed: {}", e);
            }
        }
        info!("Shutdown complete");
    }
}
