//! # Runtime Configuration
//!
//! Unified configuration for the stream layout, consumers, webhook ingress
//! and the HTTP listener.
//!
//! Values come from (in increasing precedence) the defaults below, an
//! optional JSON file named by `EV_CONFIG_FILE`, and `EV_*` environment
//! variables.
//!
//! ## Security Requirements
//!
//! - `webhook.secret` MUST NOT be empty in production
//! - All timeouts and limits have sane defaults with override capability

use ev_04_concurrency_governor::{GovernorConfig, SaturationPolicy, DEFAULT_MAX_CONCURRENT};
use ev_05_durable_consumer::{ConsumerConfig, ConsumerLifecycle};
use ev_06_webhook_ingress::WebhookConfig;
use serde::{Deserialize, Serialize};
use shared_bus::{DeploymentMode, ResolverConfig, TtlStore};
use shared_types::Topic;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_FILE_ENV: &str = "EV_CONFIG_FILE";

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deployment environment (development, staging, production).
    pub environment: String,
    /// Stream layout.
    pub streams: ResolverConfig,
    /// Consumer settings applied to every topic.
    pub consumer: ConsumerSettings,
    /// Per-topic replacements for `consumer`.
    pub topics: BTreeMap<String, ConsumerSettings>,
    /// Webhook ingress settings.
    pub webhook: WebhookSettings,
    /// HTTP listener settings.
    pub http: HttpSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            streams: ResolverConfig::default(),
            consumer: ConsumerSettings::default(),
            topics: BTreeMap::new(),
            webhook: WebhookSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load defaults, the optional config file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults with overrides from `EV_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::File {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply `EV_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(environment) = lookup("EV_ENVIRONMENT") {
            self.environment = environment;
        }

        match lookup("EV_DEPLOYMENT_MODE").as_deref() {
            None => {}
            Some("shared") => {
                let stream = lookup("EV_STREAM_NAME")
                    .unwrap_or_else(|| shared_bus::resolver::DEFAULT_PRIMARY_STREAM.to_string());
                self.streams.mode = DeploymentMode::shared(stream);
            }
            Some("per_domain") => self.streams.mode = DeploymentMode::per_domain(),
            Some(other) => return Err(ConfigError::invalid_env("EV_DEPLOYMENT_MODE", other)),
        }
        if let DeploymentMode::PerDomain { primary, legacy } = &mut self.streams.mode {
            if let Some(name) = lookup("EV_PRIMARY_STREAM") {
                *primary = name;
            }
            if let Some(name) = lookup("EV_LEGACY_STREAM") {
                *legacy = name;
            }
        }

        if let Some(value) = lookup("EV_CONSUMER_LIFECYCLE") {
            self.consumer.lifecycle = match value.as_str() {
                "owned" => ConsumerLifecycle::Owned,
                "external" => ConsumerLifecycle::External,
                other => return Err(ConfigError::invalid_env("EV_CONSUMER_LIFECYCLE", other)),
            };
        }
        if let Some(value) = lookup("EV_SATURATION") {
            self.consumer.saturation = match value.as_str() {
                "block" => SaturationPolicy::Block,
                "defer" => SaturationPolicy::Defer,
                "shed" => SaturationPolicy::Shed,
                other => return Err(ConfigError::invalid_env("EV_SATURATION", other)),
            };
        }
        parse_into(&lookup, "EV_MAX_DELIVER", &mut self.consumer.max_deliver)?;
        parse_into(&lookup, "EV_MAX_CONCURRENT", &mut self.consumer.max_concurrent)?;
        parse_into(
            &lookup,
            "EV_ENABLE_CONCURRENCY_CONTROL",
            &mut self.consumer.enable_concurrency_control,
        )?;
        parse_into(&lookup, "EV_RETRY_DELAY_MS", &mut self.consumer.retry_delay_ms)?;
        if let Some(prefix) = lookup("EV_DLQ_SUBJECT_PREFIX") {
            self.consumer.dlq_subject_prefix = Some(prefix).filter(|p| !p.is_empty());
        }

        if let Some(secret) = lookup("EV_WEBHOOK_SECRET") {
            self.webhook.secret = secret;
        }
        if let Some(header) = lookup("EV_WEBHOOK_SIGNATURE_HEADER") {
            self.webhook.signature_header = header.to_ascii_lowercase();
        }
        parse_into(&lookup, "EV_IDEMPOTENCY_TTL_SECS", &mut self.webhook.idempotency_ttl_secs)?;
        parse_into(&lookup, "EV_WEBHOOK_MAX_BODY_BYTES", &mut self.webhook.max_body_bytes)?;

        if let Some(addr) = lookup("EV_HTTP_ADDR") {
            self.http.bind_address = addr;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Check internal consistency; production additionally requires a
    /// webhook secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddress(self.http.bind_address.clone()))?;

        let streams_named = match &self.streams.mode {
            DeploymentMode::Shared { stream } => !stream.is_empty(),
            DeploymentMode::PerDomain { primary, legacy } => {
                !primary.is_empty() && !legacy.is_empty()
            }
        };
        if !streams_named || self.streams.subjects.is_empty() {
            return Err(ConfigError::Invalid(
                "stream names and subjects must not be empty".into(),
            ));
        }

        if self.webhook.idempotency_ttl_secs == 0 || self.webhook.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "webhook idempotency TTL and sweep interval must be positive".into(),
            ));
        }
        if self.webhook.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("webhook max body size must be positive".into()));
        }

        for (name, settings) in std::iter::once(("*", &self.consumer))
            .chain(self.topics.iter().map(|(n, s)| (n.as_str(), s)))
        {
            if name != "*" {
                Topic::new(name).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            }
            if settings.enable_concurrency_control && settings.max_concurrent == 0 {
                return Err(ConfigError::Invalid(format!(
                    "max_concurrent must be at least 1 for {name}"
                )));
            }
        }

        if self.is_production() {
            self.validate_for_production()?;
        }
        Ok(())
    }

    /// Validate configuration for production readiness.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.webhook.secret.is_empty() {
            return Err(ConfigError::MissingWebhookSecret);
        }
        Ok(())
    }

    /// Consumer configuration for `topic`.
    #[must_use]
    pub fn consumer_config(&self, topic: &Topic) -> ConsumerConfig {
        self.topics
            .get(topic.as_str())
            .unwrap_or(&self.consumer)
            .to_consumer_config()
    }

    #[must_use]
    pub fn webhook_config(&self) -> WebhookConfig {
        self.webhook.to_webhook_config()
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "SECURITY VIOLATION: webhook secret is empty. \
         Set EV_WEBHOOK_SECRET or provide webhook.secret in the config file."
    )]
    MissingWebhookSecret,

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },

    #[error("Invalid HTTP bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("Config file {path} could not be loaded: {reason}")]
    File { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid_env(var: &str, value: &str) -> Self {
        ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }
    }
}

fn parse_into<F, T>(lookup: &F, var: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env(var, &value))?;
    }
    Ok(())
}

/// Durable consumer settings for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub durable_name: Option<String>,
    pub lifecycle: ConsumerLifecycle,
    /// Deliveries before a failing message is dead-lettered.
    pub max_deliver: u32,
    pub ack_wait_secs: u64,
    pub max_ack_pending: usize,
    pub batch: usize,
    pub expires_ms: u64,
    /// Nak delay for retryable failures.
    pub retry_delay_ms: u64,
    pub idle_backoff_ms: u64,
    pub pull_error_backoff_ms: u64,
    pub max_concurrent: usize,
    pub enable_concurrency_control: bool,
    pub saturation: SaturationPolicy,
    /// Dead-letter subject prefix; the original subject when unset.
    pub dlq_subject_prefix: Option<String>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            durable_name: None,
            lifecycle: ConsumerLifecycle::Owned,
            max_deliver: 5,
            ack_wait_secs: 30,
            max_ack_pending: 256,
            batch: 10,
            expires_ms: 5_000,
            retry_delay_ms: 5_000,
            idle_backoff_ms: 1_000,
            pull_error_backoff_ms: 2_000,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            enable_concurrency_control: true,
            saturation: SaturationPolicy::Block,
            dlq_subject_prefix: None,
        }
    }
}

impl ConsumerSettings {
    #[must_use]
    pub fn to_consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            durable_name: self.durable_name.clone(),
            lifecycle: self.lifecycle,
            max_deliver: self.max_deliver,
            ack_wait: Duration::from_secs(self.ack_wait_secs),
            max_ack_pending: self.max_ack_pending,
            batch: self.batch,
            expires: Duration::from_millis(self.expires_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            pull_error_backoff: Duration::from_millis(self.pull_error_backoff_ms),
            dlq_subject_prefix: self.dlq_subject_prefix.clone(),
            governor: GovernorConfig {
                max_concurrent: self.max_concurrent,
                enable_concurrency_control: self.enable_concurrency_control,
                saturation: self.saturation,
            },
            ..ConsumerConfig::default()
        }
    }
}

/// Webhook ingress settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// HMAC secret shared with webhook origins. MUST NOT be empty in
    /// production.
    pub secret: String,
    pub signature_header: String,
    pub idempotency_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_idempotency_keys: usize,
    pub max_body_bytes: usize,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        let defaults = WebhookConfig::default();
        Self {
            secret: String::new(),
            signature_header: defaults.signature_header,
            idempotency_ttl_secs: TtlStore::DEFAULT_TTL.as_secs(),
            sweep_interval_secs: defaults.sweep_interval.as_secs(),
            max_idempotency_keys: TtlStore::DEFAULT_MAX_ENTRIES,
            max_body_bytes: defaults.max_body_bytes,
        }
    }
}

impl WebhookSettings {
    #[must_use]
    pub fn to_webhook_config(&self) -> WebhookConfig {
        WebhookConfig {
            secret: self.secret.clone(),
            signature_header: self.signature_header.clone(),
            idempotency_ttl: Duration::from_secs(self.idempotency_ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            max_idempotency_keys: self.max_idempotency_keys,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Address serving webhooks, `/status`, `/health` and `/metrics`.
    pub bind_address: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}
