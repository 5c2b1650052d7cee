//! # Stream Resolver
//!
//! Decides which streams the publisher and the consumers look for, in
//! order, based on a static deployment mode.

use crate::broker::StreamSpec;
use serde::{Deserialize, Serialize};

/// Primary per-domain stream used in production.
pub const DEFAULT_PRIMARY_STREAM: &str = "DOMAIN_EVENTS";

/// Legacy stream kept as a fallback.
pub const DEFAULT_LEGACY_STREAM: &str = "EVENTS";

/// Subjects every candidate stream captures by default.
pub const DEFAULT_STREAM_SUBJECTS: [&str; 2] = ["domain.>", "dlq.>"];

/// How streams are laid out in a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeploymentMode {
    /// A single shared stream, used by tests.
    Shared {
        /// Stream name.
        stream: String,
    },
    /// A primary per-domain stream with a legacy fallback.
    PerDomain {
        /// Primary stream name.
        primary: String,
        /// Fallback stream name.
        legacy: String,
    },
}

impl DeploymentMode {
    /// Production layout with the default stream names.
    #[must_use]
    pub fn per_domain() -> Self {
        DeploymentMode::PerDomain {
            primary: DEFAULT_PRIMARY_STREAM.to_string(),
            legacy: DEFAULT_LEGACY_STREAM.to_string(),
        }
    }

    /// Single shared stream.
    pub fn shared(stream: impl Into<String>) -> Self {
        DeploymentMode::Shared {
            stream: stream.into(),
        }
    }
}

impl Default for DeploymentMode {
    fn default() -> Self {
        Self::per_domain()
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Stream layout.
    pub mode: DeploymentMode,
    /// Subject patterns for candidate streams.
    pub subjects: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::default(),
            subjects: DEFAULT_STREAM_SUBJECTS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Ordered stream candidate resolution.
#[derive(Debug, Clone)]
pub struct StreamResolver {
    config: ResolverConfig,
}

impl StreamResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolver for a single shared stream with default subjects.
    pub fn shared(stream: impl Into<String>) -> Self {
        Self::new(ResolverConfig {
            mode: DeploymentMode::shared(stream),
            ..ResolverConfig::default()
        })
    }

    /// Deployment mode in use.
    #[must_use]
    pub fn mode(&self) -> &DeploymentMode {
        &self.config.mode
    }

    /// Candidate stream names, most preferred first.
    #[must_use]
    pub fn candidate_streams(&self) -> Vec<String> {
        match &self.config.mode {
            DeploymentMode::Shared { stream } => vec![stream.clone()],
            DeploymentMode::PerDomain { primary, legacy } => {
                if primary == legacy {
                    vec![primary.clone()]
                } else {
                    vec![primary.clone(), legacy.clone()]
                }
            }
        }
    }

    /// Stream definition for a candidate.
    #[must_use]
    pub fn stream_spec(&self, name: &str) -> StreamSpec {
        StreamSpec::new(name, self.config.subjects.clone())
    }
}

impl Default for StreamResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}
