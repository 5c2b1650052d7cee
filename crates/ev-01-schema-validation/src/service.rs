//! Schema Registry - per-topic schema sources and compiled cache

use crate::domain::{CompiledSchema, SchemaDocument};
use crate::error::{SchemaError, SchemaResult};
use crate::ports::inbound::SchemaValidation;
use parking_lot::RwLock;
use serde_json::Value;
use shared_types::{ValidationIssue, ValidationResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of topic schemas.
///
/// Sources are kept so the compiled cache can be rebuilt; each topic is
/// compiled at most once per registered source.
#[derive(Default)]
pub struct SchemaRegistry {
    sources: RwLock<HashMap<String, SchemaDocument>>,
    compiled: RwLock<HashMap<String, Arc<CompiledSchema>>>,
    compilations: AtomicU64,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the schema for `topic`.
    ///
    /// The schema is compiled immediately so authoring errors surface here.
    pub fn register(&self, topic: &str, document: SchemaDocument) -> SchemaResult<()> {
        let compiled = Arc::new(self.compile(&document)?);
        let version = compiled.version().map(str::to_string);

        // Lock order: sources, then compiled.
        let mut sources = self.sources.write();
        let mut cache = self.compiled.write();
        let replaced = sources.insert(topic.to_string(), document).is_some();
        cache.insert(topic.to_string(), compiled);

        info!(
            topic = topic,
            version = version.as_deref().unwrap_or("unversioned"),
            replaced,
            "Schema registered"
        );
        Ok(())
    }

    /// Parse JSON text and register it for `topic`.
    pub fn register_json(&self, topic: &str, text: &str) -> SchemaResult<()> {
        let document = SchemaDocument::from_json(text).map_err(|source| SchemaError::Parse {
            topic: topic.to_string(),
            source,
        })?;
        self.register(topic, document)
    }

    /// True if a schema is registered for `topic`.
    #[must_use]
    pub fn is_registered(&self, topic: &str) -> bool {
        self.sources.read().contains_key(topic)
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.sources.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Version tag of the schema registered for `topic`.
    #[must_use]
    pub fn version(&self, topic: &str) -> Option<String> {
        self.sources.read().get(topic).and_then(|d| d.version.clone())
    }

    /// Drop every compiled schema; sources are kept.
    pub fn clear_cache(&self) {
        self.compiled.write().clear();
    }

    /// Number of compilations performed so far.
    #[must_use]
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Compiled schema for `topic`, compiling on a cache miss.
    fn compiled_for(&self, topic: &str) -> Option<Arc<CompiledSchema>> {
        if let Some(hit) = self.compiled.read().get(topic) {
            return Some(Arc::clone(hit));
        }

        let sources = self.sources.read();
        let document = sources.get(topic)?;
        let mut cache = self.compiled.write();
        if let Some(hit) = cache.get(topic) {
            return Some(Arc::clone(hit));
        }

        // Registered sources already compiled once, so this cannot fail.
        let compiled = Arc::new(self.compile(document).ok()?);
        cache.insert(topic.to_string(), Arc::clone(&compiled));
        debug!(topic = topic, "Schema compiled on cache miss");
        Some(compiled)
    }

    fn compile(&self, document: &SchemaDocument) -> SchemaResult<CompiledSchema> {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        CompiledSchema::compile(document)
    }
}

impl SchemaValidation for SchemaRegistry {
    fn validate(&self, topic: &str, payload: &Value) -> ValidationResult {
        match self.compiled_for(topic) {
            Some(schema) => schema.validate(payload),
            None => ValidationResult::invalid(vec![ValidationIssue::new(
                "",
                format!("unknown topic '{topic}': no schema registered"),
            )]),
        }
    }
}
