//! # ev-01-schema-validation
//!
//! Schema Validator: per-topic payload schemas, compiled once and shared.
//!
//! ## Overview
//!
//! - **Registration**: a schema source per topic; authoring errors are
//!   reported when the schema is registered.
//! - **Validation**: `validate(topic, payload)` is pure and never fails;
//!   an invalid payload is a normal `ValidationResult`.
//! - **Caching**: compiled schemas are cached behind a `RwLock`; a cache
//!   miss compiles exactly once per topic.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ev_01_schema_validation::{SchemaRegistry, SchemaValidation};
//!
//! let registry = SchemaRegistry::new();
//! registry.register_json("domain.hrv.raw-received", include_str!("hrv.json"))?;
//!
//! let result = registry.validate("domain.hrv.raw-received", &payload);
//! if !result.valid {
//!     tracing::warn!(errors = %result.summary(), "Rejected payload");
//! }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{CompiledSchema, JsonType, SchemaDocument, TypeSpec};
pub use error::{SchemaError, SchemaResult};
pub use ports::SchemaValidation;
pub use service::SchemaRegistry;
