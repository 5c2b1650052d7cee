//! Domain module for the Schema Validator
//!
//! - document: schema source grammar
//! - compiled: compiled schemas and payload validation

pub mod compiled;
pub mod document;

pub use compiled::{CompiledSchema, JsonType};
pub use document::{SchemaDocument, TypeSpec};
