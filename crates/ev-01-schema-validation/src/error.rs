//! Error types for the Schema Validator
//!
//! Only schema *registration* can fail. Validating a payload never returns
//! an error; an invalid payload is a normal `ValidationResult`.

use thiserror::Error;

/// Schema registration errors
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema source is not valid JSON or does not match the schema grammar
    #[error("Schema for topic {topic} could not be parsed: {source}")]
    Parse {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Unknown `type` name
    #[error("Schema at {path} uses unsupported type '{type_name}'")]
    UnsupportedType { path: String, type_name: String },

    /// Contradictory bounds, e.g. `minimum > maximum`
    #[error("Schema at {path} has contradictory bounds: {reason}")]
    InvalidBounds { path: String, reason: String },

    /// A required property is not declared while undeclared properties are forbidden
    #[error("Schema at {path} requires undeclared property '{property}'")]
    UndeclaredRequired { path: String, property: String },
}

/// Result type for schema registration
pub type SchemaResult<T> = Result<T, SchemaError>;
