//! Schema source documents.
//!
//! A subset of JSON Schema: `type`, `required`, `properties`,
//! `additionalProperties` (bool), `enum`, `minimum`/`maximum`,
//! `minLength`/`maxLength`, `items`, `minItems`/`maxItems`, plus a
//! top-level `version` tag. Unknown keywords such as `$schema`, `title`
//! or `description` are ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `type` keyword: a single name or a list of names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    /// `"type": "string"`
    Single(String),
    /// `"type": ["string", "null"]`
    Many(Vec<String>),
}

impl TypeSpec {
    /// Type names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            TypeSpec::Single(name) => vec![name.as_str()],
            TypeSpec::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// A schema node as written by the schema author.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    /// Schema version tag, e.g. `"1.0.0"`. Meaningful on the root only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Accepted JSON types.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_spec: Option<TypeSpec>,

    /// Properties that must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    /// Declared properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaDocument>,

    /// Whether undeclared properties are allowed (default true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,

    /// Allowed values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,

    /// Inclusive numeric lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive numeric upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    /// Minimum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Maximum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Schema for every array element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaDocument>>,

    /// Minimum array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,

    /// Maximum array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

impl SchemaDocument {
    /// Parse a schema from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
