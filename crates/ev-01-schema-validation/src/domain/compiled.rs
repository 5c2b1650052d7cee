//! Compiled schemas.
//!
//! Compilation resolves type names and checks bounds once, so validation
//! is a pure walk over the payload.

use crate::domain::document::SchemaDocument;
use crate::error::{SchemaError, SchemaResult};
use serde_json::Value;
use shared_types::{ValidationIssue, ValidationResult};
use std::fmt;

/// JSON value types a schema can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "object" => Some(JsonType::Object),
            "array" => Some(JsonType::Array),
            "string" => Some(JsonType::String),
            "integer" => Some(JsonType::Integer),
            "number" => Some(JsonType::Number),
            "boolean" => Some(JsonType::Boolean),
            "null" => Some(JsonType::Null),
            _ => None,
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::String => value.is_string(),
            JsonType::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            JsonType::Number => value.is_number(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Null => value.is_null(),
        }
    }

    fn of(value: &Value) -> &'static str {
        match value {
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::String(_) => "string",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::String => "string",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct Node {
    types: Vec<JsonType>,
    required: Vec<String>,
    properties: Vec<(String, Node)>,
    additional_properties: bool,
    enum_values: Option<Vec<Value>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    items: Option<Box<Node>>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

/// A schema ready for validation.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    version: Option<String>,
    root: Node,
}

impl CompiledSchema {
    /// Compile a schema document.
    pub fn compile(document: &SchemaDocument) -> SchemaResult<Self> {
        Ok(Self {
            version: document.version.clone(),
            root: compile_node(document, "")?,
        })
    }

    /// Version tag of the schema, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Validate a payload, collecting every issue.
    #[must_use]
    pub fn validate(&self, payload: &Value) -> ValidationResult {
        let mut issues = Vec::new();
        validate_node(&self.root, payload, "", &mut issues);
        ValidationResult::from_issues(issues)
    }
}

fn compile_node(doc: &SchemaDocument, path: &str) -> SchemaResult<Node> {
    let types = match &doc.type_spec {
        None => Vec::new(),
        Some(spec) => spec
            .names()
            .into_iter()
            .map(|name| {
                JsonType::parse(name).ok_or_else(|| SchemaError::UnsupportedType {
                    path: display_path(path),
                    type_name: name.to_string(),
                })
            })
            .collect::<SchemaResult<Vec<_>>>()?,
    };

    check_bounds(path, "minimum", doc.minimum, "maximum", doc.maximum)?;
    check_bounds(
        path,
        "minLength",
        doc.min_length.map(|v| v as f64),
        "maxLength",
        doc.max_length.map(|v| v as f64),
    )?;
    check_bounds(
        path,
        "minItems",
        doc.min_items.map(|v| v as f64),
        "maxItems",
        doc.max_items.map(|v| v as f64),
    )?;

    let additional_properties = doc.additional_properties.unwrap_or(true);
    if !additional_properties {
        if let Some(missing) = doc
            .required
            .iter()
            .find(|name| !doc.properties.contains_key(*name))
        {
            return Err(SchemaError::UndeclaredRequired {
                path: display_path(path),
                property: missing.clone(),
            });
        }
    }

    let properties = doc
        .properties
        .iter()
        .map(|(name, child)| {
            compile_node(child, &child_path(path, name)).map(|node| (name.clone(), node))
        })
        .collect::<SchemaResult<Vec<_>>>()?;

    let items = match &doc.items {
        Some(child) => Some(Box::new(compile_node(child, &format!("{path}/items"))?)),
        None => None,
    };

    Ok(Node {
        types,
        required: doc.required.clone(),
        properties,
        additional_properties,
        enum_values: doc.enum_values.clone(),
        minimum: doc.minimum,
        maximum: doc.maximum,
        min_length: doc.min_length,
        max_length: doc.max_length,
        items,
        min_items: doc.min_items,
        max_items: doc.max_items,
    })
}

fn check_bounds(
    path: &str,
    low_name: &str,
    low: Option<f64>,
    high_name: &str,
    high: Option<f64>,
) -> SchemaResult<()> {
    if let (Some(low), Some(high)) = (low, high) {
        if low > high {
            return Err(SchemaError::InvalidBounds {
                path: display_path(path),
                reason: format!("{low_name} {low} > {high_name} {high}"),
            });
        }
    }
    Ok(())
}

fn validate_node(node: &Node, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    if !node.types.is_empty() && !node.types.iter().any(|t| t.matches(value)) {
        let expected = node
            .types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        issues.push(ValidationIssue::new(
            path,
            format!("expected {expected}, found {}", JsonType::of(value)),
        ));
        return;
    }

    if let Some(allowed) = &node.enum_values {
        if !allowed.contains(value) {
            issues.push(ValidationIssue::new(
                path,
                format!("value {value} is not one of the allowed values"),
            ));
        }
    }

    match value {
        Value::Object(map) => {
            for name in &node.required {
                if !map.contains_key(name) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("missing required property '{name}'"),
                    ));
                }
            }
            for (name, child) in &node.properties {
                if let Some(child_value) = map.get(name) {
                    validate_node(child, child_value, &child_path(path, name), issues);
                }
            }
            if !node.additional_properties {
                for name in map.keys() {
                    if !node.properties.iter().any(|(declared, _)| declared == name) {
                        issues.push(ValidationIssue::new(
                            child_path(path, name),
                            "property is not allowed",
                        ));
                    }
                }
            }
        }
        Value::Array(elements) => {
            if let Some(min) = node.min_items {
                if elements.len() < min {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("expected at least {min} items, found {}", elements.len()),
                    ));
                }
            }
            if let Some(max) = node.max_items {
                if elements.len() > max {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("expected at most {max} items, found {}", elements.len()),
                    ));
                }
            }
            if let Some(items) = &node.items {
                for (index, element) in elements.iter().enumerate() {
                    validate_node(items, element, &format!("{path}/{index}"), issues);
                }
            }
        }
        Value::String(s) => {
            let length = s.chars().count();
            if let Some(min) = node.min_length {
                if length < min {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("string shorter than {min} characters"),
                    ));
                }
            }
            if let Some(max) = node.max_length {
                if length > max {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("string longer than {max} characters"),
                    ));
                }
            }
        }
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                if let Some(min) = node.minimum {
                    if v < min {
                        issues.push(ValidationIssue::new(
                            path,
                            format!("value {v} is below minimum {min}"),
                        ));
                    }
                }
                if let Some(max) = node.maximum {
                    if v > max {
                        issues.push(ValidationIssue::new(
                            path,
                            format!("value {v} is above maximum {max}"),
                        ));
                    }
                }
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

/// Append a JSON pointer token, escaping `~` and `/`.
fn child_path(parent: &str, token: &str) -> String {
    format!("{parent}/{}", token.replace('~', "~0").replace('/', "~1"))
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(schema: Value) -> CompiledSchema {
        let doc: SchemaDocument = serde_json::from_value(schema).unwrap();
        CompiledSchema::compile(&doc).unwrap()
    }

    fn hrv_schema() -> CompiledSchema {
        compile(json!({
            "version": "1.0.0",
            "type": "object",
            "required": ["userId", "rmssd", "source"],
            "properties": {
                "userId": {"type": "string", "minLength": 1},
                "rmssd": {"type": "number", "minimum": 0, "maximum": 500},
                "source": {"enum": ["whoop", "oura", "manual"]},
                "samples": {"type": "array", "items": {"type": "integer"}, "maxItems": 3}
            },
            "additionalProperties": false
        }))
    }

    #[test]
    fn test_valid_payload() {
        let result = hrv_schema().validate(&json!({
            "userId": "u1", "rmssd": 42.5, "source": "oura", "samples": [1, 2]
        }));
        assert!(result.valid, "{}", result.summary());
        assert_eq!(hrv_schema().version(), Some("1.0.0"));
    }

    #[test]
    fn test_collects_every_issue_with_paths() {
        let result = hrv_schema().validate(&json!({
            "rmssd": -1,
            "source": "garmin",
            "samples": [1, "two", 3, 4],
            "extra": true
        }));
        assert!(!result.valid);
        let paths: Vec<&str> = result.errors.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&""), "missing userId reported at root");
        assert!(paths.contains(&"/rmssd"));
        assert!(paths.contains(&"/source"));
        assert!(paths.contains(&"/samples"));
        assert!(paths.contains(&"/samples/1"));
        assert!(paths.contains(&"/extra"));
    }

    #[test]
    fn test_root_type_mismatch_stops_descent() {
        let result = hrv_schema().validate(&json!("not an object"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "expected object, found string");
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        let schema = compile(json!({"type": "integer"}));
        assert!(schema.validate(&json!(3)).valid);
        assert!(schema.validate(&json!(3.0)).valid);
        assert!(!schema.validate(&json!(3.5)).valid);
    }

    #[test]
    fn test_nullable_type_list() {
        let schema = compile(json!({"type": ["string", "null"], "maxLength": 2}));
        assert!(schema.validate(&json!(null)).valid);
        assert!(schema.validate(&json!("ab")).valid);
        assert!(!schema.validate(&json!("abc")).valid);
        assert!(!schema.validate(&json!(1)).valid);
    }

    #[test]
    fn test_pointer_escaping() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"a/b": {"type": "string"}}
        }));
        let result = schema.validate(&json!({"a/b": 1}));
        assert_eq!(result.errors[0].path, "/a~1b");
    }

    #[test]
    fn test_compile_rejects_bad_schemas() {
        let unknown: SchemaDocument = serde_json::from_value(json!({"type": "date"})).unwrap();
        assert!(matches!(
            CompiledSchema::compile(&unknown),
            Err(SchemaError::UnsupportedType { .. })
        ));

        let bounds: SchemaDocument = serde_json::from_value(json!({
            "type": "object",
            "properties": {"x": {"minimum": 5, "maximum": 1}}
        }))
        .unwrap();
        match CompiledSchema::compile(&bounds) {
            Err(SchemaError::InvalidBounds { path, .. }) => assert_eq!(path, "/x"),
            other => panic!("unexpected {other:?}"),
        }

        let undeclared: SchemaDocument = serde_json::from_value(json!({
            "type": "object",
            "required": ["a"],
            "additionalProperties": false
        }))
        .unwrap();
        assert!(matches!(
            CompiledSchema::compile(&undeclared),
            Err(SchemaError::UndeclaredRequired { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_string_length_bounds(s in "\\PC{0,12}") {
            let schema = compile(json!({"type": "string", "minLength": 2, "maxLength": 8}));
            let length = s.chars().count();
            let expected = (2..=8).contains(&length);
            proptest::prop_assert_eq!(schema.validate(&json!(s)).valid, expected);
        }

        #[test]
        fn prop_numeric_bounds(v in -1000.0f64..1000.0) {
            let schema = compile(json!({"type": "number", "minimum": 0, "maximum": 500}));
            let expected = (0.0..=500.0).contains(&v);
            proptest::prop_assert_eq!(schema.validate(&json!(v)).valid, expected);
        }
    }
}
