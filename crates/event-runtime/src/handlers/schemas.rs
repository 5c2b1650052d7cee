//! Schemas registered at startup for the built-in topics.

use ev_01_schema_validation::{SchemaRegistry, SchemaResult};

pub const HRV_RAW_RECEIVED: &str = "domain.hrv.raw-received";
pub const TRAINING_SESSION_COMPLETED: &str = "domain.training.session-completed";

const HRV_RAW_RECEIVED_SCHEMA: &str = r#"{
    "version": "1.0.0",
    "type": "object",
    "required": ["rmssd", "measuredAt"],
    "properties": {
        "rmssd": {"type": "number", "minimum": 0},
        "sdnn": {"type": "number", "minimum": 0},
        "restingHeartRate": {"type": "integer", "minimum": 20, "maximum": 250},
        "measuredAt": {"type": "string", "minLength": 1},
        "source": {"type": "string"}
    }
}"#;

const TRAINING_SESSION_COMPLETED_SCHEMA: &str = r#"{
    "version": "1.0.0",
    "type": "object",
    "required": ["sessionId", "durationMinutes"],
    "properties": {
        "sessionId": {"type": "string", "minLength": 1},
        "durationMinutes": {"type": "integer", "minimum": 0},
        "perceivedExertion": {"type": "integer", "minimum": 1, "maximum": 10},
        "sport": {"type": "string"}
    }
}"#;

/// Topic name and schema source for every built-in topic.
pub const BUILTIN_SCHEMAS: [(&str, &str); 2] = [
    (HRV_RAW_RECEIVED, HRV_RAW_RECEIVED_SCHEMA),
    (TRAINING_SESSION_COMPLETED, TRAINING_SESSION_COMPLETED_SCHEMA),
];

pub fn register_builtin_schemas(registry: &SchemaRegistry) -> SchemaResult<()> {
    for (topic, schema) in BUILTIN_SCHEMAS {
        registry.register_json(topic, schema)?;
    }
    Ok(())
}
