//! Ports for the Schema Validator

pub mod inbound;

pub use inbound::SchemaValidation;
