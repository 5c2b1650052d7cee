//! Ports for the Event Publisher
//!
//! The outbound side is the `StreamBroker` port from `shared-bus` and the
//! `SchemaValidation` port from the schema validator.

pub mod inbound;

pub use inbound::EventPublishing;
