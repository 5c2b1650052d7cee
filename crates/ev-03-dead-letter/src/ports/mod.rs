//! Ports for the Dead-Letter Router

pub mod inbound;

pub use inbound::DeadLetterRouting;
