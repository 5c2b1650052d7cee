//! Ports for the Durable Consumer
//!
//! The broker side is the `StreamBroker` port from `shared-bus`; dead
//! letters go through `DeadLetterRouting` from the dead-letter crate.

pub mod inbound;
pub mod outbound;

pub use inbound::ConsumerStatusQuery;
pub use outbound::TopicHandler;
