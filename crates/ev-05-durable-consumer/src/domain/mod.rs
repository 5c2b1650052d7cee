//! Domain module for the Durable Consumer

pub mod config;
pub mod registry;
pub mod stats;

pub use config::{ConsumerConfig, ConsumerLifecycle};
pub use registry::{TopicRegistry, TopicRegistryBuilder};
pub use stats::{ConsumerState, ConsumerStats, ConsumerStatsSnapshot, ConsumerStatus};
