//! Governor configuration

pub mod config;

pub use config::{GovernorConfig, SaturationPolicy, DEFAULT_MAX_CONCURRENT};
