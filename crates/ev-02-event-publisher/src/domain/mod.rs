//! Domain module for the Event Publisher

pub mod retry;

pub use retry::BackoffConfig;
