//! Cross-crate integration scenarios.

pub mod fixtures;

mod concurrency;
mod end_to_end;
mod redelivery;
mod schema_gate;
mod webhook;
