//! Error types for the Concurrency Governor

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GovernorError {
    #[error("max_concurrent must be at least 1 for topic {topic}")]
    InvalidLimit { topic: String },

    /// The slot semaphore was closed while waiting.
    #[error("Concurrency governor for {topic} is closed")]
    Closed { topic: String },
}

pub type GovernorResult<T> = Result<T, GovernorError>;
