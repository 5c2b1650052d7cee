//! # Error Types
//!
//! Error types shared across the event-processing crates.

use std::io;
use thiserror::Error;

/// Errors from parsing a topic name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopicError {
    /// Topic name was empty.
    #[error("Topic name is empty")]
    Empty,

    /// A token contained characters outside `[a-z0-9_-]` or was empty.
    #[error("Invalid token '{token}' in topic '{topic}'")]
    InvalidToken { topic: String, token: String },
}

/// Failure raised by a topic handler.
///
/// The variant, not the message text, decides whether a delivery is
/// retried. Lower layers pick the variant when they raise the error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// Network or broker hiccup; the same input may succeed later.
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// The input itself is unacceptable to the handler.
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Business rule rejected the event.
    #[error("Permanent business failure: {0}")]
    PermanentBusiness(String),

    /// Handler failed without saying why. Treated as permanent.
    #[error("Unclassified failure: {0}")]
    Unclassified(String),
}

impl HandlerError {
    /// Short label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::TransientIo(_) => "transient_io",
            HandlerError::Validation(_) => "validation",
            HandlerError::PermanentBusiness(_) => "permanent_business",
            HandlerError::Unclassified(_) => "unclassified",
        }
    }
}

impl From<io::Error> for HandlerError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::AddrNotAvailable => HandlerError::TransientIo(err.to_string()),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                HandlerError::Validation(err.to_string())
            }
            _ => HandlerError::Unclassified(err.to_string()),
        }
    }
}
