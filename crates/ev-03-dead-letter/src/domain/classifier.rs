//! Failure classifier

use shared_types::HandlerError;

/// Whether a failed delivery is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
}

/// Classify a handler failure.
///
/// Only transient I/O is retried. Everything else, including failures the
/// handler did not classify, goes straight to the dead-letter subject.
#[must_use]
pub fn classify(error: &HandlerError) -> Classification {
    let retryable = match error {
        HandlerError::TransientIo(_) => true,
        HandlerError::Validation(_)
        | HandlerError::PermanentBusiness(_)
        | HandlerError::Unclassified(_) => false,
    };
    Classification { retryable }
}
