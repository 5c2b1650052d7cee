//! Failure classification and per-message disposition

pub mod classifier;
pub mod disposition;

pub use classifier::{classify, Classification};
pub use disposition::{decide, precheck, Disposition, HandlerOutcome, RetryPolicy, DEFAULT_RETRY_DELAY};
