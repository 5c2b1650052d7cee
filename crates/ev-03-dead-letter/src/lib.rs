//! # ev-03-dead-letter
//!
//! Failure Classifier and Dead-Letter Router.
//!
//! [`classify`] maps a typed [`HandlerError`](shared_types::HandlerError)
//! to retryable or not; [`decide`] turns a processing outcome and the
//! delivery count into a [`Disposition`]; [`DeadLetterRouter`] moves a
//! message to `<prefix>.<reason>` with its original bytes and headers.
//!
//! Dead-lettered messages are never replayed automatically. When the
//! republish fails the caller must not terminate the original: it retries,
//! and only naks when the broker still has deliveries left for it.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{
    classify, decide, precheck, Classification, Disposition, HandlerOutcome, RetryPolicy,
    DEFAULT_RETRY_DELAY,
};
pub use error::{RouteError, RouteResult};
pub use ports::DeadLetterRouting;
pub use service::DeadLetterRouter;
