//! # ev-04-concurrency-governor
//!
//! Concurrency Governor: bounds simultaneous handler executions per topic.
//!
//! A slot is taken before the handler runs and released by the
//! [`SlotGuard`] destructor, so success, error and panic unwinding all free
//! it. `event_handlers_in_flight{topic}` follows every change.
//!
//! When all slots are taken, [`SaturationPolicy`] decides:
//!
//! | Policy | Effect |
//! |---|---|
//! | `Block` (default) | puller waits for a slot |
//! | `Defer` | delivery nak'ed with the retry delay |
//! | `Shed` | delivery acked unprocessed, `event_capacity_exceeded_total` incremented |

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod service;

pub use domain::{GovernorConfig, SaturationPolicy, DEFAULT_MAX_CONCURRENT};
pub use error::{GovernorError, GovernorResult};
pub use service::{Admission, ConcurrencyGovernor, SlotGuard};
