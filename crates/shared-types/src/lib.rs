//! # Shared Types Crate
//!
//! Domain vocabulary shared by every event-processing crate: the
//! `EventEnvelope`, topics and subjects, delivery metadata, dead-letter
//! reasons and the typed handler error taxonomy.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Static Subject Space**: A `Topic` maps 1:1 to its `Subject`; there is
//!   no wildcard or dynamic subject creation.
//! - **Typed Failures**: `HandlerError` variants, not message text, drive
//!   retry decisions.

pub mod entities;
pub mod envelope;
pub mod errors;

pub use entities::*;
pub use envelope::*;
pub use errors::*;
