//! Driving Ports (API - Inbound)

use crate::domain::ConsumerStatus;

/// Read-only view of running consumers, served by the status endpoint.
pub trait ConsumerStatusQuery: Send + Sync {
    fn statuses(&self) -> Vec<ConsumerStatus>;
}
