//! Exponential backoff for transient publish failures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff schedule for `publish_with_retry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Retries after the first attempt (0 = no retries)
    pub max_retries: u32,
    /// Jitter as a fraction of the delay (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_retries: 3,
            jitter_factor: 0.2,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry `retry` (1-based), with random jitter.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(0.0..1.0)
        } else {
            0.5
        };
        self.delay_with_jitter(retry, jitter)
    }

    /// Delay before retry `retry` with an explicit jitter sample in `[0, 1)`.
    #[must_use]
    pub fn delay_with_jitter(&self, retry: u32, jitter: f64) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        // Microseconds keep small delays exact.
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let max_us = self.max_delay.as_micros() as f64;
        let base_us =
            (self.initial_delay.as_micros() as f64 * self.multiplier.powi(exponent)).min(max_us);
        let offset_us = (jitter * 2.0 - 1.0) * base_us * self.jitter_factor.clamp(0.0, 1.0);
        Duration::from_micros((base_us + offset_us).clamp(0.0, max_us) as u64)
    }
}
