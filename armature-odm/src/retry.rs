//! Backoff schedule for document fetches.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fetch retry policy.
///
/// The delay after failed attempt `n` (0-indexed) is
/// `unit * n * max(n, 1)`: no delay after the first failure, then
/// 1, 4, 9, ... units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Backoff time unit.
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(retries: u32, unit: Duration) -> Self {
        Self { retries, unit }
    }

    /// Same unit, different retry count.
    pub fn with_retries(self, retries: u32) -> Self {
        Self { retries, ..self }
    }

    /// Total number of attempts.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay after the given failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_mul(attempt.max(1));
        self.unit.saturating_mul(factor)
    }

    /// Sum of all delays when every attempt fails.
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.attempts())
            .map(|attempt| self.delay_for_attempt(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
