//! Bounded retry with exponential backoff for responder calls

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many times a failed responder call is retried, and how long to wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, up to `max_retries` times
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            backoff_multiplier: 1.0,
            max_delay_ms: 0,
        }
    }

    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// Total attempts including the first call
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: usize) -> Duration {
        if retry == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("max_delay_ms must not be below initial_delay_ms".into());
        }
        Ok(())
    }
}
