//! Exponential backoff with jitter.
//!
//! Used by the channel readers to re-join a multicast group and by the
//! subscriber loops to retry a failing log file.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Jitter applied to every delay, as a fraction (0.1 = ±10%).
const JITTER_FACTOR: f64 = 0.1;

/// Delay bounds for a [`Backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_ms: u64,
    /// Upper bound for any delay.
    pub max_ms: u64,
}

impl BackoffConfig {
    pub const fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self { initial_ms, max_ms }
    }
}

/// Doubling delay, capped at the configured maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let initial = Duration::from_millis(config.initial_ms);
        Self {
            initial,
            max: Duration::from_millis(config.max_ms),
            current: initial,
            attempts: 0,
        }
    }

    /// Returns the delay to wait before the next attempt and advances the policy.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);

        let factor = rand::thread_rng().gen_range(1.0 - JITTER_FACTOR..=1.0 + JITTER_FACTOR);
        let delay = self.current.mul_f64(factor).min(self.max);

        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
