//! Per-provider retry decisions with capped exponential backoff and jitter.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;

use crate::error::ProviderErrorKind;

/// Configuration: 3 total attempts, base 1s, max 30s, ±25% jitter.
pub const MAX_ATTEMPTS: u32 = 3;
const INITIAL_INTERVAL_SECS: u64 = 1;
const MAX_INTERVAL_SECS: u64 = 30;
const JITTER_FRACTION: f64 = 0.25;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then attempt the same provider again.
    Retry(Duration),
    /// Record a terminal failure for this provider and move on.
    GiveUp,
}

/// Decides whether and how long to wait before repeating an attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    ceiling: Duration,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base: Duration::from_secs(INITIAL_INTERVAL_SECS),
            ceiling: Duration::from_secs(MAX_INTERVAL_SECS),
            jitter: JITTER_FRACTION,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, ceiling: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            ceiling,
            jitter: JITTER_FRACTION,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Jitter as a fraction of the nominal delay, clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32, kind: ProviderErrorKind) -> RetryDecision {
        if !kind.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.jittered_delay(attempt))
    }

    /// `base * 2^(attempt-1)`, capped at the ceiling, before jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.ceiling)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let mut backoff = ExponentialBackoff {
            current_interval: nominal,
            initial_interval: nominal,
            max_interval: nominal,
            randomization_factor: self.jitter,
            multiplier: 1.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.next_backoff().unwrap_or(nominal)
    }
}
