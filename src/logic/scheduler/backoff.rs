//! Backoff Policy
//!
//! Exponential wait from `base`, doubling per attempt, plus up to 20% jitter,
//! never above `max`. A server `retry_after` hint wins when larger, still
//! capped at `max`.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the random jitter, as a fraction of the delay
const JITTER: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Consecutive backoffs allowed before the cycle is abandoned
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            max_retries,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let exp = self.base.saturating_mul(1u32 << exponent).min(self.max);
        let jitter = rand::thread_rng().gen_range(0.0..=JITTER);
        // Out of Duration range only when already near `max`
        let jittered = Duration::try_from_secs_f64(exp.as_secs_f64() * (1.0 + jitter))
            .unwrap_or(self.max);

        let delay = match retry_after {
            Some(hint) if hint > jittered => hint,
            _ => jittered,
        };
        delay.min(self.max)
    }

    /// Whether `failures` consecutive failures exceed the budget
    pub fn exhausted(&self, failures: u32) -> bool {
        failures > self.max_retries
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        use crate::constants;

        Self::new(
            Duration::from_secs(constants::DEFAULT_BACKOFF_BASE),
            Duration::from_secs(constants::DEFAULT_BACKOFF_MAX),
            constants::DEFAULT_MAX_RETRIES,
        )
    }
}
