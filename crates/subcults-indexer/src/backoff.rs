//! Exponential backoff with jitter for dial retries.

use std::time::Duration;

use rand::Rng;

use crate::config::ClientConfig;

/// Retry timing derived from the client configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for attempt 0.
    pub base_delay: Duration,
    /// Ceiling applied before jitter.
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]`.
    pub jitter: f64,
}

impl BackoffPolicy {
    /// Create a policy. `jitter` is clamped to `[0, 1]`; NaN disables it.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: clamp_jitter(jitter),
        }
    }

    /// Build the policy from a validated configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.jitter)
    }

    /// Delay for `attempt` before jitter: `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let max_nanos = self.max_delay.as_nanos();
        let raw = 1u128
            .checked_shl(attempt)
            .and_then(|factor| self.base_delay.as_nanos().checked_mul(factor))
            .unwrap_or(u128::MAX);

        if raw >= max_nanos {
            return self.max_delay;
        }
        u64::try_from(raw).map_or(self.max_delay, Duration::from_nanos)
    }

    /// Delay for `attempt` using the thread-local random source.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        compute_backoff(attempt, self, &mut rand::thread_rng())
    }
}

/// Compute the retry delay for `attempt` (zero-based).
///
/// The raw delay is scaled by a factor drawn uniformly from
/// `[1 - jitter/2, 1 + jitter/2]` when jitter is non-zero.
#[must_use]
pub fn compute_backoff<R: Rng>(attempt: u32, policy: &BackoffPolicy, rng: &mut R) -> Duration {
    let raw = policy.raw_delay(attempt);
    let jitter = clamp_jitter(policy.jitter);
    if jitter <= 0.0 {
        return raw;
    }

    let half = jitter / 2.0;
    let factor = rng.gen_range((1.0 - half)..=(1.0 + half));
    Duration::try_from_secs_f64(raw.as_secs_f64() * factor).unwrap_or(raw)
}

fn clamp_jitter(jitter: f64) -> f64 {
    if jitter.is_nan() {
        0.0
    } else {
        jitter.clamp(0.0, 1.0)
    }
}
