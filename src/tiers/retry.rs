//! Retry policy with exponential backoff
//!
//! Pure computation of backoff delays and retry budgets. The router owns the
//! actual sleeping; nothing here has side effects.

use std::time::Duration;

use rand::Rng;

use super::error::ErrorCategory;

/// Jitter multiplier range applied to every delay
const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.5;

/// Backoff and attempt budget for one tier
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per tier trial, including the first call
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive retries
    pub exponential_base: f64,
    /// Randomize delays in [0.5, 1.5] x base to spread concurrent retries
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay for the given zero-based retry index
    ///
    /// `min(max_delay, base_delay * exponential_base^attempt)`, non-decreasing
    /// in `attempt` for any base >= 1.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let factor = self.exponential_base.powi(exponent);
        let raw_secs = self.base_delay.as_secs_f64() * factor;
        if !raw_secs.is_finite() || raw_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        if raw_secs <= 0.0 {
            return Duration::ZERO;
        }
        self.base_delay.mul_f64(factor)
    }

    /// Delay to sleep before the retry with zero-based index `attempt`
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        delay.mul_f64(factor)
    }

    /// Delay honoring a server-provided retry-after hint, capped at `max_delay`
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.compute_delay(attempt);
        match retry_after {
            Some(hint) => delay.max(hint).min(self.max_delay),
            None => delay,
        }
    }

    /// Whether a failed call with 1-based number `attempt` should be retried
    pub fn should_retry(&self, attempt: u32, category: ErrorCategory) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        category != ErrorCategory::Permanent
    }
}
