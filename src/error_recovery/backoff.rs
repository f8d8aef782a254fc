//! Retry backoff for failed provisioning steps
//!
//! The delay after the n-th consecutive failure is
//! `initial_delay * multiplier^(n-1)`, capped at `max_delay`, optionally
//! stretched by a random jitter. The sequence never decreases while failures
//! continue, and a success resets it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Longest delay any policy may produce
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for any delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
    /// Extra random delay as a fraction of the base delay (0.0 disables)
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// No delay at all; every tick retries
    pub fn disabled() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// `max_delay`, clamped to [`MAX_BACKOFF_DELAY`]
    pub fn cap(&self) -> Duration {
        self.max_delay.min(MAX_BACKOFF_DELAY)
    }

    /// Delay before the retry following failure number `failures` (1-based),
    /// without jitter
    pub fn base_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let cap = self.cap();
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            cap
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(cap)
        }
    }

    /// Jitter keeps delays non-decreasing only when it cannot exceed the
    /// growth between two steps
    pub fn is_monotonic(&self) -> bool {
        self.multiplier >= 1.0 && self.jitter_factor >= 0.0 && self.jitter_factor <= self.multiplier - 1.0
    }
}

/// Consecutive-failure counter producing retry delays
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let base = self.policy.base_delay(self.failures);

        let delay = if self.policy.jitter_factor > 0.0 && !base.is_zero() {
            let bound = base.as_secs_f64() * self.policy.jitter_factor;
            let extra = if bound.is_finite() && bound > 0.0 {
                rand::thread_rng().gen_range(0.0..=bound)
            } else {
                0.0
            };
            Duration::try_from_secs_f64(extra)
                .ok()
                .and_then(|extra| base.checked_add(extra))
                .unwrap_or(base)
                .min(self.policy.cap())
        } else {
            base
        };

        debug!("Backoff after {} failure(s): {:?}", self.failures, delay);
        delay
    }

    /// Record a failure that retrying soon cannot fix; waits the full cap
    pub fn max_out(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.policy.cap();
        debug!("Backoff after {} failure(s): {:?} (capped)", self.failures, delay);
        delay
    }

    /// Record a success
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

}
