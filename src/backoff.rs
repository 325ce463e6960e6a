//! Backoff strategies for pacing failed drain cycles
//!
//! These pace the drainer's own polling loop after a delivery failure; retry
//! behavior inside the transport (connection re-establishment, HTTP retries)
//! belongs to the transport implementation, not here.

use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// How long to wait after the nth consecutive failure
pub trait Backoff: Send + Sync {
    /// Delay before the next attempt; `attempt` counts from zero.
    fn delay_for(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with random jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Jitter fraction of the capped delay, clamped to `0.0..=1.0`
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn delay_for(&self, attempt: u32) -> Duration {
        // Cap the exponent so the f64 math cannot overflow to infinity.
        let exponent = attempt.min(32) as i32;
        let raw = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max.as_millis() as f64);

        let spread = capped * self.jitter;
        let jittered = if spread > 0.0 {
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };
        let final_ms = jittered.clamp(0.0, self.max.as_millis() as f64);

        trace!(
            attempt,
            capped_ms = capped,
            final_ms,
            "Calculated backoff delay"
        );
        Duration::from_millis(final_ms as u64)
    }
}

/// Constant delay regardless of attempt count
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for ConstantBackoff {
    fn delay_for(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
