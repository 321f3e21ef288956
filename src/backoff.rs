//! Reconnect backoff policy.
//!
//! Linear backoff capped at a ceiling: the delay before reconnect attempt `n`
//! is `min(n * step, ceiling)`. With the defaults this is
//! `min(n * 50ms, 2000ms)`, saturating from the 40th attempt onward.
//!
//! The policy is stateless. The attempt counter belongs to the caller
//! (see [`crate::cache`]), which passes it in on every call.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tether::backoff::{backoff, ReconnectPolicy};
//!
//! assert_eq!(backoff(1), 50);
//! assert_eq!(backoff(1000), 2000);
//!
//! let policy = ReconnectPolicy::default();
//! assert_eq!(policy.delay(10), Duration::from_millis(500));
//! ```

use std::time::Duration;

/// Delay added per consecutive failed attempt, in milliseconds.
pub const DEFAULT_STEP_MS: u64 = 50;

/// Maximum delay the policy will ever return, in milliseconds.
pub const DEFAULT_CEILING_MS: u64 = 2000;

/// Milliseconds to wait before reconnect attempt `attempt`.
///
/// `attempt` is the 1-indexed count of consecutive failures since the last
/// successful connection. An attempt of 0 means nothing has failed yet and
/// yields no delay.
#[must_use]
pub const fn backoff(attempt: u32) -> u64 {
    linear_capped(attempt, DEFAULT_STEP_MS, DEFAULT_CEILING_MS)
}

const fn linear_capped(attempt: u32, step_ms: u64, ceiling_ms: u64) -> u64 {
    let delay = (attempt as u64).saturating_mul(step_ms);
    if delay < ceiling_ms {
        delay
    } else {
        ceiling_ms
    }
}

/// Capped linear reconnect policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay added per consecutive failure.
    pub step: Duration,
    /// Upper bound on any single delay.
    pub ceiling: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(DEFAULT_STEP_MS),
            ceiling: Duration::from_millis(DEFAULT_CEILING_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with the given step and ceiling.
    #[must_use]
    pub const fn new(step: Duration, ceiling: Duration) -> Self {
        Self { step, ceiling }
    }

    /// Delay before reconnect attempt `attempt` (1-indexed, 0 yields zero).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(linear_capped(
            attempt,
            duration_millis(self.step),
            duration_millis(self.ceiling),
        ))
    }

    /// First attempt at which the ceiling is reached, if the step is non-zero.
    #[must_use]
    pub fn saturation_attempt(&self) -> Option<u32> {
        let step = duration_millis(self.step);
        if step == 0 {
            return None;
        }
        let ceiling = duration_millis(self.ceiling);
        u32::try_from(ceiling.div_ceil(step)).ok()
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
