//! Reconnection schedule

use std::time::Duration;

use backoff::ExponentialBackoff;

/// Exponential reconnect schedule bounded by an attempt count.
///
/// Retry `n` (1-based) waits `base_delay * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,

    /// Retries allowed after a session is lost (0 = never retry)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic backoff for the session driver.
    ///
    /// Jitter is disabled and elapsed time is unbounded; the attempt count
    /// is what ends retrying.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether another retry is allowed after `attempts` retries so far
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
