//! Bounded exponential backoff for file sends.

use std::time::Duration;

use uplink_config::RetrySettings;

/// Attempt budget and delay schedule for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    initial: Duration,
    max: Duration,
    multiplier: u32,
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempts` consecutive failures (1-based).
    #[must_use]
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Whether another attempt is allowed after `attempts` tries.
    #[must_use]
    pub const fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial: settings.initial_backoff(),
            max: settings.max_backoff(),
            multiplier: settings.multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}
