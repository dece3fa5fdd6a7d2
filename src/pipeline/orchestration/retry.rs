use crate::config::JobSettings;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter for terminal record writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total time spent retrying before giving up.
    pub deadline: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&JobSettings::default())
    }
}

impl From<&JobSettings> for RetryPolicy {
    fn from(settings: &JobSettings) -> Self {
        Self {
            deadline: settings.write_deadline(),
            initial_backoff: Duration::from_millis(settings.write_backoff_ms),
            max_backoff: Duration::from_millis(settings.write_backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), never above `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff);
        let half = base / 2;
        let jitter_ms = rand::rng().random_range(0..=half.as_millis() as u64);
        (half + Duration::from_millis(jitter_ms)).min(self.max_backoff)
    }
}
