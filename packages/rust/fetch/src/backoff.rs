//! Exponential backoff policy for rate-limited upstream calls.

use std::time::Duration;

use glossgen_shared::config::RetrySettings;
use rand::Rng;

/// Upper bound (exclusive) of the uniform jitter added to each delay.
const JITTER_MAX_MS: u64 = 1000;

/// Runtime retry configuration, passed explicitly into constructors.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Base delay; the wait after failed attempt `n` is `base * 2^n` plus jitter.
    pub base_delay: Duration,
    /// Total attempts per key, including the first (so 3 means 2 retries).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after failed attempt `attempt` (0-based):
    /// `base * 2^attempt + jitter`, jitter uniformly drawn from [0, 1000 ms).
    ///
    /// Saturating arithmetic; no cap beyond what `max_attempts` implies.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        let jitter_ms = rand::thread_rng().gen_range(0..JITTER_MAX_MS);
        Duration::from_millis(exp_ms.saturating_add(jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_within_jitter_window() {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(500),
            max_attempts: 3,
        };

        for attempt in 0..4u32 {
            let floor = 500u64 * 2u64.pow(attempt);
            let ceiling = floor + JITTER_MAX_MS;
            // Jitter is random; sample repeatedly to exercise the range.
            for _ in 0..50 {
                let delay = retry.delay_for(attempt).as_millis() as u64;
                assert!(delay >= floor, "attempt {attempt}: {delay} < {floor}");
                assert!(delay < ceiling, "attempt {attempt}: {delay} >= {ceiling}");
            }
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_attempts: 3,
        };
        // Strip jitter by comparing floors.
        let floor = |attempt: u32| 100u64 * 2u64.pow(attempt);
        assert_eq!(floor(0), 100);
        assert_eq!(floor(1), 200);
        assert_eq!(floor(2), 400);
        assert!(retry.delay_for(2).as_millis() as u64 >= floor(2));
    }

    #[test]
    fn huge_attempt_saturates_instead_of_panicking() {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(u64::MAX / 2),
            max_attempts: 3,
        };
        let delay = retry.delay_for(63);
        assert!(delay >= Duration::from_millis(u64::MAX - JITTER_MAX_MS));
    }

    #[test]
    fn config_from_settings() {
        let settings = RetrySettings {
            base_delay_ms: 250,
            max_attempts: 5,
        };
        let retry = RetryConfig::from(&settings);
        assert_eq!(retry.base_delay, Duration::from_millis(250));
        assert_eq!(retry.max_attempts, 5);
    }
}
