//! Reconnection Policy
//!
//! Exponential backoff with optional jitter for stream reconnection.
//!
//! The n-th consecutive transient failure (counting from zero) waits
//! `min(max_delay, initial_delay * multiplier^n)`. With the defaults this
//! is 1s, 2s, 4s, 8s, ... capped at 64s. The retry count returns to zero
//! whenever a data frame is received.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::StreamSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after the first failure; the backoff time unit.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of consecutive reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0, // Unlimited
        }
    }
}

impl ReconnectConfig {
    /// Deterministic doubling from `initial_delay` up to `max_delay`.
    #[must_use]
    pub const fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Reconnection policy tracking consecutive transient failures.
///
/// # Example
///
/// ```rust
/// use filtered_stream_proxy::infrastructure::upstream::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let config = ReconnectConfig::exponential(Duration::from_secs(1), Duration::from_secs(64));
/// let mut policy = ReconnectPolicy::new(config);
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
///
/// // A data frame arrived
/// policy.reset();
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    retry_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            retry_count: 0,
        }
    }

    /// Delay before the next attempt; increments the retry count.
    ///
    /// Returns `None` if max attempts have been exceeded.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let delay = self.apply_jitter(self.base_delay(self.retry_count));
        self.retry_count = self.retry_count.saturating_add(1);

        Some(delay)
    }

    /// Reset after a successfully parsed data frame.
    pub const fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Consecutive backoff cycles since the last reset.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.retry_count < self.config.max_attempts
    }

    /// Un-jittered delay for the given retry count.
    fn base_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);

        #[allow(clippy::cast_precision_loss)]
        let scaled =
            (self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent))
                .round();
        let max_millis = self.config.max_delay.as_millis();

        let millis = if scaled.is_finite() && scaled >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            ..ReconnectConfig::exponential(Duration::from_secs(1), Duration::from_secs(64))
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(64));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!((config.jitter_factor - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn doubling_sequence_then_cap() {
        let mut policy = ReconnectPolicy::new(deterministic(0));

        let delays: Vec<u64> = (0..9)
            .map(|_| policy.next_delay().unwrap().as_secs())
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 64, 64]);
        assert_eq!(policy.retry_count(), 9);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut policy = ReconnectPolicy::new(deterministic(0));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.retry_count(), 3);

        policy.reset();

        assert_eq!(policy.retry_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn max_attempts() {
        let mut policy = ReconnectPolicy::new(deterministic(3));

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn huge_retry_count_stays_capped() {
        let policy = ReconnectPolicy::new(deterministic(0));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(64));
        assert_eq!(policy.base_delay(200), Duration::from_secs(64));
    }

    #[test]
    fn policy_jitter_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
                jitter_factor: 0.1,
                max_attempts: 0,
            });

            let millis = policy.next_delay().unwrap().as_millis();

            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }
}
