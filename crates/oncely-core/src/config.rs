//! Orchestrator configuration

use std::time::Duration;

use oncely_common::{DEFAULT_KEY_PREFIX, IdempotencyError};

/// Smallest interval between two lock renewals
pub const MIN_RENEWAL_INTERVAL: Duration = Duration::from_millis(500);

/// Tunables consumed by `Idempotency`
///
/// A zero `result_ttl` or `lock_ttl` means the entry never expires; a zero
/// `wait_timeout` leaves waiting bounded only by the caller's context.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// How long a successful result stays memoized
    pub result_ttl: Duration,
    /// Lock lifetime; bounds how long a crashed owner blocks the key
    pub lock_ttl: Duration,
    /// Upper bound on waiting for another owner's result
    pub wait_timeout: Duration,
    /// First poll interval while another owner holds the key
    pub poll_interval_min: Duration,
    /// Poll interval ceiling
    pub poll_interval_max: Duration,
    /// Namespace prepended to every key before it reaches the store
    pub key_prefix: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(24 * 60 * 60),
            lock_ttl: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(10),
            poll_interval_min: Duration::from_millis(50),
            poll_interval_max: Duration::from_millis(500),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl IdempotencyConfig {
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, min: Duration, max: Duration) -> Self {
        self.poll_interval_min = min;
        self.poll_interval_max = max;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> Result<(), IdempotencyError> {
        if self.poll_interval_min.is_zero() {
            return Err(IdempotencyError::ConfigError(
                "poll_interval_min must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_min > self.poll_interval_max {
            return Err(IdempotencyError::ConfigError(format!(
                "poll_interval_min ({:?}) exceeds poll_interval_max ({:?})",
                self.poll_interval_min, self.poll_interval_max
            )));
        }
        Ok(())
    }

    /// Renewal period for the lock watchdog, `None` when locks never expire
    pub fn renewal_interval(&self) -> Option<Duration> {
        if self.lock_ttl.is_zero() {
            None
        } else {
            Some((self.lock_ttl / 2).max(MIN_RENEWAL_INTERVAL))
        }
    }

    pub fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IdempotencyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval_min, Duration::from_millis(50));
        assert_eq!(config.poll_interval_max, Duration::from_millis(500));
        assert_eq!(config.key_prefix, "idem:");
    }

    #[test]
    fn test_validate_rejects_bad_poll_intervals() {
        let zero = IdempotencyConfig::default().with_poll_interval(Duration::ZERO, Duration::ZERO);
        assert!(matches!(
            zero.validate(),
            Err(IdempotencyError::ConfigError(_))
        ));

        let inverted = IdempotencyConfig::default()
            .with_poll_interval(Duration::from_secs(1), Duration::from_millis(100));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_renewal_interval() {
        let config = IdempotencyConfig::default().with_lock_ttl(Duration::from_secs(30));
        assert_eq!(config.renewal_interval(), Some(Duration::from_secs(15)));

        let short = IdempotencyConfig::default().with_lock_ttl(Duration::from_millis(200));
        assert_eq!(short.renewal_interval(), Some(MIN_RENEWAL_INTERVAL));

        let never = IdempotencyConfig::default().with_lock_ttl(Duration::ZERO);
        assert_eq!(never.renewal_interval(), None);
    }

    #[test]
    fn test_namespaced() {
        let config = IdempotencyConfig::default().with_key_prefix("payments:");
        assert_eq!(config.namespaced("42"), "payments:42");
    }
}
