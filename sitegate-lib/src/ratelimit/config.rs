use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default minimum spacing between two starts against the same host
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(1000);

/// Default number of starts allowed per host within one permit period
pub const DEFAULT_PERMITS: u32 = 5;

/// Default length of the rolling permit period
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(5000);

/// Retry-After values above this are clamped
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Hosts without any activity for this long may be dropped from the registry
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Wait applied for a malformed Retry-After value when spacing is disabled
pub(crate) const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Process-wide pacing parameters shared by every host.
///
/// The two throttles are independent: `min_spacing` separates any two
/// consecutive starts, while `permits`/`period` bounds how many starts fit
/// into a rolling window. Whichever yields the later instant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    /// Minimum interval between two starts against the same host.
    /// Zero disables pairwise spacing.
    #[serde(default = "default_min_spacing", with = "humantime_serde")]
    pub min_spacing: Duration,

    /// Number of starts allowed per host within one `period`
    #[serde(default = "default_permits")]
    pub permits: u32,

    /// Length of the rolling permit window
    #[serde(default = "default_period", with = "humantime_serde")]
    pub period: Duration,

    /// Upper bound for server-provided Retry-After waits
    #[serde(default = "default_max_retry_after", with = "humantime_serde")]
    pub max_retry_after: Duration,

    /// Idle time after which a host's state may be evicted
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_spacing: default_min_spacing(),
            permits: default_permits(),
            period: default_period(),
            max_retry_after: default_max_retry_after(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

const fn default_min_spacing() -> Duration {
    DEFAULT_MIN_SPACING
}

const fn default_permits() -> u32 {
    DEFAULT_PERMITS
}

const fn default_period() -> Duration {
    DEFAULT_PERIOD
}

const fn default_max_retry_after() -> Duration {
    DEFAULT_MAX_RETRY_AFTER
}

const fn default_idle_timeout() -> Duration {
    DEFAULT_IDLE_TIMEOUT
}

impl GateConfig {
    /// Create a `GateConfig` from CLI options, using defaults for missing values
    #[must_use]
    pub fn from_options(
        min_spacing: Option<Duration>,
        permits: Option<u32>,
        period: Option<Duration>,
    ) -> Self {
        Self {
            min_spacing: min_spacing.unwrap_or(DEFAULT_MIN_SPACING),
            permits: permits.unwrap_or(DEFAULT_PERMITS),
            period: period.unwrap_or(DEFAULT_PERIOD),
            ..Self::default()
        }
    }

    /// Check that the permit window can admit at least one request and that
    /// a rate-limited host is always given time to recover
    ///
    /// # Errors
    ///
    /// Returns an error if `permits`, `period` or `max_retry_after` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.permits == 0 {
            return Err(ErrorKind::InvalidPermits(self.permits));
        }
        if self.period.is_zero() {
            return Err(ErrorKind::InvalidPeriod(self.period));
        }
        if self.max_retry_after.is_zero() {
            return Err(ErrorKind::InvalidMaxRetryAfter(self.max_retry_after));
        }
        Ok(())
    }

    /// The wait used when a Retry-After value cannot be interpreted.
    ///
    /// This is the configured spacing, but never zero: a malformed header
    /// still has to slow the host down.
    #[must_use]
    pub(crate) fn fallback_retry_after(&self) -> Duration {
        if self.min_spacing.is_zero() {
            FALLBACK_RETRY_AFTER
        } else {
            self.min_spacing
        }
    }

    /// How long the constraints recorded for a host may still influence
    /// a future start
    #[must_use]
    pub(crate) fn memory(&self) -> Duration {
        self.min_spacing.max(self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gate_config() {
        let config = GateConfig::default();
        assert_eq!(config.min_spacing, Duration::from_millis(1000));
        assert_eq!(config.permits, 5);
        assert_eq!(config.period, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_options() {
        let config =
            GateConfig::from_options(Some(Duration::ZERO), None, Some(Duration::from_secs(60)));
        assert_eq!(config.min_spacing, Duration::ZERO);
        assert_eq!(config.permits, DEFAULT_PERMITS);
        assert_eq!(config.period, Duration::from_secs(60));
        assert_eq!(config.max_retry_after, DEFAULT_MAX_RETRY_AFTER);
    }

    #[test]
    fn test_validate_rejects_empty_window() {
        let config = GateConfig {
            permits: 0,
            ..GateConfig::default()
        };
        assert_eq!(config.validate(), Err(ErrorKind::InvalidPermits(0)));

        let config = GateConfig {
            period: Duration::ZERO,
            ..GateConfig::default()
        };
        assert_eq!(config.validate(), Err(ErrorKind::InvalidPeriod(Duration::ZERO)));
    }

    #[test]
    fn test_validate_rejects_zero_retry_after_limit() {
        let config = GateConfig {
            max_retry_after: Duration::ZERO,
            ..GateConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ErrorKind::InvalidMaxRetryAfter(Duration::ZERO))
        );
    }

    #[test]
    fn test_fallback_is_never_zero() {
        let config = GateConfig {
            min_spacing: Duration::ZERO,
            ..GateConfig::default()
        };
        assert_eq!(config.fallback_retry_after(), FALLBACK_RETRY_AFTER);

        let config = GateConfig {
            min_spacing: Duration::from_millis(300),
            ..GateConfig::default()
        };
        assert_eq!(config.fallback_retry_after(), Duration::from_millis(300));
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
            min_spacing = "250ms"
            permits = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.min_spacing, Duration::from_millis(250));
        assert_eq!(config.permits, 2);
        assert_eq!(config.period, DEFAULT_PERIOD);
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let result = toml::from_str::<GateConfig>("request_delay = \"1s\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = GateConfig {
            min_spacing: Duration::from_millis(200),
            permits: 15,
            ..GateConfig::default()
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: GateConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }
}
