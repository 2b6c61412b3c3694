//! Trash retention configuration.
//!
//! Configures automatic purging of campaigns that have stayed in the trash
//! longer than the retention window.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! retention_days = 90
//! interval_secs = 3600
//! batch_size = 100
//! cycle_timeout_secs = 300
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

pub const DEFAULT_RETENTION_DAYS: i64 = 90;
pub const DEFAULT_INTERVAL_SECS: i64 = 3600;
pub const DEFAULT_BATCH_SIZE: i64 = 100;
pub const DEFAULT_CYCLE_TIMEOUT_SECS: i64 = 300;

/// One hundred years.
pub const MAX_RETENTION_DAYS: i64 = 36_500;
/// Thirty days.
pub const MAX_INTERVAL_SECS: i64 = 30 * 24 * 3600;
pub const MAX_BATCH_SIZE: i64 = 10_000;
/// One day.
pub const MAX_CYCLE_TIMEOUT_SECS: i64 = 24 * 3600;

/// Trash retention configuration.
///
/// Zero or negative numeric values fall back to their defaults when the
/// retention job is built, so a partially filled section is always usable.
/// Values above their maximum are clamped to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TrashRetentionConfig {
    /// Whether the retention job runs.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// Days a campaign stays in the trash before it is purged.
    /// Default: 90
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Seconds between purge cycles.
    /// Default: 3600 (hourly)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: i64,

    /// Maximum campaigns purged per cycle.
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Upper bound on one cycle's running time, independent of the interval.
    /// Default: 300 (5 minutes)
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: i64,

    /// Log the campaigns a cycle would purge without purging them.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for TrashRetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_days: DEFAULT_RETENTION_DAYS,
            interval_secs: DEFAULT_INTERVAL_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            cycle_timeout_secs: DEFAULT_CYCLE_TIMEOUT_SECS,
            dry_run: false,
        }
    }
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_interval_secs() -> i64 {
    DEFAULT_INTERVAL_SECS
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE
}

fn default_cycle_timeout_secs() -> i64 {
    DEFAULT_CYCLE_TIMEOUT_SECS
}

fn positive_or(value: i64, default: i64, max: i64) -> i64 {
    if value > 0 { value.min(max) } else { default }
}

impl TrashRetentionConfig {
    /// Replace every zero or negative value with its default and clamp the
    /// rest to their maximums.
    pub fn normalized(&self) -> Self {
        Self {
            enabled: self.enabled,
            retention_days: positive_or(
                self.retention_days,
                DEFAULT_RETENTION_DAYS,
                MAX_RETENTION_DAYS,
            ),
            interval_secs: positive_or(self.interval_secs, DEFAULT_INTERVAL_SECS, MAX_INTERVAL_SECS),
            batch_size: positive_or(self.batch_size, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE),
            cycle_timeout_secs: positive_or(
                self.cycle_timeout_secs,
                DEFAULT_CYCLE_TIMEOUT_SECS,
                MAX_CYCLE_TIMEOUT_SECS,
            ),
            dry_run: self.dry_run,
        }
    }

    /// Get the interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(
            positive_or(self.interval_secs, DEFAULT_INTERVAL_SECS, MAX_INTERVAL_SECS)
                .unsigned_abs(),
        )
    }

    /// Get the per-cycle timeout as a Duration.
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(
            positive_or(
                self.cycle_timeout_secs,
                DEFAULT_CYCLE_TIMEOUT_SECS,
                MAX_CYCLE_TIMEOUT_SECS,
            )
            .unsigned_abs(),
        )
    }

    /// Reject values that can only be typos. Zero is accepted and means "default".
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value, max) in [
            ("retention_days", self.retention_days, MAX_RETENTION_DAYS),
            ("interval_secs", self.interval_secs, MAX_INTERVAL_SECS),
            ("batch_size", self.batch_size, MAX_BATCH_SIZE),
            (
                "cycle_timeout_secs",
                self.cycle_timeout_secs,
                MAX_CYCLE_TIMEOUT_SECS,
            ),
        ] {
            if value < 0 {
                return Err(ConfigError::Validation(format!(
                    "retention.{field} cannot be negative (got {value})"
                )));
            }
            if value > max {
                return Err(ConfigError::Validation(format!(
                    "retention.{field} must be at most {max} (got {value})"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let config: TrashRetentionConfig = toml::from_str("").unwrap();
        assert_eq!(config, TrashRetentionConfig::default());
        assert!(!config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(3600));
        assert_eq!(config.cycle_timeout(), Duration::from_secs(300));
    }

    #[rstest]
    #[case(0, DEFAULT_RETENTION_DAYS)]
    #[case(-7, DEFAULT_RETENTION_DAYS)]
    #[case(30, 30)]
    fn test_normalized_retention_days(#[case] input: i64, #[case] expected: i64) {
        let config = TrashRetentionConfig {
            retention_days: input,
            ..Default::default()
        };
        assert_eq!(config.normalized().retention_days, expected);
    }

    #[test]
    fn test_normalized_replaces_every_non_positive_value() {
        let config = TrashRetentionConfig {
            enabled: true,
            retention_days: 0,
            interval_secs: -1,
            batch_size: 0,
            cycle_timeout_secs: -30,
            dry_run: true,
        }
        .normalized();

        assert!(config.enabled);
        assert!(config.dry_run);
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(config.interval_secs, DEFAULT_INTERVAL_SECS);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.cycle_timeout_secs, DEFAULT_CYCLE_TIMEOUT_SECS);
    }

    #[test]
    fn test_validate_rejects_negative_values() {
        let config = TrashRetentionConfig {
            batch_size: -5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));

        let zero = TrashRetentionConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_ok());
    }

    #[rstest]
    #[case::retention_days(TrashRetentionConfig { retention_days: 100_000_000, ..Default::default() }, "retention_days")]
    #[case::interval_secs(TrashRetentionConfig { interval_secs: i64::MAX, ..Default::default() }, "interval_secs")]
    #[case::batch_size(TrashRetentionConfig { batch_size: MAX_BATCH_SIZE + 1, ..Default::default() }, "batch_size")]
    #[case::cycle_timeout_secs(TrashRetentionConfig { cycle_timeout_secs: MAX_CYCLE_TIMEOUT_SECS + 1, ..Default::default() }, "cycle_timeout_secs")]
    fn test_validate_rejects_values_above_maximum(
        #[case] config: TrashRetentionConfig,
        #[case] field: &str,
    ) {
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(field));
    }

    #[test]
    fn test_validate_accepts_maximums() {
        let config = TrashRetentionConfig {
            retention_days: MAX_RETENTION_DAYS,
            interval_secs: MAX_INTERVAL_SECS,
            batch_size: MAX_BATCH_SIZE,
            cycle_timeout_secs: MAX_CYCLE_TIMEOUT_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_normalized_clamps_oversized_values() {
        let config = TrashRetentionConfig {
            retention_days: 100_000_000,
            interval_secs: i64::MAX,
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.retention_days, MAX_RETENTION_DAYS);
        assert_eq!(config.interval_secs, MAX_INTERVAL_SECS);
        assert_eq!(
            config.interval(),
            Duration::from_secs(MAX_INTERVAL_SECS as u64)
        );
    }
}
