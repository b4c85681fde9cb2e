//! Data retention configuration.
//!
//! Configures pruning of old messages, orphans and closed sessions, both for
//! the periodic worker inside `serve` and for `maintenance --prune`.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_hours = 24
//!
//! [retention.periods]
//! sms_days = 30
//! orphan_days = 14
//! session_days = 30
//!
//! [retention.safety]
//! dry_run = false
//! max_deletes_per_run = 0
//! batch_size = 5000
//! batch_pause_ms = 50
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Environment variable overriding [`RetentionPeriods::sms_days`].
pub const PRUNE_SMS_DAYS_ENV: &str = "PRUNE_SMS_DAYS";
/// Environment variable overriding [`RetentionPeriods::orphan_days`].
pub const PRUNE_ORPHAN_DAYS_ENV: &str = "PRUNE_ORPHAN_DAYS";
/// Environment variable overriding [`RetentionPeriods::session_days`].
pub const PRUNE_SESSION_DAYS_ENV: &str = "PRUNE_SESSION_DAYS";

/// Data retention configuration.
///
/// When enabled, a background worker periodically deletes records older
/// than their configured retention period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether periodic pruning inside `serve` is enabled.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the retention worker (in hours).
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Retention periods for the pruned tables.
    #[serde(default)]
    pub periods: RetentionPeriods,

    /// Safety settings to prevent accidental data loss.
    #[serde(default)]
    pub safety: RetentionSafety,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            periods: RetentionPeriods::default(),
            safety: RetentionSafety::default(),
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

/// Retention periods in days.
///
/// Set a field to 0 to keep that table forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionPeriods {
    /// Days to keep received messages (`sms_messages.received_at`).
    #[serde(default = "default_sms_days")]
    pub sms_days: u32,

    /// Days to keep unmatched messages (`orphan_sms.received_at`).
    #[serde(default = "default_orphan_days")]
    pub orphan_days: u32,

    /// Days to keep finished and cancelled sessions (`sessions.created_at`).
    #[serde(default = "default_session_days")]
    pub session_days: u32,
}

impl Default for RetentionPeriods {
    fn default() -> Self {
        Self {
            sms_days: default_sms_days(),
            orphan_days: default_orphan_days(),
            session_days: default_session_days(),
        }
    }
}

fn default_sms_days() -> u32 {
    30
}

fn default_orphan_days() -> u32 {
    14
}

fn default_session_days() -> u32 {
    30
}

impl RetentionPeriods {
    /// Apply `PRUNE_SMS_DAYS`, `PRUNE_ORPHAN_DAYS` and `PRUNE_SESSION_DAYS`.
    ///
    /// A variable that is set but not a non-negative integer is an error.
    pub fn with_env_overrides(&self) -> Result<Self, ConfigError> {
        Ok(Self {
            sms_days: env_days(PRUNE_SMS_DAYS_ENV)?.unwrap_or(self.sms_days),
            orphan_days: env_days(PRUNE_ORPHAN_DAYS_ENV)?.unwrap_or(self.orphan_days),
            session_days: env_days(PRUNE_SESSION_DAYS_ENV)?.unwrap_or(self.session_days),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sms_days == 0 && self.orphan_days == 0 && self.session_days == 0
    }
}

fn env_days(name: &str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<u32>().map(Some).map_err(|_| {
            ConfigError::Validation(format!(
                "{name} must be a non-negative integer number of days, got '{raw}'"
            ))
        }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::Validation(format!(
            "{name} is not valid unicode"
        ))),
    }
}

/// Safety settings for retention operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSafety {
    /// If true, count what would be deleted without deleting it.
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum number of records to delete per run per table.
    /// Set to 0 for unlimited.
    #[serde(default)]
    pub max_deletes_per_run: u64,

    /// Rows deleted per statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Pause between batches in milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl Default for RetentionSafety {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_deletes_per_run: 0,
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

fn default_batch_size() -> u32 {
    5000
}

fn default_batch_pause_ms() -> u64 {
    50
}

impl RetentionConfig {
    /// Get the interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.safety.batch_size == 0 {
            return Err(ConfigError::Validation(
                "retention.safety.batch_size must be greater than 0".into(),
            ));
        }
        if self.enabled && self.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_hours must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_hours, 24);
        assert_eq!(config.periods.sms_days, 30);
        assert_eq!(config.periods.orphan_days, 14);
        assert_eq!(config.periods.session_days, 30);
        assert!(!config.safety.dry_run);
        assert_eq!(config.safety.max_deletes_per_run, 0);
        assert_eq!(config.safety.batch_size, 5000);
        assert_eq!(config.safety.batch_pause_ms, 50);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            enabled = true
            interval_hours = 12

            [periods]
            sms_days = 60
            orphan_days = 7
            session_days = 0

            [safety]
            dry_run = true
            max_deletes_per_run = 50000
            batch_size = 500
            batch_pause_ms = 10
        "#;
        let config: RetentionConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval_hours, 12);
        assert_eq!(config.periods.sms_days, 60);
        assert_eq!(config.periods.orphan_days, 7);
        assert_eq!(config.periods.session_days, 0);
        assert!(config.safety.dry_run);
        assert_eq!(config.safety.max_deletes_per_run, 50000);
        assert_eq!(config.safety.batch_size, 500);
        assert_eq!(config.safety.batch_pause_ms, 10);
    }

    #[test]
    fn test_interval_duration() {
        let mut config = RetentionConfig::default();
        assert_eq!(config.interval(), std::time::Duration::from_secs(24 * 3600));

        config.interval_hours = 6;
        assert_eq!(config.interval(), std::time::Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = RetentionConfig::default();
        config.safety.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_replace_config() {
        temp_env::with_vars(
            [
                (PRUNE_SMS_DAYS_ENV, Some("10")),
                (PRUNE_ORPHAN_DAYS_ENV, Some("0")),
                (PRUNE_SESSION_DAYS_ENV, None),
            ],
            || {
                let periods = RetentionPeriods::default().with_env_overrides().unwrap();
                assert_eq!(periods.sms_days, 10);
                assert_eq!(periods.orphan_days, 0);
                assert_eq!(periods.session_days, 30);
            },
        );
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_non_integer() {
        temp_env::with_var(PRUNE_SMS_DAYS_ENV, Some("thirty"), || {
            let err = RetentionPeriods::default().with_env_overrides().unwrap_err();
            assert!(err.to_string().contains(PRUNE_SMS_DAYS_ENV));
        });
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_negative() {
        temp_env::with_var(PRUNE_SESSION_DAYS_ENV, Some("-1"), || {
            assert!(RetentionPeriods::default().with_env_overrides().is_err());
        });
    }

    #[test]
    fn test_is_empty() {
        let periods = RetentionPeriods {
            sms_days: 0,
            orphan_days: 0,
            session_days: 0,
        };
        assert!(periods.is_empty());
        assert!(!RetentionPeriods::default().is_empty());
    }
}
