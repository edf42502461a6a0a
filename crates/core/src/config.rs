use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;
use crate::setting::DigestFrequency;
use crate::types::DbId;

/// Default bundle window: 3 hours.
pub const DEFAULT_BUNDLE_WINDOW_SECS: i64 = 3 * 3600;

/// Bundle windows longer than 30 days are rejected.
pub const MAX_BUNDLE_WINDOW_SECS: i64 = 30 * 24 * 3600;

/// Events are swept once older than this many longest digest periods.
pub const DEFAULT_EVENT_RETENTION_FACTOR: i32 = 3;

/// Ten years of weekly periods.
pub const MAX_EVENT_RETENTION_FACTOR: i32 = 520;

/// Alerts older than this are swept.
pub const DEFAULT_ALERT_RETENTION_DAYS: i64 = 180;

pub const MAX_ALERT_RETENTION_DAYS: i64 = 3650;

/// How often the digest scheduler checks whether a digest is due.
pub const DEFAULT_DIGEST_CHECK_SECS: u64 = 3600;

/// How often the retention sweeps run.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// A session with no new frame for this long is closed by its worker.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30;

/// Engine configuration loaded from environment variables.
///
/// All fields have defaults matching production policy.
#[derive(Debug, Clone)]
pub struct HeraldConfig {
    /// Portal component of alert hash keys.
    pub portal_id: DbId,
    /// Recency window for bundle merges.
    pub bundle_window: chrono::Duration,
    /// Multiplier over the longest digest period for event retention.
    pub event_retention_factor: i32,
    /// Days since an alert's last activity before it is swept.
    pub alert_retention_days: i64,
    /// Raise on inconsistencies instead of logging them.
    pub strict: bool,
    /// Tick of the digest scheduler loop.
    pub digest_check_interval: Duration,
    /// Tick of the retention sweep loop.
    pub sweep_interval: Duration,
    /// Idle time after which a session worker closes its session.
    pub session_idle_timeout: Duration,
    /// Types always mailed immediately, bypassing user preferences.
    pub ignore_user_setting_types: Vec<String>,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            portal_id: 1,
            bundle_window: chrono::Duration::seconds(DEFAULT_BUNDLE_WINDOW_SECS),
            event_retention_factor: DEFAULT_EVENT_RETENTION_FACTOR,
            alert_retention_days: DEFAULT_ALERT_RETENTION_DAYS,
            strict: false,
            digest_check_interval: Duration::from_secs(DEFAULT_DIGEST_CHECK_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            ignore_user_setting_types: Vec::new(),
        }
    }
}

impl HeraldConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default |
    /// |------------------------------------|---------|
    /// | `HERALD_PORTAL_ID`                 | `1`     |
    /// | `HERALD_BUNDLE_WINDOW_SECS`        | `10800` |
    /// | `HERALD_EVENT_RETENTION_FACTOR`    | `3`     |
    /// | `HERALD_ALERT_RETENTION_DAYS`      | `180`   |
    /// | `HERALD_STRICT`                    | `false` |
    /// | `HERALD_DIGEST_CHECK_SECS`         | `3600`  |
    /// | `HERALD_SWEEP_INTERVAL_SECS`       | `3600`  |
    /// | `HERALD_SESSION_IDLE_SECS`         | `30`    |
    /// | `HERALD_IGNORE_USER_SETTING_TYPES` | empty   |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();

        let ignore_user_setting_types = std::env::var("HERALD_IGNORE_USER_SETTING_TYPES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            portal_id: env_parse("HERALD_PORTAL_ID", defaults.portal_id)?,
            bundle_window: seconds(env_parse(
                "HERALD_BUNDLE_WINDOW_SECS",
                DEFAULT_BUNDLE_WINDOW_SECS,
            )?)?,
            event_retention_factor: env_parse(
                "HERALD_EVENT_RETENTION_FACTOR",
                defaults.event_retention_factor,
            )?,
            alert_retention_days: env_parse(
                "HERALD_ALERT_RETENTION_DAYS",
                defaults.alert_retention_days,
            )?,
            strict: env_parse("HERALD_STRICT", defaults.strict)?,
            digest_check_interval: Duration::from_secs(env_parse(
                "HERALD_DIGEST_CHECK_SECS",
                DEFAULT_DIGEST_CHECK_SECS,
            )?),
            sweep_interval: Duration::from_secs(env_parse(
                "HERALD_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?),
            session_idle_timeout: Duration::from_secs(env_parse(
                "HERALD_SESSION_IDLE_SECS",
                DEFAULT_SESSION_IDLE_SECS,
            )?),
            ignore_user_setting_types,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every duration against its allowed range.
    pub fn validate(&self) -> Result<(), CoreError> {
        let bundle_secs = self.bundle_window.num_seconds();
        if !(1..=MAX_BUNDLE_WINDOW_SECS).contains(&bundle_secs) {
            return Err(CoreError::Validation(format!(
                "HERALD_BUNDLE_WINDOW_SECS must be between 1 and {MAX_BUNDLE_WINDOW_SECS}"
            )));
        }
        if !(1..=MAX_EVENT_RETENTION_FACTOR).contains(&self.event_retention_factor) {
            return Err(CoreError::Validation(format!(
                "HERALD_EVENT_RETENTION_FACTOR must be between 1 and {MAX_EVENT_RETENTION_FACTOR}"
            )));
        }
        if !(1..=MAX_ALERT_RETENTION_DAYS).contains(&self.alert_retention_days) {
            return Err(CoreError::Validation(format!(
                "HERALD_ALERT_RETENTION_DAYS must be between 1 and {MAX_ALERT_RETENTION_DAYS}"
            )));
        }
        Ok(())
    }

    /// Events older than this are deleted by the sweep. Saturates for
    /// factors `validate` would reject.
    pub fn event_retention(&self) -> chrono::Duration {
        DigestFrequency::longest_period()
            .checked_mul(self.event_retention_factor)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Saturates like [`event_retention`](Self::event_retention).
    pub fn alert_retention(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.alert_retention_days).unwrap_or(chrono::Duration::MAX)
    }
}

fn seconds(secs: i64) -> Result<chrono::Duration, CoreError> {
    chrono::Duration::try_seconds(secs)
        .ok_or_else(|| CoreError::Validation(format!("{secs} seconds is out of range")))
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{name} has an invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}
