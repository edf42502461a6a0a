//! Notification setting enums shared by the preference chain, the digest
//! windower and the storage layer.
//!
//! Every enum round-trips through its lowercase `as_str` name, which is also
//! the value stored in the database `setting` columns.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Reserved preference keys
// ---------------------------------------------------------------------------

/// Group-wide override: every notification type in the group uses this row's
/// setting.
pub const GROUP_ALL_KEY: &str = "all";

/// Group-wide override: no notification from the group is wanted.
pub const GROUP_NONE_KEY: &str = "none";

/// Keys that may never be used as a notification type key.
pub const RESERVED_KEYS: &[&str] = &[GROUP_ALL_KEY, GROUP_NONE_KEY];

// ---------------------------------------------------------------------------
// NotificationSetting
// ---------------------------------------------------------------------------

/// Per-type (or per-group override) delivery setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSetting {
    Never,
    Now,
    Daily,
    Weekly,
}

impl NotificationSetting {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Now => "now",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "never" => Ok(Self::Never),
            "now" => Ok(Self::Now),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(CoreError::Validation(format!(
                "Unknown notification setting '{other}'"
            ))),
        }
    }

    /// The digest frequency this setting defers to, if any.
    pub fn digest_frequency(self) -> Option<DigestFrequency> {
        match self {
            Self::Daily => Some(DigestFrequency::Daily),
            Self::Weekly => Some(DigestFrequency::Weekly),
            Self::Never | Self::Now => None,
        }
    }
}

// ---------------------------------------------------------------------------
// GlobalSetting
// ---------------------------------------------------------------------------

/// The blanket per-user setting. Anything but `Individual` overrides all
/// per-group and per-type preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalSetting {
    Never,
    Now,
    Daily,
    Weekly,
    #[default]
    Individual,
}

impl GlobalSetting {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Now => "now",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Individual => "individual",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "never" => Ok(Self::Never),
            "now" => Ok(Self::Now),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "individual" => Ok(Self::Individual),
            other => Err(CoreError::Validation(format!(
                "Unknown global notification setting '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DigestFrequency
// ---------------------------------------------------------------------------

/// How often a digest email is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFrequency {
    Daily,
    Weekly,
}

impl DigestFrequency {
    /// All frequencies, shortest period first.
    pub const ALL: [DigestFrequency; 2] = [DigestFrequency::Daily, DigestFrequency::Weekly];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(CoreError::Validation(format!(
                "Unknown digest frequency '{other}'"
            ))),
        }
    }

    /// Length of one digest window.
    pub fn period(self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::days(7),
        }
    }

    /// The longest configured digest period.
    pub fn longest_period() -> Duration {
        Self::ALL
            .iter()
            .map(|f| f.period())
            .max()
            .unwrap_or_else(|| Duration::days(7))
    }

    /// The per-type setting that asks for this frequency.
    pub fn as_setting(self) -> NotificationSetting {
        match self {
            Self::Daily => NotificationSetting::Daily,
            Self::Weekly => NotificationSetting::Weekly,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
