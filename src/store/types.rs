//! Record and setting types for the subscription store.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Seconds in one granted day. Durations are absolute: a day is always 24h.
pub const SECS_PER_DAY: i64 = 86_400;

/// Default duration when the setting is absent or unreadable.
pub const DEFAULT_DURATION_DAYS: u32 = 30;

/// Largest day count a single grant (insert, renewal, default) may carry.
pub const MAX_GRANT_DAYS: u32 = 36_500;

/// Default backup interval when the setting is absent or unreadable.
pub const DEFAULT_BACKUP_INTERVAL_HOURS: u32 = 24;

/// A tracked subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub description: String,
    pub buyer_ref: Option<String>,
    pub purchase_date: NaiveDate,
    /// Running total of all granted days (initial + renewals).
    pub duration_days: i64,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`crate::store::SubscriptionStore::insert`].
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub description: String,
    pub buyer_ref: Option<String>,
    pub purchase_date: NaiveDate,
    pub duration_days: u32,
}

/// Process-wide settings keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    DefaultDurationDays,
    BackupEnabled,
    BackupIntervalHours,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DefaultDurationDays => "default_duration_days",
            Self::BackupEnabled => "backup_enabled",
            Self::BackupIntervalHours => "backup_interval_hours",
        }
    }

    /// Value written on first open.
    pub fn default_value(self) -> &'static str {
        match self {
            Self::DefaultDurationDays => "30",
            Self::BackupEnabled => "0",
            Self::BackupIntervalHours => "24",
        }
    }

    pub const ALL: [SettingKey; 3] = [
        Self::DefaultDurationDays,
        Self::BackupEnabled,
        Self::BackupIntervalHours,
    ];
}

/// The instant of local midnight on `date` in `tz`.
///
/// When midnight does not exist locally (DST gap) the naive midnight is read
/// as UTC.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// Convert unix seconds to a UTC timestamp. `None` when chrono cannot
/// represent the instant.
pub(crate) fn from_epoch_secs(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// `start + days` as unix seconds, or `None` if the result leaves the
/// representable range.
pub(crate) fn checked_expiry(start_secs: i64, days: u32) -> Option<i64> {
    i64::from(days)
        .checked_mul(SECS_PER_DAY)
        .and_then(|span| start_secs.checked_add(span))
        .filter(|secs| from_epoch_secs(*secs).is_some())
}
