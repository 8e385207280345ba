//! SQLite-backed subscription store.
//!
//! Single database file holding subscription records, settings and the
//! operator table. Thread-safe via an internal `Mutex<Connection>`; every
//! operation holds the lock for its whole statement (or transaction), so
//! mutations are serialized.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::schema::{apply_schema, read_schema_version};
use super::types::{
    DEFAULT_BACKUP_INTERVAL_HOURS, DEFAULT_DURATION_DAYS, NewSubscription, SECS_PER_DAY,
    MAX_GRANT_DAYS, SettingKey, Subscription, checked_expiry, from_epoch_secs, local_midnight,
};
use crate::error::{BotError, Result};

/// Row cap for the active listing.
pub const LIST_ACTIVE_LIMIT: usize = 50;
/// Row cap for the expired listing.
pub const LIST_EXPIRED_LIMIT: usize = 200;
/// Row cap for search.
pub const SEARCH_LIMIT: usize = 100;

const SELECT_COLUMNS: &str = "SELECT id, description, buyer_ref, purchase_date, duration_days, \
     expires_at, is_active, created_at, updated_at FROM subscriptions";

/// Subscription records, settings and operators in one SQLite database.
pub struct SubscriptionStore {
    conn: Mutex<Connection>,
    tz: Tz,
}

impl SubscriptionStore {
    /// Open (or create) the database at `path`, applying the schema and
    /// default settings.
    pub fn open(path: &Path, tz: Tz) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, tz)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory(tz: Tz) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, tz)
    }

    fn with_connection(conn: Connection, tz: Tz) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        apply_schema(&conn)?;
        for key in SettingKey::ALL {
            conn.execute(
                "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
                params![key.as_str(), key.default_value()],
            )?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            tz,
        })
    }

    /// Timezone used to turn purchase dates into instants.
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Read the current schema version.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    // -----------------------------------------------------------------------
    // Subscription records
    // -----------------------------------------------------------------------

    /// Insert a record; expiry is local midnight of the purchase date plus
    /// `duration_days`. Returns the new id.
    pub fn insert(&self, new: &NewSubscription) -> Result<i64> {
        let description = new.description.trim();
        if description.is_empty() {
            return Err(BotError::Validation("description is empty".to_owned()));
        }
        check_grant_days(new.duration_days)?;

        let purchase = local_midnight(new.purchase_date, self.tz);
        let expires_at = checked_expiry(purchase.timestamp(), new.duration_days)
            .ok_or_else(|| BotError::Validation("expiry is out of range".to_owned()))?;
        let now = Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO subscriptions \
             (description, buyer_ref, purchase_date, duration_days, expires_at, is_active, \
              created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                description,
                new.buyer_ref.as_deref(),
                new.purchase_date.format("%Y-%m-%d").to_string(),
                i64::from(new.duration_days),
                expires_at,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one record.
    pub fn get(&self, id: i64) -> Result<Subscription> {
        let conn = self.lock()?;
        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], row_to_subscription)
            .optional()?
            .ok_or(BotError::NotFound(id))
    }

    /// Active records, soonest expiry first.
    pub fn list_active(&self, limit: usize) -> Result<Vec<Subscription>> {
        self.query_list(
            &format!("{SELECT_COLUMNS} WHERE is_active = 1 ORDER BY expires_at ASC, id ASC LIMIT ?1"),
            params![limit_param(limit)],
        )
    }

    /// Active records with `expires_at <= as_of`, soonest first.
    pub fn list_expired(&self, as_of: DateTime<Utc>, limit: usize) -> Result<Vec<Subscription>> {
        self.query_list(
            &format!(
                "{SELECT_COLUMNS} WHERE is_active = 1 AND expires_at <= ?1 \
                 ORDER BY expires_at ASC, id ASC LIMIT ?2"
            ),
            params![as_of.timestamp(), limit_param(limit)],
        )
    }

    /// Active records with `after < expires_at <= until`, soonest first.
    pub fn list_expiring_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        self.query_list(
            &format!(
                "{SELECT_COLUMNS} WHERE is_active = 1 AND expires_at > ?1 AND expires_at <= ?2 \
                 ORDER BY expires_at ASC, id ASC"
            ),
            params![after.timestamp(), until.timestamp()],
        )
    }

    /// Case-sensitive substring match on description or buyer reference,
    /// active and finished alike, soonest expiry first.
    pub fn search(&self, needle: &str) -> Result<Vec<Subscription>> {
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        // instr() is case-sensitive and has no wildcard characters to escape.
        self.query_list(
            &format!(
                "{SELECT_COLUMNS} WHERE instr(description, ?1) > 0 \
                 OR (buyer_ref IS NOT NULL AND instr(buyer_ref, ?1) > 0) \
                 ORDER BY expires_at ASC, id ASC LIMIT ?2"
            ),
            params![needle, limit_param(SEARCH_LIMIT)],
        )
    }

    /// Extend a record by `extra_days`, additively from its current expiry.
    /// Returns the new expiry.
    pub fn renew(&self, id: i64, extra_days: u32) -> Result<DateTime<Utc>> {
        check_grant_days(extra_days)?;
        let mut conn = self.lock()?;
        // The increment is applied by SQLite, never read and written back
        // from here. The transaction lets an out-of-range result roll back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let new_expiry: Option<i64> = tx
            .query_row(
                "UPDATE subscriptions \
                 SET expires_at = expires_at + ?1, duration_days = duration_days + ?2, \
                     updated_at = ?3 \
                 WHERE id = ?4 RETURNING expires_at",
                params![
                    i64::from(extra_days) * SECS_PER_DAY,
                    i64::from(extra_days),
                    Utc::now().timestamp(),
                    id
                ],
                |row| row.get(0),
            )
            .optional()?;
        let secs = new_expiry.ok_or(BotError::NotFound(id))?;
        let expires_at = from_epoch_secs(secs)
            .ok_or_else(|| BotError::Validation("expiry is out of range".to_owned()))?;
        tx.commit()?;
        Ok(expires_at)
    }

    /// Mark a record finished. Idempotent: returns `true` when this call
    /// flipped it, `false` when it was already finished.
    pub fn finish(&self, id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE subscriptions SET is_active = 0, updated_at = ?1 \
             WHERE id = ?2 AND is_active = 1",
            params![Utc::now().timestamp(), id],
        )?;
        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row("SELECT id FROM subscriptions WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(BotError::NotFound(id));
            }
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Every record ordered by id, for export.
    pub fn list_all(&self) -> Result<Vec<Subscription>> {
        self.query_list(&format!("{SELECT_COLUMNS} ORDER BY id ASC"), params![])
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Raw setting value, or `default` when absent.
    pub fn get_setting(&self, key: SettingKey, default: &str) -> Result<String> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or_else(|| default.to_owned()))
    }

    /// Upsert a setting (last write wins).
    pub fn set_setting(&self, key: SettingKey, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key.as_str(), value],
        )?;
        Ok(())
    }

    pub fn default_duration_days(&self) -> Result<u32> {
        let raw = self.get_setting(
            SettingKey::DefaultDurationDays,
            SettingKey::DefaultDurationDays.default_value(),
        )?;
        Ok(raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|d| (1..=MAX_GRANT_DAYS).contains(d))
            .unwrap_or(DEFAULT_DURATION_DAYS))
    }

    pub fn set_default_duration_days(&self, days: u32) -> Result<()> {
        check_grant_days(days)?;
        self.set_setting(SettingKey::DefaultDurationDays, &days.to_string())
    }

    pub fn backup_enabled(&self) -> Result<bool> {
        Ok(self.get_setting(SettingKey::BackupEnabled, "0")?.trim() == "1")
    }

    pub fn backup_interval_hours(&self) -> Result<u32> {
        let raw = self.get_setting(
            SettingKey::BackupIntervalHours,
            SettingKey::BackupIntervalHours.default_value(),
        )?;
        Ok(raw
            .trim()
            .parse::<u32>()
            .unwrap_or(DEFAULT_BACKUP_INTERVAL_HOURS)
            .max(1))
    }

    /// Persist the backup schedule in one transaction.
    pub fn set_backup_schedule(&self, enabled: bool, interval_hours: Option<u32>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let upsert = "INSERT INTO settings (key, value) VALUES (?1, ?2) \
                      ON CONFLICT(key) DO UPDATE SET value = excluded.value";
        tx.execute(
            upsert,
            params![SettingKey::BackupEnabled.as_str(), if enabled { "1" } else { "0" }],
        )?;
        if let Some(hours) = interval_hours {
            tx.execute(
                upsert,
                params![SettingKey::BackupIntervalHours.as_str(), hours.max(1).to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    /// Operator ids in insertion order.
    pub fn list_admins(&self) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT chat_id FROM admins ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for r in rows {
            ids.push(r?);
        }
        Ok(ids)
    }

    /// Add an operator. Returns `false` when already present.
    pub fn add_admin(&self, chat_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO admins (chat_id, created_at) VALUES (?1, ?2)",
            params![chat_id, Utc::now().timestamp()],
        )?;
        Ok(inserted > 0)
    }

    /// Remove an operator. Returns `false` when not found.
    pub fn remove_admin(&self, chat_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM admins WHERE chat_id = ?1", [chat_id])?;
        Ok(removed > 0)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| BotError::Lock(e.to_string()))
    }

    fn query_list<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_subscription)?;
        let mut records = Vec::new();
        for r in rows {
            records.push(r?);
        }
        Ok(records)
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    from_epoch_secs(secs).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp {secs} is out of range").into(),
        )
    })
}

fn check_grant_days(days: u32) -> Result<()> {
    if days == 0 || days > MAX_GRANT_DAYS {
        return Err(BotError::Validation(format!(
            "days must be between 1 and {MAX_GRANT_DAYS}"
        )));
    }
    Ok(())
}

fn row_to_subscription(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    let purchase_raw: String = row.get(3)?;
    let purchase_date = NaiveDate::parse_from_str(&purchase_raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Subscription {
        id: row.get(0)?,
        description: row.get(1)?,
        buyer_ref: row.get(2)?,
        purchase_date,
        duration_days: row.get(4)?,
        expires_at: timestamp_column(row, 5)?,
        active: row.get::<_, i64>(6)? != 0,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
