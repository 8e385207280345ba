//! Startup configuration for the bot process.
//!
//! Resolved once at startup: defaults, then an optional TOML file, then
//! environment overrides. Nothing here changes at runtime; runtime-mutable
//! settings (default duration, backup schedule) live in the store.

use crate::error::{BotError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit TOML config file.
pub const CONFIG_PATH_ENV: &str = "SUBWATCH_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Chat transport credential. Required.
    pub bot_token: String,
    /// IANA timezone name used for dates, the digest and display.
    pub timezone: String,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Operator ids inserted at startup (idempotent).
    pub seed_admin_ids: Vec<i64>,
    /// Where CSV exports are written. `None` = next to the database.
    pub export_dir: Option<PathBuf>,
    /// Optional directory for daily-rolling log files.
    pub log_dir: Option<PathBuf>,
    /// Per-recipient delivery timeout for fan-out, in seconds.
    pub delivery_timeout_secs: u64,
    /// Minimum per-recipient timeout for document uploads, in seconds. Grows
    /// with the file size.
    pub upload_timeout_secs: u64,
    /// Backup settings.
    pub backup: BackupConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            timezone: "Asia/Dubai".to_owned(),
            db_path: PathBuf::from("data.db"),
            seed_admin_ids: Vec::new(),
            export_dir: None,
            log_dir: None,
            delivery_timeout_secs: 10,
            upload_timeout_secs: 60,
            backup: BackupConfig::default(),
        }
    }
}

/// Backup archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory that gets archived.
    pub source_dir: PathBuf,
    /// Directory archives are written to.
    pub output_dir: PathBuf,
    /// Archives above this size (MiB) are reported by path instead of attached.
    pub max_inline_mb: u64,
    /// Number of archives kept in `output_dir`.
    pub keep_archives: usize,
    /// Delay before the first automatic backup after enabling, in minutes.
    pub grace_minutes: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            output_dir: std::env::temp_dir(),
            max_inline_mb: 45,
            keep_archives: 5,
            grace_minutes: 5,
        }
    }
}

impl BotConfig {
    /// Resolve the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Config`] when the token is missing, the timezone is
    /// unknown, or the config file cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`BotConfig::load`] with an injectable environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let explicit = env(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = Self::default_config_path();
                if path.is_file() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BotError::Config(e.to_string()))
    }

    /// Apply the documented environment overrides.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(token) = env("BOT_TOKEN") {
            self.bot_token = token.trim().to_owned();
        }
        if let Some(raw) = env("ADMIN_CHAT_ID") {
            for id in parse_id_list(&raw) {
                if !self.seed_admin_ids.contains(&id) {
                    self.seed_admin_ids.push(id);
                }
            }
        }
        if let Some(tz) = env("TZ").filter(|v| !v.trim().is_empty()) {
            self.timezone = tz.trim().to_owned();
        }
        if let Some(path) = env("DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.db_path = PathBuf::from(path);
        }
        if let Some(path) = env("BACKUP_SRC").filter(|v| !v.trim().is_empty()) {
            self.backup.source_dir = PathBuf::from(path);
        }
        if let Some(mb) = env("MAX_BACKUP_MB").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.backup.max_inline_mb = mb;
        }
        if let Some(dir) = env("SUBWATCH_LOG_DIR").filter(|v| !v.trim().is_empty()) {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    /// Check the fields the process cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            return Err(BotError::Config("BOT_TOKEN is not set".to_owned()));
        }
        self.tz()?;
        Ok(())
    }

    /// Parsed timezone.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| BotError::Config(format!("unknown timezone `{}`", self.timezone)))
    }

    /// Directory CSV exports are written to.
    pub fn export_dir(&self) -> PathBuf {
        match &self.export_dir {
            Some(dir) => dir.clone(),
            None => self
                .db_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Returns the default config file path: `~/.config/subwatch/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("subwatch").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("subwatch")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/subwatch-config/config.toml")
        }
    }
}

/// Parse a comma-separated id list, skipping anything that is not all digits.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|part| part.parse::<i64>().ok())
        .collect()
}
