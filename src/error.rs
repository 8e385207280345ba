//! Error types for the subscription bot.

/// Top-level error type for the bot core.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Startup configuration is missing or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// SQLite error from the record store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record id does not exist.
    #[error("record #{0} not found")]
    NotFound(i64),

    /// Malformed operator input (date, id, hours, empty text).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Chat transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Timer facility unavailable or timer install failed.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Archive creation failed.
    #[error("backup error: {0}")]
    Backup(String),

    /// A mutex was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BotError>;
