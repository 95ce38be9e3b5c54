use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// Key holding the status of the most recent check.
pub const LAST_STATUS: &str = "last_status";
/// Key holding the result hash of the most recent check.
pub const LAST_HASH: &str = "last_hash";
/// Key holding the result hash that was last notified.
pub const LAST_NOTIFIED_HASH: &str = "last_notified_hash";
/// Key holding the number of consecutive error/blocked checks.
pub const CONSECUTIVE_FAILURES: &str = "consecutive_failures";
/// Key holding the RFC 3339 instant until which checking is suspended (empty when clear).
pub const BLOCKED_UNTIL: &str = "blocked_until";

/// Errors raised by state store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem error while preparing the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted timestamp could not be parsed
    #[error("Invalid timestamp {0:?}")]
    Timestamp(String),
}

/// One row of the append-only check log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLogEntry {
    /// When the check ran
    pub checked_at: DateTime<Utc>,
    /// Status of the check (`available`, `blocked`, ...)
    pub status: String,
    /// Normalized slots serialized as JSON
    pub slots_json: String,
    /// Hash of the check outcome
    pub result_hash: String,
    /// Evidence serialized as JSON
    pub evidence_json: String,
    /// Error message reported by the checker, if any
    pub error: Option<String>,
}

/// Where persisted state lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite database file
    pub sqlite_path: String,

    /// Name of the environment variable holding a PostgreSQL URL. When that
    /// variable is set, PostgreSQL is used instead of SQLite.
    pub postgres_url_env: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "./data/state.db".to_string(),
            postgres_url_env: Some("DATABASE_URL".to_string()),
        }
    }
}

/// Key-value state plus check log, shared by every backend.
///
/// Each method is a single statement against the backend, so a crash between
/// calls never leaves a half-written row behind.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create tables if they do not exist yet. Safe to call repeatedly.
    async fn init(&self) -> Result<(), StoreError>;

    /// Read a state value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace a state value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Append an entry to the check log.
    async fn insert_check_log(&self, entry: &CheckLogEntry) -> Result<(), StoreError>;

    /// Number of log entries checked at or after `since`.
    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Earliest log timestamp at or after `since`.
    async fn oldest_since(&self, since: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Formats a timestamp the way every backend stores it.
///
/// Fixed precision and a `Z` suffix keep lexicographic and chronological order
/// identical, which the `>=` range queries rely on.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`format_timestamp`] (any RFC 3339 offset is accepted).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_is_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 9, 30, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();

        let early_text = format_timestamp(&early);
        let late_text = format_timestamp(&late);

        assert_eq!(early_text, "2024-09-30T23:59:59.000000Z");
        assert!(early_text < late_text);
        assert_eq!(parse_timestamp(&late_text).unwrap(), late);
    }

    #[test]
    fn test_parse_timestamp_accepts_offsets() {
        let parsed = parse_timestamp("2024-10-01T02:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
