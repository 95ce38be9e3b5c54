use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::store::*;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS checks (
        id INTEGER PRIMARY KEY,
        checked_at TEXT NOT NULL,
        status TEXT NOT NULL,
        slots_json TEXT NOT NULL,
        result_hash TEXT NOT NULL,
        evidence_json TEXT NOT NULL,
        error TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_checks_checked_at ON checks (checked_at)",
    r#"
    CREATE TABLE IF NOT EXISTS state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// State store backed by an embedded SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Opens (and creates if needed) the database file at `path`.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        // One writer per process, so one connection is enough.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn init(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO state (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_check_log(&self, entry: &CheckLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO checks (checked_at, status, slots_json, result_hash, evidence_json, error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_timestamp(&entry.checked_at))
        .bind(&entry.status)
        .bind(&entry.slots_json)
        .bind(&entry.result_hash)
        .bind(&entry.evidence_json)
        .bind(entry.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM checks WHERE checked_at >= ?")
                .bind(format_timestamp(&since))
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn oldest_since(&self, since: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, StoreError> {
        let oldest = sqlx::query_scalar::<_, String>(
            "SELECT checked_at FROM checks WHERE checked_at >= ? ORDER BY checked_at ASC LIMIT 1",
        )
        .bind(format_timestamp(&since))
        .fetch_optional(&self.pool)
        .await?;

        oldest.as_deref().map(parse_timestamp).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn memory_store() -> SqliteStateStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStateStore::from_pool(pool);
        store.init().await.unwrap();
        store
    }

    fn entry_at(checked_at: DateTime<Utc>, status: &str) -> CheckLogEntry {
        CheckLogEntry {
            checked_at,
            status: status.to_string(),
            slots_json: "[]".to_string(),
            result_hash: "abc".to_string(),
            evidence_json: "{}".to_string(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = memory_store().await;
        store.init().await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.get(LAST_STATUS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_value() {
        let store = memory_store().await;

        store.set(LAST_STATUS, "unavailable").await.unwrap();
        store.set(LAST_STATUS, "available").await.unwrap();

        assert_eq!(
            store.get(LAST_STATUS).await.unwrap().as_deref(),
            Some("available")
        );
    }

    #[tokio::test]
    async fn test_count_and_oldest_since() {
        let store = memory_store().await;
        let base = Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap();

        store.insert_check_log(&entry_at(base - Duration::minutes(90), "error")).await.unwrap();
        store.insert_check_log(&entry_at(base - Duration::minutes(40), "available")).await.unwrap();
        store.insert_check_log(&entry_at(base - Duration::minutes(5), "available")).await.unwrap();

        let window_start = base - Duration::hours(1);
        assert_eq!(store.count_since(window_start).await.unwrap(), 2);
        assert_eq!(
            store.oldest_since(window_start).await.unwrap(),
            Some(base - Duration::minutes(40))
        );
        assert_eq!(store.oldest_since(base).await.unwrap(), None);
    }
}
