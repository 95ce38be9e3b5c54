use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::store::*;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS checks (
        id SERIAL PRIMARY KEY,
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

/// State store backed by a PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Connects to the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn init(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO state (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
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
            VALUES ($1, $2, $3, $4, $5, $6)
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
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM checks WHERE checked_at >= $1")
                .bind(format_timestamp(&since))
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn oldest_since(&self, since: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, StoreError> {
        let oldest = sqlx::query_scalar::<_, String>(
            "SELECT checked_at FROM checks WHERE checked_at >= $1 ORDER BY checked_at ASC LIMIT 1",
        )
        .bind(format_timestamp(&since))
        .fetch_optional(&self.pool)
        .await?;

        oldest.as_deref().map(parse_timestamp).transpose()
    }
}
