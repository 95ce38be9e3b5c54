use std::sync::Arc;

use crate::postgres::PostgresStateStore;
use crate::sqlite::SqliteStateStore;
use crate::store::{StateStore, StorageConfig, StoreError};

/// Opens the configured backend and makes sure its schema exists.
///
/// PostgreSQL is chosen when the environment variable named by
/// `postgres_url_env` is set and non-empty; otherwise the SQLite file at
/// `sqlite_path` is used.
pub async fn connect_state_store(config: &StorageConfig) -> Result<Arc<dyn StateStore>, StoreError> {
    let store: Arc<dyn StateStore> = match postgres_url(config) {
        Some(url) => {
            log::info!("Using PostgreSQL state store");
            Arc::new(PostgresStateStore::connect(&url).await?)
        }
        None => {
            log::info!("Using SQLite state store at {}", config.sqlite_path);
            Arc::new(SqliteStateStore::open(&config.sqlite_path).await?)
        }
    };

    store.init().await?;
    Ok(store)
}

fn postgres_url(config: &StorageConfig) -> Option<String> {
    let env_key = config.postgres_url_env.as_deref()?;
    std::env::var(env_key).ok().filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_url_requires_env_key() {
        let config = StorageConfig {
            sqlite_path: "./data/state.db".to_string(),
            postgres_url_env: None,
        };
        assert_eq!(postgres_url(&config), None);

        let config = StorageConfig {
            sqlite_path: "./data/state.db".to_string(),
            postgres_url_env: Some("WATCH_STORE_TEST_UNSET_DATABASE_URL".to_string()),
        };
        assert_eq!(postgres_url(&config), None);
    }
}
