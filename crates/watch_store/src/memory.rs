use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::store::*;

/// State store kept entirely in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<HashMap<String, String>>,
    checks: Mutex<Vec<CheckLogEntry>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every logged check, in insertion order.
    pub async fn check_log(&self) -> Vec<CheckLogEntry> {
        self.checks.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn insert_check_log(&self, entry: &CheckLogEntry) -> Result<(), StoreError> {
        self.checks.lock().await.push(entry.clone());
        Ok(())
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let checks = self.checks.lock().await;
        Ok(checks.iter().filter(|c| c.checked_at >= since).count() as i64)
    }

    async fn oldest_since(&self, since: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, StoreError> {
        let checks = self.checks.lock().await;
        Ok(checks
            .iter()
            .map(|c| c.checked_at)
            .filter(|checked_at| *checked_at >= since)
            .min())
    }
}
