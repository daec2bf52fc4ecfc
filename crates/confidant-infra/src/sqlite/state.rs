//! SQLite implementation of [`StateStore`].
//!
//! Records live in the `state_records` table as JSON text. The `version`
//! column backs compare-and-swap: inserts use `ON CONFLICT DO NOTHING` and
//! updates are guarded by `WHERE version = ?`, so a write that lost a race
//! affects zero rows and surfaces as [`StoreError::Conflict`].

use chrono::Utc;
use sqlx::Row;

use confidant_core::storage::state_store::{StateStore, StoredRecord};
use confidant_types::error::StoreError;

use super::pool::DatabasePool;

/// SQLite-backed state store.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: DatabasePool,
}

impl SqliteStateStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn format_datetime() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query("SELECT value, version FROM state_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.try_get("value").map_err(unavailable)?;
        let version: i64 = row.try_get("version").map_err(unavailable)?;
        let value = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Some(StoredRecord {
            value,
            version: u64::try_from(version).map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("negative version {version}"),
            })?,
        }))
    }

    async fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let now = format_datetime();

        let (result, new_version) = match expected_version {
            None => {
                let result = sqlx::query(
                    "INSERT INTO state_records (key, value, version, updated_at) \
                     VALUES (?, ?, 1, ?) ON CONFLICT(key) DO NOTHING",
                )
                .bind(key)
                .bind(&raw)
                .bind(&now)
                .execute(&self.pool.writer)
                .await
                .map_err(unavailable)?;
                (result, 1)
            }
            Some(expected) => {
                let next = expected + 1;
                let result = sqlx::query(
                    "UPDATE state_records SET value = ?, version = ?, updated_at = ? \
                     WHERE key = ? AND version = ?",
                )
                .bind(&raw)
                .bind(next as i64)
                .bind(&now)
                .bind(key)
                .bind(expected as i64)
                .execute(&self.pool.writer)
                .await
                .map_err(unavailable)?;
                (result, next)
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }
        Ok(new_version)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM state_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
