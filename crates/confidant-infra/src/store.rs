//! Runtime selection of the state store backend.
//!
//! The server picks SQLite by default and an in-process map for
//! `--ephemeral` runs. The orchestrator is generic over [`StateStore`], so a
//! small enum keeps both behind one concrete type.

use confidant_core::storage::memory::InMemoryStateStore;
use confidant_core::storage::state_store::{StateStore, StoredRecord};
use confidant_types::error::StoreError;

use crate::sqlite::state::SqliteStateStore;

pub enum StateBackend {
    Sqlite(SqliteStateStore),
    Memory(InMemoryStateStore),
}

impl StateBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            StateBackend::Sqlite(_) => "sqlite",
            StateBackend::Memory(_) => "memory",
        }
    }
}

impl StateStore for StateBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        match self {
            StateBackend::Sqlite(store) => store.get(key).await,
            StateBackend::Memory(store) => store.get(key).await,
        }
    }

    async fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        match self {
            StateBackend::Sqlite(store) => store.put(key, value, expected_version).await,
            StateBackend::Memory(store) => store.put(key, value, expected_version).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            StateBackend::Sqlite(store) => store.delete(key).await,
            StateBackend::Memory(store) => store.delete(key).await,
        }
    }
}
