//! In-process [`StateStore`] backed by a concurrent hash map.
//!
//! Used for ephemeral servers and tests. Compare-and-swap is enforced per
//! key under the map's shard lock.

use confidant_types::error::StoreError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::state_store::{StateStore, StoredRecord};

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: DashMap<String, StoredRecord>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let conflict = || StoreError::Conflict {
            key: key.to_string(),
        };

        match (self.records.entry(key.to_string()), expected_version) {
            (Entry::Vacant(slot), None) => {
                slot.insert(StoredRecord {
                    value: value.clone(),
                    version: 1,
                });
                Ok(1)
            }
            (Entry::Occupied(mut slot), Some(expected)) if slot.get().version == expected => {
                let version = expected + 1;
                slot.insert(StoredRecord {
                    value: value.clone(),
                    version,
                });
                Ok(version)
            }
            _ => Err(conflict()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = InMemoryStateStore::new();
        let version = store.put("memory:user-1", &json!({"a": 1}), None).await.unwrap();
        assert_eq!(version, 1);

        let record = store.get("memory:user-1").await.unwrap().unwrap();
        assert_eq!(record.value, json!({"a": 1}));
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_insert_conflicts_when_present() {
        let store = InMemoryStateStore::new();
        store.put("k", &json!(1), None).await.unwrap();
        let err = store.put("k", &json!(2), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryStateStore::new();
        store.put("k", &json!(1), None).await.unwrap();
        assert_eq!(store.put("k", &json!(2), Some(1)).await.unwrap(), 2);

        let err = store.put("k", &json!(3), Some(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get("k").await.unwrap().unwrap().value, json!(2));
    }

    #[tokio::test]
    async fn test_update_of_missing_key_conflicts() {
        let store = InMemoryStateStore::new();
        let err = store.put("k", &json!(1), Some(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStateStore::new();
        store.put("k", &json!(1), None).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }
}
