//! Key-value state store trait.
//!
//! Records are opaque JSON values under namespaced keys
//! (`identity:{userId}`, `memory:{userId}`). Each record carries a version
//! that increases on every write, which gives callers compare-and-swap:
//! a read-modify-write that lost a race fails with
//! [`StoreError::Conflict`] instead of silently overwriting the other write.

use confidant_types::error::StoreError;
use confidant_types::identity::UserId;

/// Key namespace of [`Identity`](confidant_types::identity::Identity) records.
pub const IDENTITY_NAMESPACE: &str = "identity";
/// Key namespace of [`Memory`](confidant_types::memory::Memory) records.
pub const MEMORY_NAMESPACE: &str = "memory";

pub fn identity_key(user_id: &UserId) -> String {
    format!("{IDENTITY_NAMESPACE}:{user_id}")
}

pub fn memory_key(user_id: &UserId) -> String {
    format!("{MEMORY_NAMESPACE}:{user_id}")
}

/// A stored value together with its write version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub value: serde_json::Value,
    /// Starts at 1 on insert, incremented by every successful put.
    pub version: u64,
}

/// Trait for the per-user state store.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations must map connectivity failures to
/// [`StoreError::Unavailable`]; callers never treat that as an empty record.
pub trait StateStore: Send + Sync {
    /// Get a record by key. Returns None if the key does not exist.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<StoredRecord>, StoreError>> + Send;

    /// Write a record if its current version matches `expected_version`.
    ///
    /// `None` means "insert only if absent". Returns the new version.
    fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Delete a key. No-op if the key does not exist.
    fn delete(&self, key: &str)
    -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
