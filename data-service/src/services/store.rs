use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store command timed out after {0:?}")]
    Timeout(Duration),

    #[error("store client is closed")]
    Closed,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value operations the record repository needs.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Set `field` only if it does not exist yet. Returns whether it was set.
    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError>;

    /// Remove `field`. Returns whether it existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn hash_values(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Write `key[id] = value` and `index[unique] = id` as one atomic step.
    ///
    /// Refused (returns `false`) when `index[unique]` already names a live
    /// entry of `key`. An index entry whose target is missing is stale and
    /// gets replaced.
    async fn insert_unique(
        &self,
        key: &str,
        id: &str,
        value: &str,
        index: &str,
        unique: &str,
    ) -> Result<bool, StoreError>;

    /// Remove `key[id]` and, if it still points at `id`, `index[unique]`,
    /// as one atomic step. Returns whether the entry existed.
    async fn remove_unique(
        &self,
        key: &str,
        id: &str,
        index: &str,
        unique: &str,
    ) -> Result<bool, StoreError>;
}

/// In-process store for local runs and tests.
///
/// `set_available(false)` simulates an outage: every operation fails until
/// availability is restored.
pub struct MemoryStore {
    available: AtomicBool,
    strings: Mutex<HashMap<String, String>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            strings: Mutex::new(HashMap::new()),
            hashes: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }

    fn with_hashes<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, HashMap<String, String>>) -> T,
    ) -> Result<T, StoreError> {
        self.check()?;
        let mut hashes = self
            .hashes
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(f(&mut hashes))
    }

    fn with_strings<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> Result<T, StoreError> {
        self.check()?;
        let mut strings = self
            .strings
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(f(&mut strings))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_strings(|strings| strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_strings(|strings| {
            strings.insert(key.to_string(), value.to_string());
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let in_strings = self.with_strings(|strings| strings.contains_key(key))?;
        if in_strings {
            return Ok(true);
        }
        self.with_hashes(|hashes| hashes.get(key).is_some_and(|h| !h.is_empty()))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.with_hashes(|hashes| hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.with_hashes(|hashes| {
            hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        })
    }

    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        self.with_hashes(|hashes| {
            let hash = hashes.entry(key.to_string()).or_default();
            if hash.contains_key(field) {
                false
            } else {
                hash.insert(field.to_string(), value.to_string());
                true
            }
        })
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.with_hashes(|hashes| {
            hashes
                .get_mut(key)
                .is_some_and(|h| h.remove(field).is_some())
        })
    }

    async fn hash_values(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_hashes(|hashes| {
            hashes
                .get(key)
                .map(|h| h.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn insert_unique(
        &self,
        key: &str,
        id: &str,
        value: &str,
        index: &str,
        unique: &str,
    ) -> Result<bool, StoreError> {
        self.with_hashes(|hashes| {
            let owner = hashes.get(index).and_then(|h| h.get(unique)).cloned();
            if let Some(owner) = owner {
                if hashes.get(key).is_some_and(|h| h.contains_key(&owner)) {
                    return false;
                }
            }
            hashes
                .entry(index.to_string())
                .or_default()
                .insert(unique.to_string(), id.to_string());
            hashes
                .entry(key.to_string())
                .or_default()
                .insert(id.to_string(), value.to_string());
            true
        })
    }

    async fn remove_unique(
        &self,
        key: &str,
        id: &str,
        index: &str,
        unique: &str,
    ) -> Result<bool, StoreError> {
        self.with_hashes(|hashes| {
            let removed = hashes.get_mut(key).is_some_and(|h| h.remove(id).is_some());
            if removed {
                if let Some(index) = hashes.get_mut(index) {
                    if index.get(unique).map(String::as_str) == Some(id) {
                        index.remove(unique);
                    }
                }
            }
            removed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_claims_once() {
        let store = MemoryStore::new();
        assert!(store.hash_set_if_absent("idx", "a", "1").await.unwrap());
        assert!(!store.hash_set_if_absent("idx", "a", "2").await.unwrap());
        assert_eq!(
            store.hash_get("idx", "a").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn hash_delete_reports_presence() {
        let store = MemoryStore::new();
        store.hash_set("h", "f", "v").await.unwrap();
        assert!(store.hash_delete("h", "f").await.unwrap());
        assert!(!store.hash_delete("h", "f").await.unwrap());
        assert!(store.hash_values("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_unique_refuses_live_owner_and_replaces_stale_one() {
        let store = MemoryStore::new();
        assert!(store.insert_unique("r", "1", "one", "idx", "a").await.unwrap());
        assert!(!store.insert_unique("r", "2", "two", "idx", "a").await.unwrap());
        assert!(store.hash_get("r", "2").await.unwrap().is_none());

        // Index entry left behind without its target.
        store.hash_set("idx", "b", "9").await.unwrap();
        assert!(store.insert_unique("r", "3", "three", "idx", "b").await.unwrap());
        assert_eq!(
            store.hash_get("idx", "b").await.unwrap().as_deref(),
            Some("3")
        );
    }

    #[tokio::test]
    async fn remove_unique_keeps_index_owned_by_another_entry() {
        let store = MemoryStore::new();
        store.insert_unique("r", "1", "one", "idx", "a").await.unwrap();
        store.hash_set("idx", "a", "2").await.unwrap();

        assert!(store.remove_unique("r", "1", "idx", "a").await.unwrap());
        assert!(!store.remove_unique("r", "1", "idx", "a").await.unwrap());
        assert_eq!(
            store.hash_get("idx", "a").await.unwrap().as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.set_available(false);

        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.get("k").await.is_err());
        assert!(store.hash_values("h").await.is_err());

        store.set_available(true);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
