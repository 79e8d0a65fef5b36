//! Versioned fragment cache.
//!
//! Entries are keyed by `"<volume>|<schema>|<data>::<fragment path>"`. A change
//! to any part of the version string makes old entries unreachable; they are
//! only removed by an explicit [`CacheStore::clear`].
//!
//! Two tiers: a bounded moka cache in front of a durable [`Storage`].

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CatalogError, CatalogResult};
use crate::storage::SharedStorage;
use crate::utils::time::now_rfc3339;

const FRAGMENT_NAMESPACE: &str = "fragments";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub payload: Value,
    pub stored_at: String,
}

pub fn version_string(volume_name: &str, schema_version: &str, data_version: &str) -> String {
    format!("{volume_name}|{schema_version}|{data_version}")
}

pub fn cache_key(version: &str, fragment_path: &str) -> String {
    format!("{version}::{fragment_path}")
}

#[derive(Clone)]
pub struct CacheStore {
    memory: Cache<String, Arc<Value>>,
    storage: SharedStorage,
}

impl CacheStore {
    pub fn new(storage: SharedStorage, max_entries: u64, ttl_seconds: u64) -> Self {
        let max_capacity = if max_entries == 0 { 1 } else { max_entries };
        let memory = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build();
        Self { memory, storage }
    }

    pub async fn get(&self, version: &str, fragment_path: &str) -> CatalogResult<Option<Arc<Value>>> {
        let key = cache_key(version, fragment_path);
        if let Some(payload) = self.memory.get(&key) {
            tracing::debug!("fragment cache hit (memory) for {key}");
            return Ok(Some(payload));
        }

        let fingerprint = cache_key_fingerprint(&key);
        let Some(raw) = self.storage.read(&[FRAGMENT_NAMESPACE, &fingerprint]).await? else {
            tracing::debug!("fragment cache miss for {key}");
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_value(raw)
            .map_err(|error| CatalogError::Storage(format!("invalid cache entry for {key}: {error}")))?;
        if entry.cache_key != key {
            tracing::debug!(
                "fragment cache entry {fingerprint} belongs to {}, not {key}",
                entry.cache_key
            );
            return Ok(None);
        }

        let payload = Arc::new(entry.payload);
        self.memory.insert(key.clone(), payload.clone());
        tracing::debug!("fragment cache hit (storage) for {key}");
        Ok(Some(payload))
    }

    pub async fn put(&self, version: &str, fragment_path: &str, payload: Arc<Value>) -> CatalogResult<()> {
        let key = cache_key(version, fragment_path);
        self.memory.insert(key.clone(), payload.clone());

        let entry = CacheEntry {
            cache_key: key.clone(),
            payload: (*payload).clone(),
            stored_at: now_rfc3339(),
        };
        let raw = serde_json::to_value(&entry)
            .map_err(|error| CatalogError::Storage(format!("failed to encode cache entry {key}: {error}")))?;
        self.storage
            .write(&[FRAGMENT_NAMESPACE, &cache_key_fingerprint(&key)], &raw)
            .await
    }

    /// Purges every entry regardless of version.
    pub async fn clear(&self) -> CatalogResult<usize> {
        self.memory.invalidate_all();
        let names = self.storage.list(&[FRAGMENT_NAMESPACE]).await?;
        let mut removed = 0;
        for name in &names {
            if self.storage.delete(&[FRAGMENT_NAMESPACE, name]).await? {
                removed += 1;
            }
        }
        tracing::info!("cleared {removed} cached fragments");
        Ok(removed)
    }
}

fn cache_key_fingerprint(key: &str) -> String {
    let mut hash = 0xcbf29ce484222325u64;
    fnv1a_update(&mut hash, key.as_bytes());
    format!("{hash:016x}")
}

fn fnv1a_update(hash: &mut u64, bytes: &[u8]) {
    const FNV_PRIME: u64 = 0x100000001b3;
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage, Storage};
    use serde_json::json;
    use tempfile::tempdir;

    fn memory_store() -> (CacheStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (CacheStore::new(storage.clone(), 16, 3600), storage)
    }

    #[test]
    fn builds_version_and_cache_keys() {
        let version = version_string("gutenberg", "2.0", "2024-05");
        assert_eq!(version, "gutenberg|2.0|2024-05");
        assert_eq!(
            cache_key(&version, "data/genesis/chapter1.json"),
            "gutenberg|2.0|2024-05::data/genesis/chapter1.json"
        );
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_storage() {
        let dir = tempdir().expect("tempdir");
        let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
        let payload = Arc::new(json!({ "verses": { "1": { "sort_number": 1 } } }));

        let writer = CacheStore::new(storage.clone(), 16, 3600);
        writer
            .put("v|1|1", "data/genesis/chapter1.json", payload.clone())
            .await
            .expect("put");

        // A fresh store has an empty memory tier and must read from disk.
        let reader = CacheStore::new(storage, 16, 3600);
        let loaded = reader
            .get("v|1|1", "data/genesis/chapter1.json")
            .await
            .expect("get")
            .expect("cached payload");
        assert_eq!(*loaded, *payload);
    }

    #[tokio::test]
    async fn changed_version_never_matches_old_entries() {
        let (store, storage) = memory_store();
        store
            .put("v|1|1", "data/a.json", Arc::new(json!({ "x": 1 })))
            .await
            .expect("put");

        let miss = store.get("v|1|2", "data/a.json").await.expect("get");
        assert!(miss.is_none());
        // Stale entries are not purged implicitly.
        assert_eq!(storage.list(&[FRAGMENT_NAMESPACE]).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn clear_purges_both_tiers() {
        let (store, storage) = memory_store();
        store
            .put("v|1|1", "data/a.json", Arc::new(json!({ "x": 1 })))
            .await
            .expect("put");
        store
            .put("v|1|1", "data/b.json", Arc::new(json!({ "x": 2 })))
            .await
            .expect("put");

        assert_eq!(store.clear().await.expect("clear"), 2);
        assert!(storage.is_empty());
        assert!(store.get("v|1|1", "data/a.json").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let (store, _) = memory_store();
        store
            .put("v|1|1", "data/a.json", Arc::new(json!({ "x": 1 })))
            .await
            .expect("put");
        store
            .put("v|1|1", "data/a.json", Arc::new(json!({ "x": 2 })))
            .await
            .expect("put");
        let loaded = store.get("v|1|1", "data/a.json").await.expect("get").expect("value");
        assert_eq!(*loaded, json!({ "x": 2 }));
    }
}
