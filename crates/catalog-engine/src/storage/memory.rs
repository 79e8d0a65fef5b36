//! In-memory storage, used when no cache directory is configured and in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{CatalogError, CatalogResult};
use crate::storage::Storage;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<Vec<String>, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

fn owned_keys(keys: &[&str]) -> CatalogResult<Vec<String>> {
    if keys.is_empty() {
        return Err(CatalogError::InvalidInput("storage keys empty".to_string()));
    }
    Ok(keys.iter().map(|key| key.to_string()).collect())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write(&self, keys: &[&str], data: &Value) -> CatalogResult<()> {
        let keys = owned_keys(keys)?;
        self.data.lock().insert(keys, data.clone());
        Ok(())
    }

    async fn read(&self, keys: &[&str]) -> CatalogResult<Option<Value>> {
        let keys = owned_keys(keys)?;
        Ok(self.data.lock().get(&keys).cloned())
    }

    async fn list(&self, keys: &[&str]) -> CatalogResult<Vec<String>> {
        let data = self.data.lock();
        Ok(data
            .keys()
            .filter(|stored| {
                stored.len() == keys.len() + 1
                    && stored.iter().zip(keys.iter()).all(|(a, b)| a == b)
            })
            .filter_map(|stored| stored.last().cloned())
            .collect())
    }

    async fn delete(&self, keys: &[&str]) -> CatalogResult<bool> {
        let keys = owned_keys(keys)?;
        Ok(self.data.lock().remove(&keys).is_some())
    }
}
