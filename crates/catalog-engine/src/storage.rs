pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::CatalogResult;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Durable keyed JSON store. Keys are hierarchical segments, e.g.
/// `["fragments", "<fingerprint>"]`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn write(&self, keys: &[&str], data: &Value) -> CatalogResult<()>;
    async fn read(&self, keys: &[&str]) -> CatalogResult<Option<Value>>;
    /// Lists the names of entries stored directly under `keys`.
    async fn list(&self, keys: &[&str]) -> CatalogResult<Vec<String>>;
    /// Removes an entry. Returns whether anything was removed.
    async fn delete(&self, keys: &[&str]) -> CatalogResult<bool>;
}

pub type SharedStorage = Arc<dyn Storage>;
