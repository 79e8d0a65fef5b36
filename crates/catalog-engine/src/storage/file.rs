use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, CatalogResult};
use crate::storage::Storage;

/// One pretty-printed JSON file per key under a root directory.
#[derive(Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn build_dir(&self, keys: &[&str]) -> CatalogResult<PathBuf> {
        let mut path = self.root.clone();
        for key in keys {
            validate_key(key)?;
            path.push(key);
        }
        Ok(path)
    }

    fn build_path(&self, keys: &[&str]) -> CatalogResult<PathBuf> {
        if keys.is_empty() {
            return Err(CatalogError::InvalidInput("storage keys empty".to_string()));
        }
        let mut path = self.build_dir(&keys[..keys.len() - 1])?;
        let mut filename = keys[keys.len() - 1].to_string();
        validate_key(&filename)?;
        if !filename.ends_with(".json") {
            filename.push_str(".json");
        }
        path.push(filename);
        Ok(path)
    }

    async fn ensure_parent_dir(path: &Path) -> CatalogResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                CatalogError::Storage(format!(
                    "failed to create storage directory {}: {error}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn write(&self, keys: &[&str], data: &Value) -> CatalogResult<()> {
        let path = self.build_path(keys)?;
        Self::ensure_parent_dir(&path).await?;
        let serialized = serde_json::to_vec_pretty(data)
            .map_err(|error| CatalogError::Storage(format!("storage serialize error: {error}")))?;
        // Atomic write (temp file + rename)
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serialized)
            .await
            .map_err(|error| {
                CatalogError::Storage(format!(
                    "failed to write storage file {}: {error}",
                    tmp_path.display()
                ))
            })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|error| {
            CatalogError::Storage(format!(
                "failed to finalize storage file {}: {error}",
                path.display()
            ))
        })?;
        Ok(())
    }

    async fn read(&self, keys: &[&str]) -> CatalogResult<Option<Value>> {
        let path = self.build_path(keys)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(CatalogError::Storage(format!(
                    "failed to read storage file {}: {error}",
                    path.display()
                )))
            }
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|error| CatalogError::Storage(format!("storage parse error: {error}")))?;
        Ok(Some(value))
    }

    async fn list(&self, keys: &[&str]) -> CatalogResult<Vec<String>> {
        let dir = self.build_dir(keys)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(CatalogError::Storage(format!(
                    "failed to list storage directory {}: {error}",
                    dir.display()
                )))
            }
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            CatalogError::Storage(format!(
                "failed to list storage directory {}: {error}",
                dir.display()
            ))
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".json") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, keys: &[&str]) -> CatalogResult<bool> {
        let path = self.build_path(keys)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(CatalogError::Storage(format!(
                "failed to delete storage file {}: {error}",
                path.display()
            ))),
        }
    }
}

fn validate_key(key: &str) -> CatalogResult<()> {
    if key.is_empty() || key == "." || key == ".." {
        return Err(CatalogError::InvalidInput(format!("invalid storage key {key}")));
    }
    if key.contains('/') || key.contains('\\') {
        return Err(CatalogError::InvalidInput(format!("invalid storage key {key}")));
    }
    Ok(())
}
