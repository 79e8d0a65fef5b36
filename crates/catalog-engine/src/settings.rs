use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::error::{CatalogError, CatalogResult};
use crate::loader::{DirectorySource, HttpSource, SharedSource};
use crate::storage::{FileStorage, MemoryStorage, SharedStorage};
use crate::utils::time::now_secs;
use crate::volume::discovery::{discover_volumes, VolumeSummary};

pub const SETTINGS_FILENAME: &str = "catalog-engine.json";
pub const SETTINGS_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub version: String,
    /// Local directory or `http(s)://` base URL holding volumes and fragments.
    pub data_root: String,
    /// Persistent fragment cache; in-memory only when unset.
    pub cache_dir: Option<PathBuf>,
    pub memory_cache_capacity: u64,
    pub memory_cache_ttl_seconds: u64,
    pub volume_index: String,
    pub request_timeout_seconds: u64,
    pub created_at: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION.to_string(),
            data_root: "data".to_string(),
            cache_dir: None,
            memory_cache_capacity: 256,
            memory_cache_ttl_seconds: 86_400,
            volume_index: "index.json".to_string(),
            request_timeout_seconds: 30,
            created_at: 0,
        }
    }
}

impl EngineSettings {
    pub fn default_new() -> Self {
        Self {
            created_at: now_secs(),
            ..Self::default()
        }
    }

    pub fn is_remote(&self) -> bool {
        self.data_root.starts_with("http://") || self.data_root.starts_with("https://")
    }

    pub fn fragment_source(&self) -> CatalogResult<SharedSource> {
        if self.is_remote() {
            let timeout = Duration::from_secs(self.request_timeout_seconds);
            return Ok(Arc::new(HttpSource::new(self.data_root.clone(), timeout)?));
        }
        Ok(Arc::new(DirectorySource::new(&self.data_root)))
    }

    pub fn cache_store(&self) -> CatalogResult<CacheStore> {
        let storage: SharedStorage = match &self.cache_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|error| {
                    CatalogError::Storage(format!(
                        "failed to create cache directory {}: {error}",
                        dir.display()
                    ))
                })?;
                Arc::new(FileStorage::new(dir.clone()))
            }
            None => Arc::new(MemoryStorage::new()),
        };
        Ok(CacheStore::new(
            storage,
            self.memory_cache_capacity,
            self.memory_cache_ttl_seconds,
        ))
    }

    pub async fn discover_volumes(&self) -> CatalogResult<Vec<VolumeSummary>> {
        let source = self.fragment_source()?;
        Ok(discover_volumes(source.as_ref(), &self.volume_index).await)
    }
}

pub fn load_or_create_settings(dir: &Path) -> CatalogResult<EngineSettings> {
    std::fs::create_dir_all(dir).map_err(|error| {
        CatalogError::Storage(format!(
            "failed to create settings directory {}: {error}",
            dir.display()
        ))
    })?;

    let path = settings_path(dir);
    if !path.exists() {
        let settings = EngineSettings::default_new();
        write_settings(&path, &settings)?;
        tracing::info!("created default settings at {}", path.display());
        return Ok(settings);
    }

    let data = std::fs::read_to_string(&path).map_err(|error| {
        CatalogError::Storage(format!("failed to read settings {}: {error}", path.display()))
    })?;
    let mut settings: EngineSettings = serde_json::from_str(&data).map_err(|error| {
        CatalogError::Config(format!("failed to parse settings {}: {error}", path.display()))
    })?;

    if settings.version != SETTINGS_VERSION {
        tracing::info!(
            "upgrading settings {} from version {}",
            path.display(),
            settings.version
        );
        settings.version = SETTINGS_VERSION.to_string();
        write_settings(&path, &settings)?;
    }

    Ok(settings)
}

pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join(SETTINGS_FILENAME)
}

fn write_settings(path: &Path, settings: &EngineSettings) -> CatalogResult<()> {
    let data = serde_json::to_string_pretty(settings).map_err(|error| {
        CatalogError::Internal(format!(
            "failed to serialize settings {}: {error}",
            path.display()
        ))
    })?;
    std::fs::write(path, data).map_err(|error| {
        CatalogError::Storage(format!("failed to write settings {}: {error}", path.display()))
    })?;
    Ok(())
}
