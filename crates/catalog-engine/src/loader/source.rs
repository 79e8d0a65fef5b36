//! Where volume documents and fragments are fetched from.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CatalogError, CatalogResult};

#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Fetches and parses the JSON document at `path` (relative to the
    /// source's root).
    async fn fetch(&self, path: &str) -> CatalogResult<Value>;
}

pub type SharedSource = Arc<dyn FragmentSource>;

/// Reads documents from a local data directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn build_path(&self, path: &str) -> CatalogResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if path.trim().is_empty() || escapes {
            return Err(CatalogError::InvalidInput(format!("invalid fragment path {path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FragmentSource for DirectorySource {
    async fn fetch(&self, path: &str) -> CatalogResult<Value> {
        let full_path = self.build_path(path)?;
        let bytes = tokio::fs::read(&full_path).await.map_err(|error| CatalogError::Fetch {
            path: path.to_string(),
            message: format!("failed to read {}: {error}", full_path.display()),
        })?;
        serde_json::from_slice(&bytes).map_err(|error| CatalogError::Fetch {
            path: path.to_string(),
            message: format!("invalid JSON: {error}"),
        })
    }
}

/// Fetches documents over HTTP(S) relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> CatalogResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CatalogError::Internal(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl FragmentSource for HttpSource {
    async fn fetch(&self, path: &str) -> CatalogResult<Value> {
        let url = self.url_for(path);
        let fetch_error = |message: String| CatalogError::Fetch {
            path: path.to_string(),
            message,
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| fetch_error(format!("request to {url} failed: {error}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("{url} returned {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|error| fetch_error(format!("invalid JSON from {url}: {error}")))
    }
}
