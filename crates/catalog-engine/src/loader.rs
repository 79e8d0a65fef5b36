//! Lazy fragment loading for split volumes.
//!
//! Each external file moves through `Unloaded → Loading → Loaded`; a failed
//! load returns it to `Unloaded` so a later request can retry. While a file is
//! loading, every requester awaits the same spawned fetch.

pub mod merge;
pub mod source;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::{version_string, CacheStore};
use crate::error::{CatalogError, CatalogResult};
use crate::item::{DataPath, Item};
use crate::volume::SharedVolume;

pub use merge::merge_fragment;
pub use source::{DirectorySource, FragmentSource, HttpSource, SharedSource};

type PendingFetch = Shared<BoxFuture<'static, CatalogResult<()>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentState {
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Clone)]
pub struct FragmentLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    volume: SharedVolume,
    source: SharedSource,
    cache: Option<CacheStore>,
    pending: Mutex<HashMap<String, PendingFetch>>,
    loaded: Mutex<HashSet<String>>,
}

impl FragmentLoader {
    pub fn new(volume: SharedVolume, source: SharedSource, cache: Option<CacheStore>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                volume,
                source,
                cache,
                pending: Mutex::new(HashMap::new()),
                loaded: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn is_split_structure(&self) -> bool {
        self.inner.volume.read().is_split_structure()
    }

    pub fn is_chapter_split_structure(&self) -> bool {
        self.inner.volume.read().is_chapter_split_structure()
    }

    pub fn is_loaded(&self, path: &str) -> bool {
        self.inner.loaded.lock().contains(path)
    }

    pub fn fragment_state(&self, path: &str) -> FragmentState {
        let pending = self.inner.pending.lock();
        if self.inner.loaded.lock().contains(path) {
            FragmentState::Loaded
        } else if pending.contains_key(path) {
            FragmentState::Loading
        } else {
            FragmentState::Unloaded
        }
    }

    /// Makes sure the children of `item` are present in the volume.
    ///
    /// Succeeds without fetching for monolithic volumes, items without an
    /// external file marker, and fragments that are already loaded.
    pub async fn ensure_loaded(&self, item: &Item) -> CatalogResult<()> {
        let Some(path) = item.external_file() else {
            return Ok(());
        };
        let already_loaded = {
            let volume = self.inner.volume.read();
            if !volume.is_split_structure() {
                return Ok(());
            }
            volume.is_loaded_at(&item.data_path)
        };
        if already_loaded || self.is_loaded(path) {
            return Ok(());
        }
        self.load_external_file(path, item.data_path.clone()).await
    }

    /// Loads `path` and merges it into `target`. Concurrent calls for the same
    /// path share one fetch.
    pub async fn load_external_file(&self, path: &str, target: DataPath) -> CatalogResult<()> {
        let fetch = {
            let mut pending = self.inner.pending.lock();
            if self.inner.loaded.lock().contains(path) {
                return Ok(());
            }
            match pending.get(path) {
                Some(existing) => {
                    tracing::debug!("joining in-flight fetch for {path}");
                    existing.clone()
                }
                None => {
                    let fetch = self.spawn_fetch(path.to_string(), target);
                    pending.insert(path.to_string(), fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    fn spawn_fetch(&self, path: String, target: DataPath) -> PendingFetch {
        let inner = self.inner.clone();
        // Runs on its own task so the fetch completes even if every waiter
        // is dropped.
        let task = tokio::spawn(async move {
            let result = inner.fetch_and_merge(&path, &target).await;
            let mut pending = inner.pending.lock();
            pending.remove(&path);
            match &result {
                Ok(()) => {
                    inner.loaded.lock().insert(path.clone());
                    tracing::debug!("fragment {path} merged into {target}");
                }
                Err(error) => tracing::warn!("failed to load fragment {path}: {error}"),
            }
            result
        });
        async move {
            task.await.unwrap_or_else(|error| {
                Err(CatalogError::Internal(format!("fragment task failed: {error}")))
            })
        }
        .boxed()
        .shared()
    }
}

impl LoaderInner {
    async fn fetch_and_merge(&self, path: &str, target: &DataPath) -> CatalogResult<()> {
        let version = {
            let volume = self.volume.read();
            version_string(volume.name(), volume.schema_version(), volume.data_version())
        };

        let payload = match self.cached(&version, path).await {
            Some(payload) => payload,
            None => {
                let payload = Arc::new(self.source.fetch(path).await?);
                if let Some(cache) = &self.cache {
                    if let Err(error) = cache.put(&version, path, payload.clone()).await {
                        tracing::warn!("failed to cache fragment {path}: {error}");
                    }
                }
                payload
            }
        };

        let mut volume = self.volume.write();
        merge_fragment(&mut volume, target, &payload)
    }

    async fn cached(&self, version: &str, path: &str) -> Option<Arc<Value>> {
        let cache = self.cache.as_ref()?;
        match cache.get(version, path).await {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!("fragment cache read failed for {path}: {error}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::item::PathSegment;
    use crate::storage::MemoryStorage;
    use crate::volume::Volume;

    struct CountingSource {
        fetches: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FragmentSource for CountingSource {
        async fn fetch(&self, path: &str) -> CatalogResult<Value> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(CatalogError::Fetch {
                    path: path.to_string(),
                    message: "offline".to_string(),
                });
            }
            Ok(json!({ "verses": { "1": { "sort_number": 1 }, "2": { "sort_number": 2 } } }))
        }
    }

    fn shared_volume(structure: &str) -> SharedVolume {
        let volume = Volume::from_document(json!({
            "Gutenberg": {
                "display_config": {
                    "volume_type": "wheel_hierarchical",
                    "structure_type": structure,
                    "hierarchy_levels": { "book": {}, "chapter": {}, "verse": {} }
                },
                "books": {
                    "Genesis": {
                        "sort_number": 1,
                        "chapters": {
                            "1": { "sort_number": 1, "external_file": "data/genesis/chapter1.json" }
                        }
                    }
                }
            }
        }))
        .expect("volume");
        Arc::new(parking_lot::RwLock::new(volume))
    }

    fn chapter_one(volume: &SharedVolume) -> Item {
        let genesis = DataPath::root().child("books", PathSegment::Key("Genesis".into()));
        volume
            .read()
            .read_collection(&genesis, "chapter", &["Genesis".to_string()])
            .expect("chapters")
            .remove(0)
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let volume = shared_volume("split_chapters");
        let source = CountingSource::new(false);
        let loader = FragmentLoader::new(volume.clone(), source.clone(), None);
        let chapter = chapter_one(&volume);

        let (first, second) = tokio::join!(loader.ensure_loaded(&chapter), loader.ensure_loaded(&chapter));
        first.expect("first waiter");
        second.expect("second waiter");

        assert_eq!(source.count(), 1);
        assert_eq!(loader.fragment_state("data/genesis/chapter1.json"), FragmentState::Loaded);
        let verses = volume
            .read()
            .read_collection(&chapter.data_path, "verse", &[])
            .expect("verses");
        assert_eq!(verses.len(), 2);

        loader.ensure_loaded(&chapter).await.expect("already loaded");
        assert_eq!(source.count(), 1);
    }

    #[tokio::test]
    async fn monolithic_volumes_never_fetch() {
        let volume = shared_volume("monolithic");
        let source = CountingSource::new(false);
        let loader = FragmentLoader::new(volume.clone(), source.clone(), None);
        loader
            .ensure_loaded(&chapter_one(&volume))
            .await
            .expect("no-op");
        assert_eq!(source.count(), 0);
        assert!(!loader.is_split_structure());
    }

    #[tokio::test]
    async fn failed_fetch_returns_to_unloaded_and_can_retry() {
        let volume = shared_volume("split");
        let source = CountingSource::new(true);
        let loader = FragmentLoader::new(volume.clone(), source.clone(), None);
        let chapter = chapter_one(&volume);
        let before = volume.read().data().clone();

        let error = loader.ensure_loaded(&chapter).await.expect_err("offline");
        assert!(matches!(error, CatalogError::Fetch { .. }), "got {error:?}");
        assert_eq!(loader.fragment_state("data/genesis/chapter1.json"), FragmentState::Unloaded);
        assert_eq!(volume.read().data(), &before);

        loader.ensure_loaded(&chapter).await.expect_err("still offline");
        assert_eq!(source.count(), 2);
    }

    #[tokio::test]
    async fn cache_is_checked_before_the_source() {
        let volume = shared_volume("split_chapters");
        let cache = CacheStore::new(Arc::new(MemoryStorage::new()), 16, 3600);

        let warm_source = CountingSource::new(false);
        let warm = FragmentLoader::new(volume.clone(), warm_source.clone(), Some(cache.clone()));
        warm.ensure_loaded(&chapter_one(&volume)).await.expect("warm load");
        assert_eq!(warm_source.count(), 1);

        // A new loader over a fresh volume with the same version hits the cache.
        let fresh = shared_volume("split_chapters");
        let cold_source = CountingSource::new(true);
        let cold = FragmentLoader::new(fresh.clone(), cold_source.clone(), Some(cache));
        cold.ensure_loaded(&chapter_one(&fresh)).await.expect("cached load");
        assert_eq!(cold_source.count(), 0);
        assert!(cold.is_chapter_split_structure());
    }
}
