//! Hierarchical catalog navigation with lazy fragment loading.
//!
//! A volume document describes its own levels. The engine answers
//! "children of this node at level L", "cousins of this node" and "first
//! descendant level with data", synthesising virtual, pseudo-parent and
//! aggregated levels along the way, fetching split-volume fragments on
//! demand through a versioned cache, and refusing to order any level whose
//! items lack authored sort numbers.

pub mod cache;
pub mod error;
pub mod item;
pub mod levels;
pub mod loader;
pub mod navigator;
pub mod normalize;
pub mod resolve;
pub mod settings;
pub mod sort;
pub mod storage;
pub mod utils;
pub mod volume;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use cache::CacheStore;
pub use error::{CatalogError, CatalogResult};
pub use item::{find_index, DataPath, Item, PathSegment, VirtualMembership};
pub use levels::ConfigResolver;
pub use loader::{DirectorySource, FragmentLoader, FragmentSource, FragmentState, HttpSource};
pub use navigator::{ChildLevel, Navigator};
pub use settings::{load_or_create_settings, EngineSettings};
pub use sort::SortDiagnostic;
pub use volume::discovery::{discover_volumes, VolumeSummary};
pub use volume::{LevelConfig, SharedVolume, Volume};
