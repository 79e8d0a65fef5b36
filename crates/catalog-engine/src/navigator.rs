//! Query and navigation facade.
//!
//! Every request follows the same path: make sure the node's fragment is
//! present, produce the raw or synthesized children, validate and order
//! them. Failures below this layer never escape as panics or partial lists;
//! callers get an empty level and, for sort validation failures, a
//! diagnostic retrievable through [`Navigator::take_diagnostics`].


use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::cache::CacheStore;
use crate::error::{CatalogError, CatalogResult};
use crate::item::{self, DataPath, Item, PathSegment, PseudoContext, PseudoFilter, VirtualMembership};
use crate::levels::ConfigResolver;
use crate::loader::{FragmentLoader, SharedSource};
use crate::normalize::extract_parent_properties;
use crate::resolve::{
    aggregated_items, can_skip_virtual_level, pseudo_children, resolve_pseudo_level,
    resolve_virtual_level, virtual_children, Anchor,
};
use crate::settings::EngineSettings;
use crate::sort::{SortDiagnostic, Sorter};
use crate::volume::{LevelConfig, SharedVolume, Volume};

/// First level under a node that produced items, or the level where the
/// walk had to stop.
#[derive(Debug, Clone)]
pub struct ChildLevel {
    pub level: String,
    pub items: Vec<Item>,
}

impl ChildLevel {
    fn empty(level: &str) -> Self {
        Self {
            level: level.to_string(),
            items: Vec::new(),
        }
    }
}

pub struct Navigator {
    volume: SharedVolume,
    levels: Arc<ConfigResolver>,
    loader: FragmentLoader,
    diagnostics: Mutex<Vec<SortDiagnostic>>,
}

impl Navigator {
    pub fn new(volume: Volume, source: SharedSource, cache: Option<CacheStore>) -> Self {
        let levels = Arc::new(volume.levels().clone());
        let volume = Arc::new(RwLock::new(volume));
        let loader = FragmentLoader::new(volume.clone(), source, cache);
        Self {
            volume,
            levels,
            loader,
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Loads the volume at `volume_path` from the configured data root and
    /// wires up the configured cache.
    pub async fn open(settings: &EngineSettings, volume_path: &str) -> CatalogResult<Self> {
        let source = settings.fragment_source()?;
        let document = source.fetch(volume_path).await?;
        let volume = Volume::from_document(document)?;
        let cache = settings.cache_store()?;
        Ok(Self::new(volume, source, Some(cache)))
    }

    pub fn volume(&self) -> &SharedVolume {
        &self.volume
    }

    pub fn levels(&self) -> &ConfigResolver {
        &self.levels
    }

    pub fn loader(&self) -> &FragmentLoader {
        &self.loader
    }

    pub fn top_level(&self) -> Vec<Item> {
        let Some(level) = self.levels.level_at(0) else {
            return Vec::new();
        };
        let result = {
            let volume = self.volume.read();
            let is_virtual = self.levels.config_at(0).is_some_and(|config| config.is_virtual);
            if is_virtual {
                resolve_virtual_level(&volume, Anchor::root(), level).map(|outcome| outcome.into_items())
            } else {
                volume.read_collection(&DataPath::root(), level, &[])
            }
        };
        self.deliver(result.and_then(|items| self.sort(items)), level)
    }

    pub async fn ensure_loaded(&self, node: &Item) -> CatalogResult<()> {
        self.loader.ensure_loaded(node).await
    }

    /// Ordered children of `node` at `level`. Empty when the level has no
    /// data, when the node's fragment could not be loaded, or when the items
    /// failed sort validation.
    pub async fn children_of(&self, node: &Item, level: &str) -> Vec<Item> {
        let result = self.try_children_of(node, level).await;
        self.deliver(result, &node.key)
    }

    pub async fn try_children_of(&self, node: &Item, level: &str) -> CatalogResult<Vec<Item>> {
        let (depth, config) = self.levels.require_level(level)?;
        if depth <= node.level_depth {
            return Err(CatalogError::InvalidInput(format!(
                "level {level} is not below {}",
                node.level
            )));
        }
        self.loader.ensure_loaded(node).await?;

        if let Some(intermediate) = self.aggregation_across(node, config) {
            return self.aggregate(node, intermediate, level).await;
        }
        if !can_skip_virtual_level(&node.level, level, &self.levels) {
            tracing::debug!("levels between {} and {level} cannot be bypassed", node.level);
            return Ok(Vec::new());
        }

        let items = {
            let volume = self.volume.read();
            self.resolve_children(&volume, node, level, depth, config)?
        };
        let inherited = extract_parent_properties(node, &self.levels);
        self.sort(with_inherited(items, &inherited))
    }

    fn resolve_children(
        &self,
        volume: &Volume,
        node: &Item,
        level: &str,
        depth: usize,
        config: &LevelConfig,
    ) -> CatalogResult<Vec<Item>> {
        if node.is_pseudo_parent() {
            return pseudo_children(volume, node, level);
        }
        if node.virtual_group.is_some() {
            if depth != node.level_depth + 1 {
                return Ok(Vec::new());
            }
            return virtual_children(volume, node, level);
        }
        if config.is_virtual {
            return resolve_virtual_level(volume, Anchor::of(node), level).map(|outcome| outcome.into_items());
        }
        if config.is_pseudo_parent {
            return resolve_pseudo_level(volume, node, level);
        }
        if config.aggregates_across.as_deref() == Some(node.level.as_str()) {
            return aggregated_items(volume, node, level);
        }
        volume.read_collection(&node.data_path, level, &node.path)
    }

    /// The intermediate level to flatten across, when `node` sits above it.
    fn aggregation_across<'a>(&self, node: &Item, config: &'a LevelConfig) -> Option<&'a str> {
        let intermediate = config.aggregates_across.as_deref()?;
        if node.is_pseudo_parent() || node.virtual_group.is_some() {
            return None;
        }
        let intermediate_depth = self.levels.level_depth(intermediate)?;
        (intermediate_depth > node.level_depth).then_some(intermediate)
    }

    async fn aggregate(&self, node: &Item, intermediate: &str, level: &str) -> CatalogResult<Vec<Item>> {
        if !can_skip_virtual_level(&node.level, intermediate, &self.levels) {
            return Ok(Vec::new());
        }
        let intermediates = {
            let volume = self.volume.read();
            volume.read_collection(&node.data_path, intermediate, &node.path)?
        };
        let inherited = extract_parent_properties(node, &self.levels);
        let intermediates = self.sort(with_inherited(intermediates, &inherited))?;

        let mut items = Vec::new();
        for parent in &intermediates {
            if let Err(error) = self.loader.ensure_loaded(parent).await {
                tracing::warn!("skipping {} while aggregating {level}: {error}", parent.key);
                continue;
            }
            let members = {
                let volume = self.volume.read();
                aggregated_items(&volume, parent, level)?
            };
            let inherited = extract_parent_properties(parent, &self.levels);
            items.extend(self.sort(with_inherited(members, &inherited))?);
        }
        tracing::debug!(
            "aggregated {} {level} item(s) across {} {intermediate}(s) under {}",
            items.len(),
            intermediates.len(),
            node.key
        );
        Ok(items)
    }

    /// Walks forward from `starting_level` through bypassable levels until
    /// one yields items. A level that is empty and cannot be bypassed ends
    /// the walk and the node is treated as a leaf.
    pub async fn resolve_child_level(&self, node: &Item, starting_level: &str) -> ChildLevel {
        let Some(start) = self.levels.level_depth(starting_level) else {
            tracing::warn!("cannot resolve children of {}: unknown level {starting_level}", node.key);
            return ChildLevel::empty(starting_level);
        };
        let names = self.levels.level_names();
        for depth in start..names.len() {
            let level = names[depth].as_str();
            match self.try_children_of(node, level).await {
                Ok(items) if !items.is_empty() => {
                    let level = items[0].level.clone();
                    return ChildLevel { level, items };
                }
                Ok(_) => {}
                Err(CatalogError::SortValidation(_)) => return ChildLevel::empty(level),
                Err(error) => {
                    tracing::warn!("treating {} as a leaf: {error}", node.key);
                    return ChildLevel::empty(level);
                }
            }

            let skippable = self.levels.config_at(depth).is_some_and(LevelConfig::is_skippable);
            let next = names.get(depth + 1);
            let bypass = skippable && next.is_some_and(|next| can_skip_virtual_level(&node.level, next, &self.levels));
            if !bypass {
                return ChildLevel::empty(level);
            }
        }
        ChildLevel::empty(starting_level)
    }

    /// Items at `level` across the node's parent group and every later
    /// sibling group, with two gap markers between groups. Earlier groups are
    /// never included.
    ///
    /// A top-level node has no parent: its own level is the whole top level,
    /// and a deeper `level` is gathered from the node and its later siblings.
    pub async fn cousins_of(&self, node: &Item, level: &str) -> Vec<Option<Item>> {
        if node.level_depth == 0 {
            let top = self.top_level();
            if level == node.level {
                return top.into_iter().map(Some).collect();
            }
            let groups = match top.iter().position(|item| item.key == node.key) {
                Some(start) => top[start..].to_vec(),
                None => vec![node.clone()],
            };
            return self.gather_cousins(&groups, level).await;
        }
        let Some(parent_depth) = named_ancestor(node, node.level_depth) else {
            return vec![Some(node.clone())];
        };
        let Some(parent_level) = self.levels.level_at(parent_depth) else {
            return vec![Some(node.clone())];
        };
        let Some(parent) = self.build_parent_from_child(node, parent_level) else {
            return vec![Some(node.clone())];
        };

        let uncles = match named_ancestor(node, parent_depth) {
            None => self.top_level(),
            Some(grandparent_depth) => {
                let grandparent = self
                    .levels
                    .level_at(grandparent_depth)
                    .and_then(|grandparent_level| self.build_parent_from_child(node, grandparent_level));
                match grandparent {
                    Some(grandparent) => self.children_of(&grandparent, parent_level).await,
                    None => Vec::new(),
                }
            }
        };
        let groups = match uncles.iter().position(|uncle| uncle.key == parent.key) {
            Some(start) => uncles[start..].to_vec(),
            None => vec![parent],
        };
        self.gather_cousins(&groups, level).await
    }

    async fn gather_cousins(&self, groups: &[Item], level: &str) -> Vec<Option<Item>> {
        let mut cousins = Vec::new();
        for group in groups {
            let children = self.children_of(group, level).await;
            if children.is_empty() {
                continue;
            }
            if !cousins.is_empty() {
                cousins.push(None);
                cousins.push(None);
            }
            cousins.extend(children.into_iter().map(Some));
        }
        cousins
    }

    /// Rebuilds the ancestor of `child` at `parent_level` from the child's
    /// display path and storage location alone.
    pub fn build_parent_from_child(&self, child: &Item, parent_level: &str) -> Option<Item> {
        let (depth, config) = self.levels.require_level(parent_level).ok()?;
        if depth >= child.level_depth {
            return None;
        }
        let name = child.path.get(depth)?.clone();
        let ancestry = &child.path[..depth];
        let data_path = storage_prefix(child, depth, &self.levels);

        if name.is_empty() {
            if !config.is_virtual {
                return None;
            }
            let mut item = Item::new("", parent_level, depth, ancestry, data_path);
            item.virtual_group = Some(VirtualMembership::PassThrough);
            return Some(item);
        }

        let mut item = Item::new(name.clone(), parent_level, depth, ancestry, data_path);
        item.is_leaf = self.levels.is_leaf_level(parent_level);
        if config.is_virtual {
            let membership = if name == config.orphan_group_name() {
                VirtualMembership::Orphan
            } else {
                VirtualMembership::Group(name)
            };
            item.virtual_group = Some(membership);
        } else if config.is_pseudo_parent {
            item.pseudo = Some(self.rebuild_pseudo_context(child, depth)?);
        }
        Some(item)
    }

    fn rebuild_pseudo_context(&self, child: &Item, depth: usize) -> Option<PseudoContext> {
        let levels = &self.levels;
        let mut first = depth;
        while first > 0 && levels.config_at(first - 1).is_some_and(|config| config.is_pseudo_parent) {
            first -= 1;
        }
        let owner_level = levels.level_at(first.checked_sub(1)?)?.to_string();
        let terminal_level = levels.level_at(levels.terminal_level_after(depth)?)?.to_string();
        let filters = (first..=depth)
            .filter_map(|chain_depth| {
                let segment = child.path.get(chain_depth).filter(|segment| !segment.is_empty())?;
                let level = levels.level_at(chain_depth)?;
                let config = levels.config_at(chain_depth)?;
                let value = (segment != config.pseudo_orphan_group_name()).then(|| segment.clone());
                Some(PseudoFilter {
                    trigger: config.pseudo_trigger(level),
                    value_property: config.pseudo_value_property(level).to_string(),
                    orphan_group: config.pseudo_orphan_group_name().to_string(),
                    value,
                })
            })
            .collect();
        Some(PseudoContext {
            level: levels.level_at(depth)?.to_string(),
            terminal_level,
            owner_level,
            filters,
            source: None,
        })
    }

    pub fn find_index(&self, item: &Item, items: &[Option<Item>]) -> Option<usize> {
        item::find_index(item, items)
    }

    pub fn display_label(&self, item: &Item) -> String {
        self.levels.display_label(item)
    }

    /// Sort validation reports collected since the last call.
    pub fn take_diagnostics(&self) -> Vec<SortDiagnostic> {
        std::mem::take(&mut *self.diagnostics.lock())
    }

    fn sort(&self, items: Vec<Item>) -> CatalogResult<Vec<Item>> {
        let Some(level) = items.first().map(|item| item.level.clone()) else {
            return Ok(items);
        };
        Sorter::new(&self.levels).sort_items(items, &level).map_err(|diagnostic| {
            tracing::error!("refusing to display level {level}: {}", diagnostic.summary());
            self.diagnostics.lock().push(diagnostic.clone());
            CatalogError::SortValidation(diagnostic)
        })
    }

    fn deliver(&self, result: CatalogResult<Vec<Item>>, context: &str) -> Vec<Item> {
        match result {
            Ok(items) => items,
            Err(CatalogError::SortValidation(_)) => Vec::new(),
            Err(error) => {
                tracing::warn!("no children for {context}: {error}");
                Vec::new()
            }
        }
    }
}

fn with_inherited(mut items: Vec<Item>, inherited: &Map<String, Value>) -> Vec<Item> {
    for item in &mut items {
        item.inherited = inherited.clone();
    }
    items
}

/// Deepest ancestor depth below `depth` whose path segment was not bypassed.
fn named_ancestor(node: &Item, depth: usize) -> Option<usize> {
    (0..depth).rev().find(|ancestor| node.path.get(*ancestor).is_some_and(|segment| !segment.is_empty()))
}

/// Leading storage pairs of `child` that belong to levels at or above `depth`.
fn storage_prefix(child: &Item, depth: usize, levels: &ConfigResolver) -> DataPath {
    let pairs = child
        .data_path
        .pairs()
        .take_while(|(collection, _)| match collection {
            PathSegment::Key(collection) => levels
                .level_for_collection(collection)
                .is_some_and(|collection_depth| collection_depth <= depth),
            PathSegment::Index(_) => false,
        })
        .count();
    child.data_path.truncated_to_pairs(pairs)
}
