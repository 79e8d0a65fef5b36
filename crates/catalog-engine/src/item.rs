//! Navigation nodes.
//!
//! Every raw record is turned into one closed [`Item`] shape as soon as it is
//! read. Items carry two ancestries: `path`, one display segment per level,
//! and `data_path`, the location of the record inside raw storage. The two
//! diverge under virtual and pseudo-parent grouping, which add display levels
//! without adding storage nodes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY_SEPARATOR: &str = "/";

/// Property marking a record whose children live in an external fragment.
pub const EXTERNAL_FILE_PROPERTY: &str = "external_file";
pub const LEGACY_EXTERNAL_FILE_PROPERTY: &str = "_external_file";
pub const LOADED_PROPERTY: &str = "_loaded";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Location inside raw storage: alternating `(collection, entry)` pairs from
/// the volume's data root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataPath(Vec<PathSegment>);

impl DataPath {
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, collection: &str, entry: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(collection.to_string()));
        segments.push(entry);
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// `(collection, entry)` pairs, root first.
    pub fn pairs(&self) -> impl Iterator<Item = (&PathSegment, &PathSegment)> {
        self.0.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
    }

    pub fn truncated_to_pairs(&self, pairs: usize) -> Self {
        Self(self.0.iter().take(pairs * 2).cloned().collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let text: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", text.join("."))
    }
}

/// Which slice of the next data level a virtual group item stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualMembership {
    Group(String),
    Orphan,
    /// No sibling was grouped; the virtual level is transparent.
    PassThrough,
}

/// One exact-match constraint contributed by an ancestor pseudo level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoFilter {
    pub trigger: String,
    pub value_property: String,
    /// Name of the level's orphan group; a claim on it counts as unclaimed.
    pub orphan_group: String,
    /// `None` selects the orphan group: items not claimed by any group.
    pub value: Option<String>,
}

impl PseudoFilter {
    pub fn matches(&self, data: &Value) -> bool {
        let group = pseudo_group_of(data, &self.trigger, &self.value_property, &self.orphan_group);
        match &self.value {
            Some(value) => group.as_deref() == Some(value.as_str()),
            None => group.is_none(),
        }
    }
}

/// The group a record claims at a pseudo level, if its trigger is set. A
/// claim on the orphan group's name counts as no claim.
pub fn pseudo_group_of(
    data: &Value,
    trigger: &str,
    value_property: &str,
    orphan_group: &str,
) -> Option<String> {
    if data.get(trigger).and_then(Value::as_bool) != Some(true) {
        return None;
    }
    scalar_text(data.get(value_property)?).filter(|value| !value.is_empty() && value != orphan_group)
}

/// Pseudo-parent bookkeeping. Children are produced by replaying `filters`
/// over one shared backing array of terminal-level items.
#[derive(Debug, Clone)]
pub struct PseudoContext {
    pub level: String,
    pub terminal_level: String,
    /// Real level whose storage holds the terminal items.
    pub owner_level: String,
    pub filters: Vec<PseudoFilter>,
    /// Unfiltered terminal items. `None` when rebuilt from a path; the
    /// resolver then reads them fresh from storage.
    pub source: Option<Arc<Vec<Item>>>,
}

impl PseudoContext {
    pub fn accepts(&self, item: &Item) -> bool {
        self.filters.iter().all(|filter| filter.matches(&item.data))
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub key: String,
    pub level: String,
    pub level_depth: usize,
    pub path: Vec<String>,
    pub data_path: DataPath,
    pub is_leaf: bool,
    pub data: Value,
    pub sort_number: Option<f64>,
    pub virtual_group: Option<VirtualMembership>,
    pub pseudo: Option<PseudoContext>,
    pub has_pseudo_parent: bool,
    pub aggregated_from: Option<String>,
    pub inherited: Map<String, Value>,
    pub input_index: Option<usize>,
}

impl Item {
    pub fn new(
        name: impl Into<String>,
        level: impl Into<String>,
        level_depth: usize,
        parent_path: &[String],
        data_path: DataPath,
    ) -> Self {
        let name = name.into();
        let mut path = padded_path(parent_path, level_depth);
        path.push(name.clone());
        Self {
            key: build_key(&path),
            name,
            level: level.into(),
            level_depth,
            path,
            data_path,
            is_leaf: false,
            data: Value::Object(Map::new()),
            sort_number: None,
            virtual_group: None,
            pseudo: None,
            has_pseudo_parent: false,
            aggregated_from: None,
            inherited: Map::new(),
            input_index: None,
        }
    }

    pub fn is_pseudo_parent(&self) -> bool {
        self.pseudo.is_some()
    }

    pub fn external_file(&self) -> Option<&str> {
        self.data
            .get(EXTERNAL_FILE_PROPERTY)
            .or_else(|| self.data.get(LEGACY_EXTERNAL_FILE_PROPERTY))
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
    }

    /// Number of members behind a synthesized group item.
    pub fn member_count(&self) -> Option<u64> {
        self.data.get("count").and_then(Value::as_u64)
    }

    /// Copy of this item moved under `parent_path`; storage location is kept.
    pub fn reparented(&self, parent_path: &[String]) -> Self {
        let mut item = self.clone();
        let mut path = padded_path(parent_path, self.level_depth);
        path.push(self.name.clone());
        item.key = build_key(&path);
        item.path = path;
        item
    }

    /// Display ancestry without the placeholders of bypassed levels.
    pub fn breadcrumb(&self) -> Vec<&str> {
        self.path
            .iter()
            .map(String::as_str)
            .filter(|segment| !segment.is_empty())
            .collect()
    }
}

pub fn build_key(path: &[String]) -> String {
    path.join(KEY_SEPARATOR)
}

/// `base` cut or padded with empty segments to exactly `depth` entries.
/// Empty segments stand for levels that were bypassed.
pub fn padded_path(base: &[String], depth: usize) -> Vec<String> {
    let mut path: Vec<String> = base.iter().take(depth).cloned().collect();
    path.resize(depth, String::new());
    path
}

/// Position of `item` in a cousin list, matched by key and skipping gaps.
pub fn find_index(item: &Item, items: &[Option<Item>]) -> Option<usize> {
    items
        .iter()
        .position(|candidate| candidate.as_ref().is_some_and(|c| c.key == item.key))
}

pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
