//! Loaded volume documents.
//!
//! A volume is `{ "<root key>": { "display_config": {...}, "<collection>": ... } }`.
//! The data tree stays raw JSON; items are produced from it on demand and the
//! fragment loader merges external payloads into it in place.

pub mod config;
pub mod discovery;

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{CatalogError, CatalogResult};
use crate::item::{DataPath, Item, PathSegment};
use crate::levels::ConfigResolver;
use crate::normalize::{normalize_record, sort_number_of};

pub use config::{DisplayConfig, LevelConfig, SortType, StructureType};

const DISPLAY_CONFIG_PROPERTY: &str = "display_config";

/// The in-memory volume shared between navigation and the fragment loader,
/// which is its only writer.
pub type SharedVolume = Arc<RwLock<Volume>>;

#[derive(Debug, Clone)]
pub struct Volume {
    root_key: String,
    name: String,
    display: DisplayConfig,
    levels: ConfigResolver,
    data: Value,
}

impl Volume {
    /// Parses and validates a volume document. Configuration problems are
    /// fatal: no partially valid volume is ever returned.
    pub fn from_document(document: Value) -> CatalogResult<Self> {
        let Value::Object(mut top) = document else {
            return Err(CatalogError::InvalidVolume(
                "volume document must be a JSON object".to_string(),
            ));
        };

        let root_key = top
            .iter()
            .find(|(_, value)| value.get(DISPLAY_CONFIG_PROPERTY).is_some())
            .map(|(key, _)| key.clone())
            .ok_or_else(|| {
                CatalogError::InvalidVolume("no root property carries display_config".to_string())
            })?;
        let data = top.remove(&root_key).unwrap_or(Value::Null);

        let display_config = DisplayConfig::from_value(&data[DISPLAY_CONFIG_PROPERTY])?;
        let levels = ConfigResolver::new(
            display_config.hierarchy_levels.clone(),
            display_config.leaf_level.clone(),
        )?;
        let name = display_config.volume_name.clone().unwrap_or_else(|| root_key.clone());

        let structure_type = display_config.structure_type;
        tracing::info!(
            "loaded volume {name} ({} levels, {structure_type:?})",
            levels.level_names().len()
        );
        Ok(Self {
            root_key,
            name,
            display: display_config,
            levels,
            data,
        })
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_version(&self) -> &str {
        &self.display.schema_version
    }

    pub fn data_version(&self) -> &str {
        &self.display.data_version
    }

    pub fn structure_type(&self) -> StructureType {
        self.display.structure_type
    }

    pub fn is_split_structure(&self) -> bool {
        matches!(
            self.display.structure_type,
            StructureType::Split | StructureType::SplitChapters
        )
    }

    pub fn is_chapter_split_structure(&self) -> bool {
        self.display.structure_type == StructureType::SplitChapters
    }

    pub fn levels(&self) -> &ConfigResolver {
        &self.levels
    }

    pub fn display_config(&self) -> &DisplayConfig {
        &self.display
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn resolve(&self, location: &DataPath) -> CatalogResult<&Value> {
        let mut current = &self.data;
        for segment in location.segments() {
            current = step(current, segment)
                .ok_or_else(|| CatalogError::PathNotFound(format!("{location} (at {segment})")))?;
        }
        Ok(current)
    }

    pub fn resolve_mut(&mut self, location: &DataPath) -> CatalogResult<&mut Value> {
        let mut current = &mut self.data;
        for segment in location.segments() {
            current = match (current, segment) {
                (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
                (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
                _ => None,
            }
            .ok_or_else(|| CatalogError::PathNotFound(format!("{location} (at {segment})")))?;
        }
        Ok(current)
    }

    pub fn is_loaded_at(&self, location: &DataPath) -> bool {
        self.resolve(location)
            .ok()
            .and_then(|node| node.get(crate::item::LOADED_PROPERTY))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Reads the raw items of `level` stored directly under `location`.
    ///
    /// A missing collection is an empty result; a broken `location` is a
    /// [`CatalogError::PathNotFound`].
    pub fn read_collection(
        &self,
        location: &DataPath,
        level: &str,
        parent_path: &[String],
    ) -> CatalogResult<Vec<Item>> {
        let (depth, config) = self.levels.require_level(level)?;
        let node = self.resolve(location)?;
        let collection_key = self.levels.collection_key(level);
        let Some(collection) = node.get(&collection_key) else {
            return Ok(Vec::new());
        };

        let entries: Vec<(PathSegment, Option<&str>, &Value)> = match collection {
            Value::Object(map) => map
                .iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .map(|(key, value)| (PathSegment::Key(key.clone()), Some(key.as_str()), value))
                .collect(),
            Value::Array(values) => values
                .iter()
                .enumerate()
                .map(|(index, value)| (PathSegment::Index(index), None, value))
                .collect(),
            _ => {
                tracing::warn!("collection {collection_key} at {location} is not a map or list");
                return Ok(Vec::new());
            }
        };

        let items = entries
            .into_iter()
            .enumerate()
            .map(|(position, (segment, map_key, raw))| {
                let data = normalize_record(raw, level, &self.levels);
                let name = item_name(&data, level, config, map_key, position);
                let sort_number = data.as_object().and_then(sort_number_of);
                let mut item = Item::new(
                    name,
                    level,
                    depth,
                    parent_path,
                    location.child(&collection_key, segment),
                );
                item.is_leaf = self.levels.is_leaf_level(level);
                item.sort_number = sort_number;
                item.data = data;
                item
            })
            .collect();
        Ok(items)
    }
}

fn step<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get(key),
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn item_name(
    data: &Value,
    level: &str,
    config: &LevelConfig,
    map_key: Option<&str>,
    position: usize,
) -> String {
    let record: Option<&Map<String, Value>> = data.as_object();
    let text = |property: &str| {
        record
            .and_then(|r| r.get(property))
            .and_then(crate::item::scalar_text)
            .filter(|text| !text.is_empty())
    };

    if config.use_code_property {
        if let Some(code) = text("code") {
            return code;
        }
    }
    if let Some(key) = map_key {
        return key.to_string();
    }
    text(level)
        .or_else(|| text("name"))
        .unwrap_or_else(|| (position + 1).to_string())
}
