//! Per-level configuration lookup for a loaded volume.

pub mod template;

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::{CatalogError, CatalogResult};
use crate::item::Item;
use crate::volume::config::LevelConfig;

pub use template::{resolve_path, resolve_template, PathNotFound};

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    names: Vec<String>,
    configs: Vec<LevelConfig>,
    depths: HashMap<String, usize>,
    collections: HashMap<String, usize>,
    leaf_level: String,
}

impl ConfigResolver {
    pub fn new(levels: Vec<(String, LevelConfig)>, leaf_level: Option<String>) -> CatalogResult<Self> {
        if levels.is_empty() {
            return Err(CatalogError::Config("hierarchy_levels is empty".to_string()));
        }

        let mut names = Vec::with_capacity(levels.len());
        let mut configs = Vec::with_capacity(levels.len());
        let mut depths = HashMap::new();
        let mut collections = HashMap::new();
        for (depth, (name, config)) in levels.into_iter().enumerate() {
            if depths.insert(name.clone(), depth).is_some() {
                return Err(CatalogError::Config(format!("duplicate level {name}")));
            }
            let collection = config
                .collection_key
                .clone()
                .unwrap_or_else(|| pluralize(&name));
            collections.entry(collection).or_insert(depth);
            names.push(name);
            configs.push(config);
        }

        let leaf_level = match leaf_level {
            Some(level) if depths.contains_key(&level) => level,
            Some(level) => {
                return Err(CatalogError::Config(format!(
                    "leaf_level {level} is not a hierarchy level"
                )))
            }
            None => names[names.len() - 1].clone(),
        };

        let resolver = Self {
            names,
            configs,
            depths,
            collections,
            leaf_level,
        };
        resolver.validate()?;
        Ok(resolver)
    }

    fn validate(&self) -> CatalogResult<()> {
        for (depth, (name, config)) in self.names.iter().zip(&self.configs).enumerate() {
            for pseudo in &config.supports_pseudo_parents {
                let target = self.get_level_config(pseudo).ok_or_else(|| {
                    CatalogError::Config(format!(
                        "level {name} supports unknown pseudo-parent level {pseudo}"
                    ))
                })?;
                if !target.is_pseudo_parent {
                    return Err(CatalogError::Config(format!(
                        "level {name} lists {pseudo} as pseudo-parent but it is not one"
                    )));
                }
            }
            if let Some(intermediate) = &config.aggregates_across {
                match self.level_depth(intermediate) {
                    Some(intermediate_depth) if intermediate_depth < depth => {}
                    Some(_) => {
                        return Err(CatalogError::Config(format!(
                            "level {name} aggregates across {intermediate}, which is not above it"
                        )))
                    }
                    None => {
                        return Err(CatalogError::Config(format!(
                            "level {name} aggregates across unknown level {intermediate}"
                        )))
                    }
                }
            }
            if config.is_virtual && config.is_pseudo_parent {
                return Err(CatalogError::Config(format!(
                    "level {name} cannot be both virtual and pseudo-parent"
                )));
            }
        }
        Ok(())
    }

    pub fn get_level_config(&self, level: &str) -> Option<&LevelConfig> {
        self.depths.get(level).map(|depth| &self.configs[*depth])
    }

    /// Like [`get_level_config`](Self::get_level_config) but reports unknown
    /// levels as an error.
    pub fn require_level(&self, level: &str) -> CatalogResult<(usize, &LevelConfig)> {
        self.depths
            .get(level)
            .map(|depth| (*depth, &self.configs[*depth]))
            .ok_or_else(|| CatalogError::UnknownLevel(level.to_string()))
    }

    pub fn level_names(&self) -> &[String] {
        &self.names
    }

    pub fn level_depth(&self, level: &str) -> Option<usize> {
        self.depths.get(level).copied()
    }

    pub fn level_at(&self, depth: usize) -> Option<&str> {
        self.names.get(depth).map(String::as_str)
    }

    pub fn config_at(&self, depth: usize) -> Option<&LevelConfig> {
        self.configs.get(depth)
    }

    pub fn leaf_level(&self) -> &str {
        &self.leaf_level
    }

    pub fn is_leaf_level(&self, level: &str) -> bool {
        self.leaf_level == level
    }

    /// Property under which a level's raw items are stored in their parent.
    pub fn collection_key(&self, level: &str) -> String {
        self.get_level_config(level)
            .and_then(|config| config.collection_key.clone())
            .unwrap_or_else(|| pluralize(level))
    }

    /// Depth of the level whose raw collection is named `collection`.
    pub fn level_for_collection(&self, collection: &str) -> Option<usize> {
        self.collections.get(collection).copied()
    }

    /// Every collection property name, used to strip child collections from
    /// item records.
    pub fn is_collection_key(&self, property: &str) -> bool {
        self.collections.contains_key(property)
    }

    /// Nearest level after `depth` that is not a pseudo-parent level.
    pub fn terminal_level_after(&self, depth: usize) -> Option<usize> {
        (depth + 1..self.configs.len()).find(|candidate| !self.configs[*candidate].is_pseudo_parent)
    }

    pub fn resolve_template(&self, template: &str, context: &Value) -> String {
        resolve_template(template, context)
    }

    /// Renders the level's `text_format` for an item, falling back to its name.
    pub fn display_label(&self, item: &Item) -> String {
        let Some(format) = self
            .get_level_config(&item.level)
            .and_then(|config| config.text_format.as_deref())
        else {
            return item.name.clone();
        };
        let context = json!({
            "name": item.name,
            "level": item.level,
            "path": item.path,
            "data": item.data,
            "inherited": item.inherited,
        });
        let label = self.resolve_template(format, &context);
        if label.trim().is_empty() {
            item.name.clone()
        } else {
            label
        }
    }
}

/// Plural collection name for a level (`family` → `families`).
pub fn pluralize(level: &str) -> String {
    const SIBILANT_ENDINGS: [&str; 5] = ["s", "x", "z", "ch", "sh"];
    if let Some(stem) = level.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    if SIBILANT_ENDINGS.iter().any(|ending| level.ends_with(ending)) {
        return format!("{level}es");
    }
    format!("{level}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DataPath;
    use serde_json::json;

    fn levels(levels_json: Value) -> Vec<(String, LevelConfig)> {
        levels_json
            .as_object()
            .expect("object")
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    serde_json::from_value(config.clone()).expect("level config"),
                )
            })
            .collect()
    }

    #[test]
    fn pluralizes_level_names() {
        assert_eq!(pluralize("market"), "markets");
        assert_eq!(pluralize("family"), "families");
        assert_eq!(pluralize("subfamily"), "subfamilies");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("verse"), "verses");
        assert_eq!(pluralize("match"), "matches");
    }

    #[test]
    fn reports_depths_and_leaf() {
        let resolver = ConfigResolver::new(
            levels(json!({ "market": {}, "manufacturer": {}, "model": {} })),
            None,
        )
        .expect("resolver");
        assert_eq!(resolver.level_names(), ["market", "manufacturer", "model"]);
        assert_eq!(resolver.level_depth("manufacturer"), Some(1));
        assert_eq!(resolver.level_depth("engine"), None);
        assert_eq!(resolver.leaf_level(), "model");
        assert!(resolver.get_level_config("engine").is_none());
        assert_eq!(resolver.level_for_collection("manufacturers"), Some(1));
    }

    #[test]
    fn collection_key_override() {
        let resolver = ConfigResolver::new(
            levels(json!({ "series": { "collection_key": "series_list" }, "model": {} })),
            None,
        )
        .expect("resolver");
        assert_eq!(resolver.collection_key("series"), "series_list");
        assert_eq!(resolver.level_for_collection("series_list"), Some(0));
    }

    #[test]
    fn terminal_level_skips_stacked_pseudo_levels() {
        let resolver = ConfigResolver::new(
            levels(json!({
                "cylinder": { "supports_pseudo_parents": ["family", "subfamily"] },
                "family": { "is_pseudo_parent": true },
                "subfamily": { "is_pseudo_parent": true },
                "model": {}
            })),
            None,
        )
        .expect("resolver");
        assert_eq!(resolver.terminal_level_after(1), Some(3));
        assert_eq!(resolver.terminal_level_after(3), None);
    }

    #[test]
    fn rejects_bad_references() {
        let unknown_leaf = ConfigResolver::new(levels(json!({ "a": {} })), Some("b".into()));
        assert!(matches!(unknown_leaf, Err(CatalogError::Config(_))));

        let bad_pseudo = ConfigResolver::new(
            levels(json!({ "a": { "supports_pseudo_parents": ["b"] }, "b": {} })),
            None,
        );
        assert!(matches!(bad_pseudo, Err(CatalogError::Config(_))));

        let bad_aggregate = ConfigResolver::new(
            levels(json!({ "a": { "aggregates_across": "b" }, "b": {} })),
            None,
        );
        assert!(matches!(bad_aggregate, Err(CatalogError::Config(_))));
    }

    #[test]
    fn display_label_uses_text_format() {
        let resolver = ConfigResolver::new(
            levels(json!({
                "manufacturer": { "text_format": "{{name}} ({{data.year_founded}})" },
                "model": {}
            })),
            None,
        )
        .expect("resolver");
        let mut item = Item::new("Acme", "manufacturer", 0, &[], DataPath::root());
        item.data = json!({ "year_founded": 1901 });
        assert_eq!(resolver.display_label(&item), "Acme (1901)");

        let model = Item::new("X1", "model", 1, &["Acme".to_string()], DataPath::root());
        assert_eq!(resolver.display_label(&model), "X1");
    }
}
