use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CatalogError, CatalogResult};

pub const VOLUME_TYPE_SENTINEL: &str = "wheel_hierarchical";
pub const DEFAULT_PSEUDO_TRIGGER_PREFIX: &str = "rpp_";
pub const DEFAULT_ORPHAN_GROUP: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    #[default]
    Monolithic,
    Split,
    SplitChapters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    #[default]
    Alphabetical,
    NumericAsc,
    NumericDesc,
}

/// Declarative behaviour for one hierarchy level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub display_name: Option<String>,
    pub text_format: Option<String>,
    pub color: Option<String>,
    pub sort_type: SortType,
    pub is_virtual: bool,
    pub is_pseudo_parent: bool,
    pub supports_pseudo_parents: Vec<String>,
    pub aggregates_across: Option<String>,
    pub virtual_grouping_property: Option<String>,
    pub virtual_membership_property: Option<String>,
    pub virtual_orphan_group_name: Option<String>,
    pub pseudo_trigger_prefix: Option<String>,
    pub pseudo_value_property: Option<String>,
    pub pseudo_orphan_group: Option<String>,
    pub pseudo_parent_sort: HashMap<String, f64>,
    pub is_optional: bool,
    pub skip_sort_validation: bool,
    pub is_numeric: bool,
    pub use_code_property: bool,
    /// Overrides the plural collection name the level's raw items live under.
    pub collection_key: Option<String>,
}

impl LevelConfig {
    pub fn orphan_group_name(&self) -> &str {
        self.virtual_orphan_group_name
            .as_deref()
            .unwrap_or(DEFAULT_ORPHAN_GROUP)
    }

    pub fn pseudo_orphan_group_name(&self) -> &str {
        self.pseudo_orphan_group
            .as_deref()
            .unwrap_or(DEFAULT_ORPHAN_GROUP)
    }

    pub fn pseudo_trigger(&self, level_name: &str) -> String {
        let prefix = self
            .pseudo_trigger_prefix
            .as_deref()
            .unwrap_or(DEFAULT_PSEUDO_TRIGGER_PREFIX);
        format!("{prefix}{level_name}")
    }

    pub fn pseudo_value_property<'a>(&'a self, level_name: &'a str) -> &'a str {
        self.pseudo_value_property.as_deref().unwrap_or(level_name)
    }

    /// Levels that may be bypassed when they produce no items.
    pub fn is_skippable(&self) -> bool {
        self.is_virtual || self.is_pseudo_parent || self.is_optional
    }
}

/// The `display_config` block of a volume document.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub volume_type: String,
    pub volume_name: Option<String>,
    pub structure_type: StructureType,
    pub schema_version: String,
    pub data_version: String,
    pub leaf_level: Option<String>,
    pub hierarchy_levels: Vec<(String, LevelConfig)>,
}

#[derive(Debug, Deserialize)]
struct RawDisplayConfig {
    volume_type: Option<String>,
    volume_name: Option<String>,
    #[serde(default)]
    structure_type: StructureType,
    #[serde(default)]
    volume_schema_version: Option<Value>,
    #[serde(default)]
    volume_data_version: Option<Value>,
    leaf_level: Option<String>,
    hierarchy_levels: Option<Value>,
}

impl DisplayConfig {
    pub fn from_value(value: &Value) -> CatalogResult<Self> {
        let raw: RawDisplayConfig = serde_json::from_value(value.clone())
            .map_err(|error| CatalogError::Config(format!("invalid display_config: {error}")))?;

        let volume_type = raw
            .volume_type
            .ok_or_else(|| CatalogError::InvalidVolume("display_config.volume_type missing".to_string()))?;
        if volume_type != VOLUME_TYPE_SENTINEL {
            return Err(CatalogError::InvalidVolume(format!(
                "volume_type must be {VOLUME_TYPE_SENTINEL}, found {volume_type}"
            )));
        }

        let levels = match raw.hierarchy_levels {
            Some(Value::Object(levels)) if !levels.is_empty() => levels,
            Some(Value::Object(_)) => {
                return Err(CatalogError::Config("hierarchy_levels is empty".to_string()))
            }
            Some(_) => {
                return Err(CatalogError::Config(
                    "hierarchy_levels must be an object".to_string(),
                ))
            }
            None => return Err(CatalogError::Config("hierarchy_levels missing".to_string())),
        };

        Ok(Self {
            volume_type,
            volume_name: raw.volume_name,
            structure_type: raw.structure_type,
            schema_version: version_text(raw.volume_schema_version),
            data_version: version_text(raw.volume_data_version),
            leaf_level: raw.leaf_level,
            hierarchy_levels: parse_levels(levels)?,
        })
    }
}

fn parse_levels(levels: Map<String, Value>) -> CatalogResult<Vec<(String, LevelConfig)>> {
    levels
        .into_iter()
        .map(|(name, config)| {
            let config: LevelConfig = serde_json::from_value(config).map_err(|error| {
                CatalogError::Config(format!("invalid configuration for level {name}: {error}"))
            })?;
            Ok((name, config))
        })
        .collect()
}

fn version_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_levels_in_document_order() {
        let config = DisplayConfig::from_value(&json!({
            "volume_type": "wheel_hierarchical",
            "volume_schema_version": "1.0",
            "volume_data_version": 7,
            "hierarchy_levels": {
                "market": {},
                "manufacturer": { "is_optional": true },
                "model": { "sort_type": "numeric_asc" }
            }
        }))
        .expect("display config");

        let names: Vec<_> = config
            .hierarchy_levels
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["market", "manufacturer", "model"]);
        assert_eq!(config.schema_version, "1.0");
        assert_eq!(config.data_version, "7");
        assert_eq!(config.structure_type, StructureType::Monolithic);
        assert!(config.hierarchy_levels[1].1.is_optional);
        assert_eq!(config.hierarchy_levels[2].1.sort_type, SortType::NumericAsc);
    }

    #[test]
    fn rejects_wrong_volume_type() {
        let error = DisplayConfig::from_value(&json!({
            "volume_type": "flat",
            "hierarchy_levels": { "market": {} }
        }))
        .expect_err("wrong sentinel");
        assert!(matches!(error, CatalogError::InvalidVolume(_)), "got {error:?}");
    }

    #[test]
    fn rejects_missing_hierarchy_levels() {
        let error = DisplayConfig::from_value(&json!({ "volume_type": "wheel_hierarchical" }))
            .expect_err("missing levels");
        assert!(matches!(error, CatalogError::Config(_)), "got {error:?}");
    }

    #[test]
    fn pseudo_defaults() {
        let config = LevelConfig::default();
        assert_eq!(config.pseudo_trigger("family"), "rpp_family");
        assert_eq!(config.pseudo_value_property("family"), "family");
        assert_eq!(config.pseudo_orphan_group_name(), "Other");
        assert_eq!(config.orphan_group_name(), "Other");
    }
}
