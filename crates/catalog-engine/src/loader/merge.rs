//! Merge rules for fragment payloads.
//!
//! Merges are additive: keys are set, never removed, so applying the same
//! payload twice leaves the tree unchanged.

use serde_json::{Map, Value};

use crate::error::{CatalogError, CatalogResult};
use crate::item::{DataPath, LOADED_PROPERTY};
use crate::normalize::normalize_record;
use crate::volume::Volume;

const CHAPTERS_PROPERTY: &str = "chapters";
const VERSES_PROPERTY: &str = "verses";

pub fn merge_fragment(volume: &mut Volume, target: &DataPath, payload: &Value) -> CatalogResult<()> {
    let Value::Object(fragment) = payload else {
        return Err(CatalogError::Parse(format!(
            "fragment for {target} must be a JSON object"
        )));
    };

    let chapters = fragment.get(CHAPTERS_PROPERTY).and_then(Value::as_object);
    let verses = fragment
        .get(VERSES_PROPERTY)
        .and_then(Value::as_object)
        .map(|verses| normalized_verses(volume, verses));

    let node = volume.resolve_mut(target)?;
    let Value::Object(node) = node else {
        return Err(CatalogError::PathNotFound(format!(
            "fragment target {target} is not an object"
        )));
    };

    if chapters.is_none() && verses.is_none() {
        for (key, value) in fragment {
            node.insert(key.clone(), value.clone());
        }
    } else {
        if let Some(chapters) = chapters {
            merge_map(node, CHAPTERS_PROPERTY, chapters.clone());
        }
        if let Some(verses) = verses {
            merge_map(node, VERSES_PROPERTY, verses);
        }
    }

    node.insert(LOADED_PROPERTY.to_string(), Value::Bool(true));
    Ok(())
}

fn normalized_verses(volume: &Volume, verses: &Map<String, Value>) -> Map<String, Value> {
    let levels = volume.levels();
    let level = levels
        .level_for_collection(VERSES_PROPERTY)
        .and_then(|depth| levels.level_at(depth))
        .unwrap_or("verse");
    verses
        .iter()
        .map(|(key, verse)| (key.clone(), normalize_record(verse, level, levels)))
        .collect()
}

fn merge_map(node: &mut Map<String, Value>, property: &str, entries: Map<String, Value>) {
    let slot = node
        .entry(property.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(existing) = slot {
        existing.extend(entries);
    }
}
