//! Raw record normalisation.

use serde_json::{Map, Value};

use crate::item::Item;
use crate::levels::ConfigResolver;

pub const SORT_NUMBER_PROPERTY: &str = "sort_number";
const LEGACY_SORT_PROPERTIES: [&str; 2] = ["sequence", "sort_order"];
const TEXT_BUNDLE_PROPERTY: &str = "text";

/// Translation code → language property name.
const TRANSLATION_LANGUAGES: [(&str, &str); 10] = [
    ("WLC", "hebrew"),
    ("VUL", "latin"),
    ("LXX", "greek"),
    ("BYZ", "greek"),
    ("NAB", "english"),
    ("SYN", "russian"),
    ("NEO", "french"),
    ("VAT_ES", "spanish"),
    ("CEI", "italian"),
    ("POR", "portuguese"),
];

pub fn language_for_code(code: &str) -> String {
    TRANSLATION_LANGUAGES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, language)| (*language).to_string())
        .unwrap_or_else(|| code.to_lowercase())
}

/// Normalises one raw record read at `level_hint`.
///
/// Nested child collections are dropped; children are always read back from
/// storage through the item's data path.
pub fn normalize_record(raw: &Value, level_hint: &str, levels: &ConfigResolver) -> Value {
    let mut record = match raw {
        Value::Object(map) => map
            .iter()
            .filter(|(key, value)| {
                !(levels.is_collection_key(key) && (value.is_object() || value.is_array()))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Map<String, Value>>(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };

    if sort_number_of(&record).is_none() {
        let level_number = format!("{level_hint}_number");
        let legacy = LEGACY_SORT_PROPERTIES
            .iter()
            .copied()
            .chain(std::iter::once(level_number.as_str()))
            .find_map(|property| record.get(property).and_then(numeric_value));
        if let Some(number) = legacy {
            if let Some(number) = serde_json::Number::from_f64(number) {
                record.insert(SORT_NUMBER_PROPERTY.to_string(), Value::Number(number));
            }
        }
    }

    flatten_text_bundle(&mut record);
    Value::Object(record)
}

fn flatten_text_bundle(record: &mut Map<String, Value>) {
    let Some(Value::Object(bundle)) = record.get(TEXT_BUNDLE_PROPERTY).cloned() else {
        return;
    };
    for (code, text) in bundle {
        let language = language_for_code(&code);
        // First writer wins.
        record.entry(language).or_insert(text);
    }
}

pub fn sort_number_of(record: &Map<String, Value>) -> Option<f64> {
    record.get(SORT_NUMBER_PROPERTY).and_then(numeric_value)
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Ancestor context handed down to a parent's children.
pub fn extract_parent_properties(parent: &Item, levels: &ConfigResolver) -> Map<String, Value> {
    let mut props = parent.inherited.clone();
    if !parent.name.is_empty() {
        props.insert(parent.level.clone(), Value::String(parent.name.clone()));
    }
    if let Value::Object(record) = &parent.data {
        for (key, value) in record {
            let is_level = levels.level_depth(key).is_some();
            let is_count = key.ends_with("Count") || key.ends_with("_count");
            if is_level || is_count {
                props.insert(key.clone(), value.clone());
            }
        }
    }
    props
}
