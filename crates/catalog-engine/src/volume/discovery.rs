//! Finding volumes behind a fragment source.

use serde::Serialize;
use serde_json::Value;

use crate::loader::source::FragmentSource;
use crate::volume::{StructureType, Volume};

pub const DEFAULT_VOLUME_FILES: [&str; 3] = ["catalog.json", "mmdm_catalog.json", "gutenberg.json"];
pub const SPLIT_MANIFEST_FILES: [&str; 2] = ["data/manifest.json", "data/gutenberg/manifest.json"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeSummary {
    pub path: String,
    pub name: String,
    pub root_key: String,
    pub structure_type: StructureType,
    pub level_names: Vec<String>,
}

/// Probes every candidate path and returns the ones holding a valid volume.
pub async fn discover_volumes(source: &dyn FragmentSource, index_name: &str) -> Vec<VolumeSummary> {
    let candidates = match source.fetch(index_name).await {
        Ok(index) => {
            let listed = index_entries(&index);
            tracing::debug!("volume index {index_name} lists {} candidates", listed.len());
            listed
        }
        Err(error) => {
            tracing::debug!("no volume index at {index_name} ({error}); probing defaults");
            DEFAULT_VOLUME_FILES
                .iter()
                .chain(SPLIT_MANIFEST_FILES.iter())
                .map(|path| path.to_string())
                .collect()
        }
    };

    let mut volumes = Vec::new();
    for path in candidates {
        let document = match source.fetch(&path).await {
            Ok(document) => document,
            Err(error) => {
                tracing::debug!("skipping volume candidate {path}: {error}");
                continue;
            }
        };
        match Volume::from_document(document) {
            Ok(volume) => volumes.push(VolumeSummary {
                path,
                name: volume.name().to_string(),
                root_key: volume.root_key().to_string(),
                structure_type: volume.structure_type(),
                level_names: volume.levels().level_names().to_vec(),
            }),
            Err(error) => tracing::warn!("volume candidate {path} is not a valid volume: {error}"),
        }
    }
    volumes
}

/// Accepts `["a.json", ...]` or `{ "volumes": [...] }`, where each entry is a
/// path string or `{ "path": ... }`.
fn index_entries(index: &Value) -> Vec<String> {
    let entries = match index {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => map
            .get("volumes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(path) => Some(path.clone()),
            Value::Object(map) => map.get("path").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}
