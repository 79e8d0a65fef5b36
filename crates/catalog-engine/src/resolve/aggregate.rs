//! Aggregated levels flatten a collection stored one level deeper than the
//! logical parent, across every instance of the intermediate level.

use crate::error::CatalogResult;
use crate::item::Item;
use crate::volume::Volume;

/// Items of `level` stored under one intermediate, tagged with it.
pub fn aggregated_items(volume: &Volume, intermediate: &Item, level: &str) -> CatalogResult<Vec<Item>> {
    let mut items = volume.read_collection(&intermediate.data_path, level, &intermediate.path)?;
    tag_aggregated(&mut items, intermediate);
    Ok(items)
}

pub fn tag_aggregated(items: &mut [Item], intermediate: &Item) {
    for item in items {
        item.aggregated_from = Some(intermediate.name.clone());
    }
}
