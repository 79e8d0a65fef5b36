//! Levels that are computed rather than stored: virtual groupings,
//! pseudo-parent groupings and aggregated collections, plus the rule for
//! bypassing levels that produced nothing.

pub mod aggregate;
pub mod pseudo;
pub mod skip;
pub mod virtual_level;

use serde_json::{Map, Value};

use crate::item::{DataPath, Item};

pub use aggregate::{aggregated_items, tag_aggregated};
pub use pseudo::{pseudo_children, resolve_pseudo_level};
pub use skip::can_skip_virtual_level;
pub use virtual_level::{resolve_virtual_level, virtual_children, VirtualOutcome};

/// Orphan groups always sort after every authored group.
pub const ORPHAN_SORT_NUMBER: f64 = 9999.0;

const COUNT_PROPERTY: &str = "count";

static ROOT_LOCATION: DataPath = DataPath::root();

/// Where synthesized items hang: display ancestry plus storage location.
#[derive(Debug, Clone, Copy)]
pub struct Anchor<'a> {
    pub path: &'a [String],
    pub location: &'a DataPath,
}

impl<'a> Anchor<'a> {
    pub fn root() -> Anchor<'static> {
        Anchor {
            path: &[],
            location: &ROOT_LOCATION,
        }
    }

    pub fn of(item: &'a Item) -> Self {
        Self {
            path: &item.path,
            location: &item.data_path,
        }
    }
}

/// Accumulates members into named groups in first-appearance order, with a
/// separate orphan bucket.
pub(crate) struct Grouping<T> {
    pub groups: Vec<(String, Vec<T>)>,
    pub orphans: Vec<T>,
}

impl<T> Grouping<T> {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            orphans: Vec::new(),
        }
    }

    pub fn push(&mut self, group: Option<String>, member: T) {
        let Some(group) = group else {
            self.orphans.push(member);
            return;
        };
        match self.groups.iter_mut().find(|(name, _)| *name == group) {
            Some((_, members)) => members.push(member),
            None => self.groups.push((group, vec![member])),
        }
    }
}

/// A synthesized group item. Its storage location is the anchor's: groups
/// are views over the anchor's records, never storage nodes of their own.
pub(crate) fn group_item(
    name: &str,
    level: &str,
    depth: usize,
    anchor: Anchor<'_>,
    count: usize,
    sort_number: Option<f64>,
    extra: Option<(&str, Value)>,
) -> Item {
    let mut item = Item::new(name, level, depth, anchor.path, anchor.location.clone());
    let mut data = Map::new();
    data.insert(COUNT_PROPERTY.to_string(), Value::from(count));
    if let Some((property, value)) = extra {
        data.insert(property.to_string(), value);
    }
    item.data = Value::Object(data);
    item.sort_number = sort_number;
    item
}
