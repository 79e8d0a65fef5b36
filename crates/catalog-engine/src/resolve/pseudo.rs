//! Pseudo-parent levels: nestable groupings over a terminal data level.
//!
//! A pseudo node never owns copies of its members. It carries the filter
//! chain accumulated from every pseudo ancestor and a shared handle to the
//! unfiltered terminal items; its children come from replaying the chain.

use std::sync::Arc;

use serde_json::Value;

use super::{group_item, Anchor, Grouping, ORPHAN_SORT_NUMBER};
use crate::error::CatalogResult;
use crate::item::{pseudo_group_of, Item, PseudoContext, PseudoFilter};
use crate::volume::Volume;

/// Groups `parent`'s terminal items at the pseudo level `level`.
///
/// Returns no items when `level` is not a pseudo-parent level the owning
/// real level supports, or when no candidate sets the level's trigger; the
/// caller treats either as a level to bypass.
pub fn resolve_pseudo_level(volume: &Volume, parent: &Item, level: &str) -> CatalogResult<Vec<Item>> {
    let levels = volume.levels();
    let (depth, config) = levels.require_level(level)?;
    if !config.is_pseudo_parent {
        return Ok(Vec::new());
    }

    let owner_level = match &parent.pseudo {
        Some(context) => context.owner_level.clone(),
        None => parent.level.clone(),
    };
    let supported = levels
        .get_level_config(&owner_level)
        .is_some_and(|owner| owner.supports_pseudo_parents.iter().any(|name| name == level));
    if !supported {
        tracing::debug!("level {owner_level} does not support pseudo-parent level {level}");
        return Ok(Vec::new());
    }
    let Some(terminal_level) = levels.terminal_level_after(depth).and_then(|d| levels.level_at(d)) else {
        tracing::debug!("pseudo-parent level {level} has no terminal level");
        return Ok(Vec::new());
    };

    let inherited_filters = parent
        .pseudo
        .as_ref()
        .map(|context| context.filters.clone())
        .unwrap_or_default();
    let source = match parent.pseudo.as_ref().and_then(|context| context.source.clone()) {
        Some(source) => source,
        None => Arc::new(volume.read_collection(&parent.data_path, terminal_level, &parent.path)?),
    };

    let trigger = config.pseudo_trigger(level);
    let value_property = config.pseudo_value_property(level);
    let orphan_group = config.pseudo_orphan_group_name();
    let mut grouping = Grouping::new();
    for candidate in source
        .iter()
        .filter(|item| inherited_filters.iter().all(|filter| filter.matches(&item.data)))
    {
        grouping.push(
            pseudo_group_of(&candidate.data, &trigger, value_property, orphan_group),
            candidate,
        );
    }
    if grouping.groups.is_empty() {
        return Ok(Vec::new());
    }

    let context_for = |value: Option<String>| {
        let mut filters = inherited_filters.clone();
        filters.push(PseudoFilter {
            trigger: trigger.clone(),
            value_property: value_property.to_string(),
            orphan_group: orphan_group.to_string(),
            value,
        });
        PseudoContext {
            level: level.to_string(),
            terminal_level: terminal_level.to_string(),
            owner_level: owner_level.clone(),
            filters,
            source: Some(source.clone()),
        }
    };

    let anchor = Anchor::of(parent);
    let mut items = Vec::with_capacity(grouping.groups.len() + 1);
    for (name, members) in &grouping.groups {
        let sort_number = config.pseudo_parent_sort.get(name).copied();
        let mut item = group_item(
            name,
            level,
            depth,
            anchor,
            members.len(),
            sort_number,
            Some((value_property, Value::String(name.clone()))),
        );
        item.pseudo = Some(context_for(Some(name.clone())));
        items.push(item);
    }
    if !grouping.orphans.is_empty() {
        let mut orphan = group_item(
            config.pseudo_orphan_group_name(),
            level,
            depth,
            anchor,
            grouping.orphans.len(),
            Some(ORPHAN_SORT_NUMBER),
            None,
        );
        orphan.pseudo = Some(context_for(None));
        items.push(orphan);
    }
    Ok(items)
}

/// Children of the pseudo node `node` at `level`: a nested pseudo level, or
/// the filtered terminal items reparented under the node.
pub fn pseudo_children(volume: &Volume, node: &Item, level: &str) -> CatalogResult<Vec<Item>> {
    let Some(context) = &node.pseudo else {
        return Ok(Vec::new());
    };
    let levels = volume.levels();
    let (depth, config) = levels.require_level(level)?;

    if config.is_pseudo_parent {
        if depth <= node.level_depth {
            return Ok(Vec::new());
        }
        return resolve_pseudo_level(volume, node, level);
    }
    if level != context.terminal_level {
        tracing::debug!(
            "pseudo node {} has no children at {level} (terminal level is {})",
            node.key,
            context.terminal_level
        );
        return Ok(Vec::new());
    }

    let fresh;
    let source: &[Item] = match &context.source {
        Some(source) => source.as_slice(),
        None => {
            fresh = volume.read_collection(&node.data_path, level, &node.path)?;
            fresh.as_slice()
        }
    };
    Ok(source
        .iter()
        .filter(|item| context.accepts(item))
        .map(|item| {
            let mut child = item.reparented(&node.path);
            child.has_pseudo_parent = true;
            child
        })
        .collect())
}
