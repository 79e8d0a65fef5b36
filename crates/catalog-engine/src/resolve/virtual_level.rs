//! Virtual levels group the records of the next real level.
//!
//! When no record under a parent opts into grouping, the virtual level is
//! transparent and the next level's items are returned as they are. As soon
//! as one record is grouped, every sibling lands in some group; the ones
//! that are not claimed are adopted by the orphan group.

use serde_json::Value;

use super::{group_item, Anchor, Grouping, ORPHAN_SORT_NUMBER};
use crate::error::CatalogResult;
use crate::item::{scalar_text, Item, VirtualMembership};
use crate::volume::{LevelConfig, Volume};

#[derive(Debug, Clone)]
pub enum VirtualOutcome {
    /// Synthesized group items at the virtual level.
    Groups(Vec<Item>),
    /// No record was grouped; these are the next level's raw items.
    PassThrough(Vec<Item>),
}

impl VirtualOutcome {
    pub fn into_items(self) -> Vec<Item> {
        match self {
            VirtualOutcome::Groups(items) | VirtualOutcome::PassThrough(items) => items,
        }
    }
}

pub fn resolve_virtual_level(volume: &Volume, anchor: Anchor<'_>, level: &str) -> CatalogResult<VirtualOutcome> {
    let levels = volume.levels();
    let (depth, config) = levels.require_level(level)?;
    let Some(member_level) = levels.level_at(depth + 1) else {
        tracing::debug!("virtual level {level} has no level below it");
        return Ok(VirtualOutcome::PassThrough(Vec::new()));
    };

    let members = volume.read_collection(anchor.location, member_level, anchor.path)?;
    let property = grouping_property(config, level);
    if !members.iter().any(|member| group_of(&member.data, config, level).is_some()) {
        return Ok(VirtualOutcome::PassThrough(members));
    }

    let mut grouping = Grouping::new();
    for member in &members {
        grouping.push(group_of(&member.data, config, level), member);
    }

    let curated_sort = format!("rcj_{property}_sort_number");
    let mut items = Vec::with_capacity(grouping.groups.len() + 1);
    for (name, group_members) in &grouping.groups {
        let sort_number = group_members
            .iter()
            .find_map(|member| member.data.get(&curated_sort).and_then(Value::as_f64));
        let mut item = group_item(
            name,
            level,
            depth,
            anchor,
            group_members.len(),
            sort_number,
            Some((property, Value::String(name.clone()))),
        );
        item.virtual_group = Some(VirtualMembership::Group(name.clone()));
        items.push(item);
    }
    if !grouping.orphans.is_empty() {
        let mut orphan = group_item(
            config.orphan_group_name(),
            level,
            depth,
            anchor,
            grouping.orphans.len(),
            Some(ORPHAN_SORT_NUMBER),
            None,
        );
        orphan.virtual_group = Some(VirtualMembership::Orphan);
        items.push(orphan);
    }

    tracing::debug!(
        "virtual level {level} under {}: {} group(s), {} orphan(s)",
        anchor.location,
        grouping.groups.len(),
        grouping.orphans.len()
    );
    Ok(VirtualOutcome::Groups(items))
}

/// Members of the virtual group `group` at the level below it.
pub fn virtual_children(volume: &Volume, group: &Item, level: &str) -> CatalogResult<Vec<Item>> {
    let levels = volume.levels();
    let (_, config) = levels.require_level(&group.level)?;
    let members = volume.read_collection(&group.data_path, level, &group.path)?;
    let Some(membership) = &group.virtual_group else {
        return Ok(members);
    };
    Ok(members
        .into_iter()
        .filter(|member| {
            let claimed = group_of(&member.data, config, &group.level);
            match membership {
                VirtualMembership::Group(name) => claimed.as_deref() == Some(name.as_str()),
                VirtualMembership::Orphan => claimed.is_none(),
                VirtualMembership::PassThrough => true,
            }
        })
        .collect())
}

fn grouping_property<'a>(config: &'a LevelConfig, level: &'a str) -> &'a str {
    config.virtual_grouping_property.as_deref().unwrap_or(level)
}

/// A record opts in through the membership flag, or by carrying a grouping
/// value when the level names no membership property.
fn is_member(data: &Value, config: &LevelConfig, level: &str) -> bool {
    match config.virtual_membership_property.as_deref() {
        Some(property) => data.get(property).and_then(Value::as_bool) == Some(true),
        None => grouping_value(data, grouping_property(config, level)).is_some(),
    }
}

/// The authored group a record belongs to. A claim on the orphan group's
/// name is treated as no claim.
fn group_of(data: &Value, config: &LevelConfig, level: &str) -> Option<String> {
    if !is_member(data, config, level) {
        return None;
    }
    grouping_value(data, grouping_property(config, level))
        .filter(|value| value != config.orphan_group_name())
}

fn grouping_value(data: &Value, property: &str) -> Option<String> {
    scalar_text(data.get(property)?).filter(|value| !value.is_empty())
}
