//! Sort-number validation and ordering.
//!
//! Every level that does not opt out with `skip_sort_validation` must carry an
//! authored `sort_number` on each item. A set with any gap is refused as a
//! whole; no fallback order is ever guessed.

use std::cmp::Ordering;

use serde::Serialize;

use crate::item::Item;
use crate::levels::ConfigResolver;

pub const MAX_REPORTED_ITEMS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffendingItem {
    pub name: String,
    pub path: Vec<String>,
}

/// Operator-facing report for a level that refused to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortDiagnostic {
    pub level: String,
    /// Ancestor breadcrumb of the refused set.
    pub breadcrumb: Vec<String>,
    pub at_leaf_level: bool,
    pub missing_count: usize,
    /// At most [`MAX_REPORTED_ITEMS`] entries.
    pub offending: Vec<OffendingItem>,
}

impl SortDiagnostic {
    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.offending.iter().map(|item| item.name.as_str()).collect();
        let more = self.missing_count.saturating_sub(self.offending.len());
        let suffix = if more > 0 {
            format!(" and {more} more")
        } else {
            String::new()
        };
        format!(
            "{} item(s) at {}level {} under [{}] lack sort_number: {}{}",
            self.missing_count,
            if self.at_leaf_level { "leaf " } else { "" },
            self.level,
            self.breadcrumb.join(" > "),
            names.join(", "),
            suffix
        )
    }
}

pub struct Sorter<'a> {
    levels: &'a ConfigResolver,
}

impl<'a> Sorter<'a> {
    pub fn new(levels: &'a ConfigResolver) -> Self {
        Self { levels }
    }

    /// Orders `items` for display at `level`.
    ///
    /// Items are sorted ascending by `sort_number`; ties keep the input index
    /// recorded the first time an item passed through a sort.
    pub fn sort_items(&self, mut items: Vec<Item>, level: &str) -> Result<Vec<Item>, SortDiagnostic> {
        let skip = self
            .levels
            .get_level_config(level)
            .is_some_and(|config| config.skip_sort_validation);
        if skip {
            return Ok(items);
        }

        let at_leaf_level = self.levels.is_leaf_level(level);
        let missing: Vec<&Item> = items.iter().filter(|item| item.sort_number.is_none()).collect();
        if !missing.is_empty() {
            let breadcrumb = missing[0]
                .breadcrumb()
                .split_last()
                .map(|(_, ancestors)| ancestors.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default();
            return Err(SortDiagnostic {
                level: level.to_string(),
                breadcrumb,
                at_leaf_level,
                missing_count: missing.len(),
                offending: missing
                    .iter()
                    .take(MAX_REPORTED_ITEMS)
                    .map(|item| OffendingItem {
                        name: item.name.clone(),
                        path: item.breadcrumb().iter().map(|s| s.to_string()).collect(),
                    })
                    .collect(),
            });
        }

        for (index, item) in items.iter_mut().enumerate() {
            item.input_index.get_or_insert(index);
        }
        items.sort_by(|a, b| {
            let by_number = match (a.sort_number, b.sort_number) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            };
            by_number.then_with(|| a.input_index.cmp(&b.input_index))
        });
        Ok(items)
    }
}
