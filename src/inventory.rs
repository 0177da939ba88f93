// Inventory edits and lookups over a sheet's item list.
use std::collections::BTreeSet;

use crate::character::{CharacterSheet, InventoryItem};
use crate::error::ValidationError;
use crate::lens;

pub const DEFAULT_TAGS: [&str; 3] = ["consumível", "equipamento", "material"];

// Name used when an edit leaves an item without one.
pub const FALLBACK_ITEM_NAME: &str = "Novo Item";

fn normalized(item: &InventoryItem, name: String) -> InventoryItem {
    InventoryItem {
        name,
        quantity: item.quantity.max(1),
        description: item.description.clone(),
        tags: item.tags.clone(),
    }
}

pub fn add_item(
    sheet: &CharacterSheet,
    item: &InventoryItem,
) -> Result<CharacterSheet, ValidationError> {
    let name = item.name.trim();
    if name.is_empty() {
        return Err(ValidationError::blank("Item name"));
    }
    let item = normalized(item, name.to_string());
    Ok(lens::inventory().over(sheet, |items| items.push(item)))
}

pub fn update_item(
    sheet: &CharacterSheet,
    index: usize,
    item: &InventoryItem,
) -> Result<CharacterSheet, ValidationError> {
    let name = match item.name.trim() {
        "" => FALLBACK_ITEM_NAME.to_string(),
        name => name.to_string(),
    };
    let item = normalized(item, name);
    lens::inventory().try_over(sheet, |items| {
        let slot = items.get_mut(index).ok_or(ValidationError::IndexOutOfRange {
            collection: "inventory",
            index,
        })?;
        *slot = item;
        Ok(())
    })
}

pub fn remove_item(
    sheet: &CharacterSheet,
    index: usize,
) -> Result<CharacterSheet, ValidationError> {
    lens::inventory().try_over(sheet, |items| {
        if index >= items.len() {
            return Err(ValidationError::IndexOutOfRange {
                collection: "inventory",
                index,
            });
        }
        items.remove(index);
        Ok(())
    })
}

// Every tag offered for tagging: the defaults plus all tags in use, sorted.
pub fn available_tags(items: &[InventoryItem]) -> Vec<String> {
    DEFAULT_TAGS
        .iter()
        .map(|tag| tag.to_string())
        .chain(items.iter().flat_map(|item| item.tags.iter().cloned()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Items carrying `tag` (when given) whose name, description or any tag contains `query`,
/// ignoring case. A blank query matches everything. Returns indices with the items so edits
/// can address the original positions.
pub fn filter_items<'a>(
    items: &'a [InventoryItem],
    tag: Option<&str>,
    query: &str,
) -> Vec<(usize, &'a InventoryItem)> {
    let query = query.trim().to_lowercase();
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| tag.is_none_or(|tag| item.tags.iter().any(|t| t == tag)))
        .filter(|(_, item)| {
            query.is_empty()
                || item.name.to_lowercase().contains(&query)
                || item.description.to_lowercase().contains(&query)
                || item.tags.iter().any(|t| t.to_lowercase().contains(&query))
        })
        .collect()
}
