//! Small per-device preferences kept outside the character documents.
//!
//! Everything here goes through an injected [`PreferenceStore`] so callers decide where the
//! values live: [`MemoryPreferences`] for tests, [`FilePreferences`] for the shell. Malformed
//! stored values are ignored and the documented default is used instead.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::{File, create_dir_all, write};
use std::path::PathBuf;
use strum_macros::{Display, EnumIter, EnumString};

use crate::character::{Ability, AbilityType, EntryId};
use crate::error::StoreError;
use crate::store::{DocumentStore, preferences_path};

pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}

// Preferences kept as one JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FilePreferences {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = if path.exists() {
            serde_json::from_reader(File::open(&path)?).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable preferences {}: {e}", path.display());
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };
        Ok(FilePreferences { path, values })
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            create_dir_all(parent)?;
        }
        write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

pub fn favorites_key(username: &str, character_id: &str) -> String {
    format!("favorites-{username}-{character_id}")
}

pub fn active_tab_key(character_id: &str) -> String {
    format!("activeTab-{character_id}")
}

pub const THEME_KEY: &str = "theme";

// Favorite ability ids of one character, in the order they were starred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favorites {
    key: String,
    ids: Vec<EntryId>,
}

impl Favorites {
    pub fn load(prefs: &dyn PreferenceStore, username: &str, character_id: &str) -> Self {
        let key = favorites_key(username, character_id);
        let ids = prefs
            .get(&key)
            .and_then(|raw| {
                serde_json::from_str::<Vec<EntryId>>(&raw)
                    .inspect_err(|e| log::warn!("Discarding malformed favorites {key}: {e}"))
                    .ok()
            })
            .unwrap_or_default();
        Favorites { key, ids }
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[EntryId] {
        &self.ids
    }

    // Flip membership; returns true when the ability is now a favorite.
    pub fn toggle(&mut self, id: EntryId) -> bool {
        if self.contains(id) {
            self.ids.retain(|fav| *fav != id);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    pub fn save(&self, prefs: &mut dyn PreferenceStore) -> Result<(), StoreError> {
        prefs.set(&self.key, &serde_json::to_string(&self.ids)?)
    }
}

fn ability_matches(ability: &Ability, query: &str) -> bool {
    query.is_empty()
        || [
            ability.title.as_str(),
            ability.description.as_str(),
            ability.kind.as_str(),
            ability.effect.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(query))
}

/// Splits the abilities shown for a type tab and search box into favorites and the rest,
/// both keeping sheet order.
pub fn arrange_abilities<'a>(
    abilities: &'a [Ability],
    favorites: &Favorites,
    kind: Option<&AbilityType>,
    query: &str,
) -> (Vec<&'a Ability>, Vec<&'a Ability>) {
    let query = query.trim().to_lowercase();
    abilities
        .iter()
        .filter(|ability| kind.is_none_or(|kind| ability.kind == *kind))
        .filter(|ability| ability_matches(ability, &query))
        .partition(|ability| favorites.contains(ability.id))
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

// The theme a user last chose: their synced preference document when one exists, then this
// device's stored value, then `fallback`.
pub fn load_theme(
    prefs: &dyn PreferenceStore,
    store: Option<(&dyn DocumentStore, &str)>,
    fallback: Theme,
) -> Theme {
    let synced = store.and_then(|(store, username)| {
        store
            .get(&preferences_path(username), THEME_KEY)
            .inspect_err(|e| log::debug!("No synced theme for {username}: {e}"))
            .ok()
            .and_then(|doc| doc.fields.get("value")?.as_str()?.parse().ok())
    });
    synced
        .or_else(|| prefs.get(THEME_KEY)?.parse().ok())
        .unwrap_or(fallback)
}

/// Stores the opposite of `current` locally and, for a signed-in user, in their preferences
/// collection. The local value is kept even when the sync fails.
pub fn toggle_theme(
    current: Theme,
    prefs: &mut dyn PreferenceStore,
    store: Option<(&dyn DocumentStore, &str)>,
) -> Result<Theme, StoreError> {
    let next = current.toggled();
    prefs.set(THEME_KEY, &next.to_string())?;
    if let Some((store, username)) = store {
        store.put(
            &preferences_path(username),
            Some(THEME_KEY),
            json!({ "value": next.to_string() }),
        )?;
    }
    log::info!("Theme switched to {next}");
    Ok(next)
}

// Tabs of the sheet view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum SheetTab {
    #[default]
    Attributes,
    Abilities,
    Inventory,
    Status,
    Notes,
    Info,
}

pub fn active_tab(prefs: &dyn PreferenceStore, character_id: &str) -> SheetTab {
    prefs
        .get(&active_tab_key(character_id))
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

pub fn set_active_tab(
    prefs: &mut dyn PreferenceStore,
    character_id: &str,
    tab: SheetTab,
) -> Result<(), StoreError> {
    prefs.set(&active_tab_key(character_id), &tab.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ability(id: EntryId, title: &str, kind: &str) -> Ability {
        Ability {
            id,
            title: title.to_string(),
            kind: AbilityType::from(kind),
            ..Default::default()
        }
    }

    #[test]
    fn favorites_round_trip_through_the_store() {
        let mut prefs = MemoryPreferences::new();
        let mut favorites = Favorites::load(&prefs, "ana", "c1");
        assert!(favorites.toggle(7));
        assert!(favorites.toggle(3));
        assert!(!favorites.toggle(7));
        favorites.save(&mut prefs).unwrap();

        assert_eq!(prefs.get("favorites-ana-c1").as_deref(), Some("[3]"));
        assert_eq!(Favorites::load(&prefs, "ana", "c1").ids(), &[3]);
        assert!(Favorites::load(&prefs, "ana", "c2").ids().is_empty());
    }

    #[test]
    fn malformed_favorites_read_as_empty() {
        let mut prefs = MemoryPreferences::new();
        prefs.set("favorites-ana-c1", "not json").unwrap();
        assert!(Favorites::load(&prefs, "ana", "c1").ids().is_empty());
    }

    #[test]
    fn favorites_come_first_in_sheet_order() {
        let abilities = vec![
            ability(1, "Bola de Fogo", "magia"),
            ability(2, "Escudo", "magia"),
            ability(3, "Golpe", "inata"),
            ability(4, "Raio", "magia"),
        ];
        let mut favorites = Favorites::load(&MemoryPreferences::new(), "ana", "c1");
        favorites.toggle(4);
        favorites.toggle(2);

        fn ids(list: Vec<&Ability>) -> Vec<EntryId> {
            list.iter().map(|a| a.id).collect()
        }
        let (favs, others) = arrange_abilities(&abilities, &favorites, None, "");
        assert_eq!(ids(favs), vec![2, 4]);
        assert_eq!(ids(others), vec![1, 3]);

        let magia = AbilityType::Magia;
        let (favs, others) = arrange_abilities(&abilities, &favorites, Some(&magia), "FOGO");
        assert!(favs.is_empty());
        assert_eq!(ids(others), vec![1]);
    }

    #[test]
    fn theme_defaults_and_toggles() {
        let mut prefs = MemoryPreferences::new();
        assert_eq!(load_theme(&prefs, None, Theme::Dark), Theme::Dark);
        let next = toggle_theme(Theme::Dark, &mut prefs, None).unwrap();
        assert_eq!(next, Theme::Light);
        assert_eq!(load_theme(&prefs, None, Theme::Dark), Theme::Light);
    }

    #[test]
    fn synced_theme_wins_over_local() {
        let store = MemoryStore::new();
        let remote: (&dyn DocumentStore, &str) = (&store, "ana");
        let mut prefs = MemoryPreferences::new();
        toggle_theme(Theme::Dark, &mut prefs, Some(remote)).unwrap();
        prefs.set(THEME_KEY, "dark").unwrap();
        assert_eq!(load_theme(&prefs, Some(remote), Theme::Dark), Theme::Light);
    }

    #[test]
    fn active_tab_defaults_to_attributes() {
        let mut prefs = MemoryPreferences::new();
        assert_eq!(active_tab(&prefs, "c1"), SheetTab::Attributes);
        set_active_tab(&mut prefs, "c1", SheetTab::Inventory).unwrap();
        assert_eq!(prefs.get("activeTab-c1").as_deref(), Some("inventory"));
        assert_eq!(active_tab(&prefs, "c1"), SheetTab::Inventory);
        prefs.set("activeTab-c2", "bogus").unwrap();
        assert_eq!(active_tab(&prefs, "c2"), SheetTab::Attributes);
    }

    #[test]
    fn file_preferences_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs/preferences.json");
        {
            let mut prefs = FilePreferences::open(&path).unwrap();
            prefs.set(THEME_KEY, "light").unwrap();
        }
        let prefs = FilePreferences::open(&path).unwrap();
        assert_eq!(prefs.get(THEME_KEY).as_deref(), Some("light"));
    }
}
