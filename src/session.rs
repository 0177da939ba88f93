//! The signed-in user's view of their characters.
//!
//! [`Session::apply_snapshot`] is the only way stored data enters the session: every snapshot
//! of the characters collection replaces the list and the working sheet wholesale. Edits are
//! applied to the working sheet first and then written through the [`DocumentStore`]; the
//! store's next snapshot brings the persisted version back.

use crate::auth::{CredentialVerifier, Credentials, UserName};
use crate::character::{CharacterSheet, EntryId};
use crate::error::{AppError, AuthError, StoreError, ValidationError};
use crate::sheet;
use crate::store::{DocumentStore, Query, Snapshot, SnapshotStream, characters_path};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserName,
    pub characters: Vec<CharacterSheet>, // Main sheets first, otherwise store order.
    pub selected: Option<String>,        // Id of the sheet being edited, if it was ever saved.
    pub sheet: CharacterSheet,           // Working copy shown to the user.
}

pub fn login(
    verifier: &dyn CredentialVerifier,
    credentials: &Credentials,
) -> Result<Session, AuthError> {
    let user = verifier.verify(credentials)?;
    Ok(Session::new(user))
}

// The main sheet created most recently; the first one wins a tie.
fn latest_main(characters: &[CharacterSheet]) -> Option<&CharacterSheet> {
    characters
        .iter()
        .filter(|sheet| sheet.is_main)
        .reduce(|latest, sheet| {
            if sheet.created_at > latest.created_at {
                sheet
            } else {
                latest
            }
        })
}

impl Session {
    pub fn new(user: UserName) -> Self {
        let sheet = CharacterSheet::template(user.as_str());
        Session {
            user,
            characters: Vec::new(),
            selected: None,
            sheet,
        }
    }

    pub fn characters_path(&self) -> String {
        characters_path(self.user.as_str())
    }

    pub fn watch_characters(
        &self,
        store: &dyn DocumentStore,
    ) -> Result<SnapshotStream, StoreError> {
        store.watch(&self.characters_path(), Query::all())
    }

    /// Replaces the character list with `snapshot`. The current selection is kept when it is
    /// still present (its sheet refreshed from the snapshot); otherwise the most recent main
    /// sheet is selected, or a fresh template when there is none.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> Session {
        let mut characters: Vec<CharacterSheet> = snapshot
            .documents
            .iter()
            .map(|doc| CharacterSheet::from_document(&doc.id, doc.fields.clone()))
            .collect();
        characters.sort_by_key(|sheet| !sheet.is_main);

        let kept = self
            .selected
            .as_deref()
            .and_then(|id| characters.iter().find(|sheet| sheet.id.as_deref() == Some(id)));
        let (selected, sheet) = match kept.or_else(|| latest_main(&characters)) {
            Some(sheet) => (sheet.id.clone(), sheet.clone()),
            None => (None, CharacterSheet::template(self.user.as_str())),
        };

        Session {
            user: self.user.clone(),
            characters,
            selected,
            sheet,
        }
    }

    pub fn select(&self, id: &str) -> Result<Session, StoreError> {
        let sheet = self
            .characters
            .iter()
            .find(|sheet| sheet.id.as_deref() == Some(id))
            .ok_or_else(|| StoreError::NotFound {
                path: self.characters_path(),
                id: id.to_string(),
            })?;
        Ok(Session {
            selected: sheet.id.clone(),
            sheet: sheet.clone(),
            ..self.clone()
        })
    }

    /// Writes the working sheet, stamped with the owner. A first save assigns the id and
    /// selects it. On failure the working sheet keeps the edit.
    pub fn save(&mut self, store: &dyn DocumentStore) -> Result<String, StoreError> {
        self.sheet.owner = self.user.to_string();
        let mut fields = self.sheet.to_document();
        if let Some(object) = fields.as_object_mut() {
            object.remove("id");
        }
        let id = store.put(&self.characters_path(), self.sheet.id.as_deref(), fields)?;
        if self.sheet.id.is_none() {
            log::info!("Created character {} ({id})", self.sheet.name);
        }
        self.sheet.id = Some(id.clone());
        self.selected = Some(id.clone());
        Ok(id)
    }

    // Optimistic edit: show `updated` immediately, then persist it.
    pub fn commit(
        &mut self,
        store: &dyn DocumentStore,
        updated: CharacterSheet,
    ) -> Result<(), StoreError> {
        self.sheet = updated;
        self.save(store).map(|_| ())
    }

    // A new sheet named after its position in the list, saved straight away.
    pub fn create_character(&mut self, store: &dyn DocumentStore) -> Result<String, StoreError> {
        self.sheet = CharacterSheet {
            name: format!("Nova Ficha {}", self.characters.len() + 1),
            ..CharacterSheet::template(self.user.as_str())
        };
        self.selected = None;
        self.save(store)
    }

    pub fn delete_character(
        &mut self,
        store: &dyn DocumentStore,
        id: &str,
    ) -> Result<(), StoreError> {
        store.delete(&self.characters_path(), id)?;
        log::info!("Deleted character {id}");
        self.selected = None;
        self.sheet = CharacterSheet::template(self.user.as_str());
        Ok(())
    }

    pub fn use_ability(
        &mut self,
        store: &dyn DocumentStore,
        ability_id: EntryId,
    ) -> Result<(), AppError> {
        let ability = self
            .sheet
            .ability(ability_id)
            .ok_or(ValidationError::UnknownEntry {
                collection: "abilities",
                id: ability_id,
            })?;
        let updated = sheet::spend_resource(&self.sheet, ability)?;
        self.commit(store, updated)?;
        Ok(())
    }

    pub fn tick_condition(
        &mut self,
        store: &dyn DocumentStore,
        condition_id: EntryId,
    ) -> Result<(), AppError> {
        if self.sheet.condition(condition_id).is_none() {
            return Err(ValidationError::UnknownEntry {
                collection: "effects",
                id: condition_id,
            }
            .into());
        }
        let updated = sheet::tick_condition(&self.sheet, condition_id);
        self.commit(store, updated)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LocalVerifier;
    use crate::store::{Document, MemoryStore};
    use serde_json::json;

    fn snapshot(docs: Vec<(&str, serde_json::Value)>) -> Snapshot {
        Snapshot {
            path: "users/ana/characters".to_string(),
            documents: docs
                .into_iter()
                .map(|(id, fields)| Document {
                    id: id.to_string(),
                    fields,
                })
                .collect(),
        }
    }

    fn session() -> Session {
        login(&LocalVerifier, &Credentials::new("ana", "pw")).unwrap()
    }

    #[test]
    fn most_recent_main_is_selected() {
        let state = session().apply_snapshot(&snapshot(vec![
            ("a", json!({ "name": "Old", "isMain": true, "createdAt": 1 })),
            ("b", json!({ "name": "Side", "isMain": false, "createdAt": 9 })),
            ("c", json!({ "name": "New", "isMain": true, "createdAt": 5 })),
        ]));
        assert_eq!(state.selected.as_deref(), Some("c"));
        assert_eq!(state.sheet.name, "New");
        let order: Vec<&str> = state.characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["Old", "New", "Side"]);
    }

    #[test]
    fn no_main_falls_back_to_template() {
        let state = session().apply_snapshot(&snapshot(vec![(
            "b",
            json!({ "name": "Side", "isMain": false }),
        )]));
        assert_eq!(state.selected, None);
        assert_eq!(state.sheet.owner, "ana");
        assert_eq!(state.sheet.id, None);
    }

    #[test]
    fn selection_survives_and_is_refreshed() {
        let first = session().apply_snapshot(&snapshot(vec![
            ("a", json!({ "name": "Main", "isMain": true })),
            ("b", json!({ "name": "Side", "isMain": false, "level": 1 })),
        ]));
        let picked = first.select("b").unwrap();
        let next = picked.apply_snapshot(&snapshot(vec![
            ("a", json!({ "name": "Main", "isMain": true })),
            ("b", json!({ "name": "Side", "isMain": false, "level": 4 })),
        ]));
        assert_eq!(next.selected.as_deref(), Some("b"));
        assert_eq!(next.sheet.level, 4);
        assert!(first.select("zzz").is_err());
    }

    #[test]
    fn create_save_and_delete_flow() {
        let store = MemoryStore::new();
        let mut state = session();
        let id = state.create_character(&store).unwrap();
        assert_eq!(state.selected.as_deref(), Some(id.as_str()));
        assert_eq!(state.sheet.name, "Nova Ficha 1");

        let stored = store.get("users/ana/characters", &id).unwrap();
        assert_eq!(stored.fields["owner"], "ana");
        assert!(stored.fields.get("id").is_none());

        state.delete_character(&store, &id).unwrap();
        assert_eq!(state.selected, None);
        assert_eq!(state.sheet.id, None);
        assert!(store.get("users/ana/characters", &id).is_err());
    }

    #[test]
    fn watch_delivers_saved_sheets() {
        let store = MemoryStore::new();
        let mut state = session();
        let mut stream = state.watch_characters(&store).unwrap();
        state = state.apply_snapshot(&stream.try_next().unwrap().unwrap());
        let id = state.create_character(&store).unwrap();
        state = state.apply_snapshot(&stream.try_next().unwrap().unwrap());
        assert_eq!(state.characters.len(), 1);
        assert_eq!(state.selected.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn failed_spend_leaves_the_sheet() {
        let store = MemoryStore::new();
        let mut state = session();
        assert!(matches!(
            state.use_ability(&store, 42),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            state.tick_condition(&store, 42),
            Err(AppError::Validation(_))
        ));
        assert_eq!(state.sheet.id, None);
    }
}
