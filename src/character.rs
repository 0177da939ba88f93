// Import necessary modules from external crates.
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::utils::{coerce_int, coerce_text, lenient};

pub const SANITY_MAX: i64 = 100;
pub const INATA_PER_LEVEL: i64 = 200;
pub const ETHER_PER_LEVEL: i64 = 100;
pub const VIGOR_PER_LEVEL: i64 = 50;

// Identifier of abilities, traits and conditions inside a sheet (epoch milliseconds at creation).
pub type EntryId = i64;

// The named resources tracked in a sheet's bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Pool {
    Inata,
    Ether,
    Vigor,
    #[strum(to_string = "HP")]
    Hp,
    Sanity,
}

impl Pool {
    // Field name of the pool inside the stored `bars` object.
    pub fn key(self) -> &'static str {
        match self {
            Pool::Inata => "inata",
            Pool::Ether => "ether",
            Pool::Vigor => "vigor",
            Pool::Hp => "hp",
            Pool::Sanity => "sanity",
        }
    }

    pub fn from_key(key: &str) -> Option<Pool> {
        Pool::iter().find(|pool| pool.key().eq_ignore_ascii_case(key.trim()))
    }
}

// Category of an ability. Each known category draws from exactly one pool; anything else is
// kept as written so a sheet with foreign data still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AbilityType {
    #[default]
    Inata,
    Magia,
    Arte,
    Other(String),
}

impl AbilityType {
    pub fn as_str(&self) -> &str {
        match self {
            AbilityType::Inata => "inata",
            AbilityType::Magia => "magia",
            AbilityType::Arte => "arte",
            AbilityType::Other(name) => name,
        }
    }

    pub fn pool(&self) -> Option<Pool> {
        match self {
            AbilityType::Inata => Some(Pool::Inata),
            AbilityType::Magia => Some(Pool::Vigor),
            AbilityType::Arte => Some(Pool::Ether),
            AbilityType::Other(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            AbilityType::Inata => "Inata",
            AbilityType::Magia => "Magia",
            AbilityType::Arte => "Arte Divina",
            AbilityType::Other(name) => name,
        }
    }
}

impl From<&str> for AbilityType {
    fn from(name: &str) -> Self {
        match name {
            "inata" => AbilityType::Inata,
            "magia" => AbilityType::Magia,
            "arte" => AbilityType::Arte,
            other => AbilityType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AbilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for AbilityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AbilityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(AbilityType::from(coerce_text(&value).as_str()))
    }
}

// Current and maximum values of every pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Bars {
    #[serde(deserialize_with = "lenient::non_negative")]
    pub hp: i64,
    #[serde(
        deserialize_with = "lenient::optional_max",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_hp: Option<i64>,
    #[serde(deserialize_with = "sanity_value")]
    pub sanity: i64,
    #[serde(deserialize_with = "lenient::non_negative")]
    pub inata: i64,
    #[serde(deserialize_with = "lenient::non_negative")]
    pub ether: i64,
    #[serde(deserialize_with = "lenient::non_negative")]
    pub vigor: i64,
    #[serde(
        deserialize_with = "lenient::optional_max",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_ether: Option<i64>,
    #[serde(
        deserialize_with = "lenient::optional_max",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_vigor: Option<i64>,
}

impl Default for Bars {
    fn default() -> Self {
        Bars {
            hp: 20,
            max_hp: Some(20),
            sanity: SANITY_MAX,
            inata: 10,
            ether: 10,
            vigor: 10,
            max_ether: None,
            max_vigor: None,
        }
    }
}

impl Bars {
    pub fn current(&self, pool: Pool) -> i64 {
        match pool {
            Pool::Inata => self.inata,
            Pool::Ether => self.ether,
            Pool::Vigor => self.vigor,
            Pool::Hp => self.hp,
            Pool::Sanity => self.sanity,
        }
    }

    // Sets a current value, floored at 0 (sanity is also capped).
    pub fn set_current(&mut self, pool: Pool, value: i64) {
        let value = value.max(0);
        match pool {
            Pool::Inata => self.inata = value,
            Pool::Ether => self.ether = value,
            Pool::Vigor => self.vigor = value,
            Pool::Hp => self.hp = value,
            Pool::Sanity => self.sanity = value.min(SANITY_MAX),
        }
    }

    /// Effective maximum of a pool at the given level.
    ///
    /// Inata is always derived from the level and sanity is fixed; the hp maximum falls back to
    /// current hp, and ether/vigor fall back to their per-level defaults until overridden.
    pub fn max_for(&self, pool: Pool, level: i64) -> i64 {
        match pool {
            Pool::Inata => level.saturating_mul(INATA_PER_LEVEL),
            Pool::Ether => self
                .max_ether
                .unwrap_or(level.saturating_mul(ETHER_PER_LEVEL)),
            Pool::Vigor => self
                .max_vigor
                .unwrap_or(level.saturating_mul(VIGOR_PER_LEVEL)),
            Pool::Hp => self.max_hp.unwrap_or(self.hp),
            Pool::Sanity => SANITY_MAX,
        }
    }
}

fn sanity_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => SANITY_MAX,
        other => coerce_int(&other).clamp(0, SANITY_MAX),
    })
}

// Named integer attributes. Stored keys are laid over the template set, so older documents keep
// every default attribute and extra attributes survive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, i64>);

pub const DEFAULT_STATS: [(&str, i64); 9] = [
    ("for", 10),
    ("des", 10),
    ("sab", 10),
    ("int", 10),
    ("car", 10),
    ("con", 10),
    ("arteDivina", 0),
    ("inata", 0),
    ("magica", 0),
];

impl Default for Stats {
    fn default() -> Self {
        Stats(
            DEFAULT_STATS
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for Stats {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = lenient::int_map(deserializer)?;
        let mut stats = Stats::default();
        stats.0.extend(stored);
        Ok(stats)
    }
}

impl Stats {
    pub fn empty() -> Self {
        Stats(BTreeMap::new())
    }

    // Absent stats read as 0.
    pub fn get(&self, name: &str) -> i64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: impl Into<String>, value: i64) {
        self.0.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<const N: usize> From<[(&str, i64); N]> for Stats {
    fn from(entries: [(&str, i64); N]) -> Self {
        Stats(
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        )
    }
}

// Free-text descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterInfo {
    #[serde(deserialize_with = "lenient::text")]
    pub class: String,
    #[serde(deserialize_with = "lenient::text")]
    pub race: String,
    #[serde(deserialize_with = "lenient::text")]
    pub background: String,
    #[serde(deserialize_with = "lenient::text")]
    pub alignment: String,
    #[serde(deserialize_with = "lenient::text")]
    pub age: String,
    #[serde(deserialize_with = "lenient::text")]
    pub height: String,
    #[serde(deserialize_with = "lenient::text")]
    pub weight: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InfoField {
    Class,
    Race,
    Background,
    Alignment,
    Age,
    Height,
    Weight,
}

impl CharacterInfo {
    pub fn field_mut(&mut self, field: InfoField) -> &mut String {
        match field {
            InfoField::Class => &mut self.class,
            InfoField::Race => &mut self.race,
            InfoField::Background => &mut self.background,
            InfoField::Alignment => &mut self.alignment,
            InfoField::Age => &mut self.age,
            InfoField::Height => &mut self.height,
            InfoField::Weight => &mut self.weight,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Coins {
    #[serde(deserialize_with = "lenient::non_negative")]
    pub gold: i64,
    #[serde(deserialize_with = "lenient::non_negative")]
    pub silver: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ability {
    #[serde(deserialize_with = "lenient::int")]
    pub id: EntryId,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: AbilityType,
    #[serde(deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(deserialize_with = "lenient::text")]
    pub effect: String,
    #[serde(deserialize_with = "lenient::text")]
    pub damage: String, // Damage expression text, e.g. "1d8".
    #[serde(deserialize_with = "lenient::non_negative")]
    pub cost: i64,
}

// A timed status: counts down one round per application, optionally dealing damage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    #[serde(deserialize_with = "lenient::int")]
    pub id: EntryId,
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(deserialize_with = "lenient::non_negative")]
    pub rounds: i64,
    #[serde(deserialize_with = "lenient::non_negative")]
    pub damage: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub effect: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterTrait {
    #[serde(deserialize_with = "lenient::int")]
    pub id: EntryId,
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(deserialize_with = "lenient::text")]
    pub effect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryItem {
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(deserialize_with = "lenient::quantity")]
    pub quantity: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(deserialize_with = "lenient::text_list")]
    pub tags: Vec<String>,
}

impl Default for InventoryItem {
    fn default() -> Self {
        InventoryItem {
            name: String::new(),
            quantity: 1,
            description: String::new(),
            tags: Vec::new(),
        }
    }
}

// Define a structure representing a character's sheet as stored per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSheet {
    #[serde(
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub owner: String,
    #[serde(default = "default_name", deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default = "default_is_main", deserialize_with = "truthy")]
    pub is_main: bool,
    #[serde(default = "default_level", deserialize_with = "lenient::non_negative")]
    pub level: i64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub image: String,

    // Structural sub-objects, always present after loading.
    #[serde(default, deserialize_with = "or_default")]
    pub bars: Bars,
    #[serde(default, deserialize_with = "or_default")]
    pub stats: Stats,
    #[serde(default, deserialize_with = "or_default")]
    pub character_info: CharacterInfo,
    #[serde(default, deserialize_with = "or_default")]
    pub coins: Coins,

    #[serde(default, deserialize_with = "lenient::list")]
    pub abilities: Vec<Ability>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub inventory: Vec<InventoryItem>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub traits: Vec<CharacterTrait>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub effects: Vec<Condition>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub notes: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub created_at: i64,
}

fn default_name() -> String {
    "New Character".to_string()
}

fn default_is_main() -> bool {
    true
}

fn default_level() -> i64 {
    1
}

fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    })
}

// A sub-object that is null or malformed loads as its default instead of failing the sheet.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl Default for CharacterSheet {
    fn default() -> Self {
        CharacterSheet {
            id: None,
            owner: String::new(),
            name: default_name(),
            is_main: default_is_main(),
            level: default_level(),
            image: String::new(),
            bars: Bars::default(),
            stats: Stats::default(),
            character_info: CharacterInfo::default(),
            coins: Coins::default(),
            abilities: Vec::new(),
            inventory: Vec::new(),
            traits: Vec::new(),
            effects: Vec::new(),
            notes: String::new(),
            created_at: 0,
        }
    }
}

impl CharacterSheet {
    // The default template for a new sheet, stamped with its owner and creation time.
    pub fn template(owner: &str) -> Self {
        CharacterSheet {
            owner: owner.to_string(),
            created_at: Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }

    /// Loads a stored document. Every field is coerced, so this only falls back to the
    /// template when the document is not an object at all.
    pub fn from_document(id: &str, fields: Value) -> Self {
        let mut sheet = serde_json::from_value::<CharacterSheet>(fields).unwrap_or_else(|e| {
            log::warn!("Unreadable character document {id}: {e}");
            CharacterSheet::default()
        });
        sheet.id = Some(id.to_string());
        sheet
    }

    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn max_for(&self, pool: Pool) -> i64 {
        self.bars.max_for(pool, self.level)
    }

    pub fn ability(&self, id: EntryId) -> Option<&Ability> {
        self.abilities.iter().find(|ability| ability.id == id)
    }

    pub fn condition(&self, id: EntryId) -> Option<&Condition> {
        self.effects.iter().find(|condition| condition.id == id)
    }

    // A fresh entry id: the current epoch millisecond, bumped past any id already in the sheet.
    pub fn next_entry_id(&self) -> EntryId {
        let now = Utc::now().timestamp_millis();
        let highest = self
            .abilities
            .iter()
            .map(|a| a.id)
            .chain(self.traits.iter().map(|t| t.id))
            .chain(self.effects.iter().map(|c| c.id))
            .max()
            .unwrap_or(0);
        now.max(highest.saturating_add(1))
    }
}
