//! State transitions on a [`CharacterSheet`].
//!
//! Every function here takes the current sheet by reference and returns the next one. Nothing
//! is persisted and the input is never modified; on a failure path the caller keeps the sheet
//! it already had. Numeric text input goes through [`parse_int`], so bad numbers become 0.

use crate::character::{
    Ability, AbilityType, CharacterSheet, CharacterTrait, Coins, Condition, EntryId, InfoField,
    Pool, Stats, ETHER_PER_LEVEL, VIGOR_PER_LEVEL,
};
use crate::error::{ResourceError, ValidationError};
use crate::lens;
use crate::utils::parse_int;

pub const BASE_ARMOR_CLASS: i64 = 10;

/// Pays an ability's cost from the pool its type is bound to.
pub fn spend_resource(
    sheet: &CharacterSheet,
    ability: &Ability,
) -> Result<CharacterSheet, ResourceError> {
    let pool = ability
        .kind
        .pool()
        .ok_or_else(|| ResourceError::InvalidAbilityType(ability.kind.to_string()))?;

    let cost = ability.cost;
    if cost <= 0 {
        return Err(ResourceError::NoCostDefined);
    }

    let available = sheet.bars.current(pool);
    if available < cost {
        return Err(ResourceError::InsufficientResource {
            pool,
            available,
            required: cost,
        });
    }

    Ok(lens::bars().over(sheet, |bars| bars.set_current(pool, available.saturating_sub(cost))))
}

/// Advances a condition by one round: its damage hits hp (even on the last round) and the
/// condition is dropped once no rounds remain. Unknown ids leave the sheet as it was.
pub fn tick_condition(sheet: &CharacterSheet, condition_id: EntryId) -> CharacterSheet {
    let Some(condition) = sheet.condition(condition_id) else {
        return sheet.clone();
    };
    let remaining = condition.rounds - 1;
    let damage = condition.damage;

    let mut next = sheet.clone();
    if damage > 0 {
        next = lens::bars().over(&next, |bars| {
            bars.set_current(Pool::Hp, bars.hp.saturating_sub(damage));
        });
    }
    lens::effects().over(&next, |effects| {
        if remaining <= 0 {
            effects.retain(|effect| effect.id != condition_id);
        } else if let Some(effect) = effects.iter_mut().find(|e| e.id == condition_id) {
            effect.rounds = remaining;
        }
    })
}

// 10 + the better of half CON or half DEX, rounded down. Never stored.
pub fn compute_armor_class(stats: &Stats) -> i64 {
    let con = stats.get("con").div_euclid(2);
    let des = stats.get("des").div_euclid(2);
    BASE_ARMOR_CLASS + con.max(des)
}

// Current pool values are floored at 0; sanity is capped at its fixed maximum.
pub fn set_bar(sheet: &CharacterSheet, pool: Pool, input: &str) -> CharacterSheet {
    let value = parse_int(input);
    lens::bars().over(sheet, |bars| bars.set_current(pool, value))
}

/// Overrides a pool maximum.
///
/// Inata (derived from level) and sanity (fixed) refuse. Blank input for ether or vigor
/// restores the per-level default; blank hp input clears the override so the maximum follows
/// current hp again.
pub fn set_pool_max(
    sheet: &CharacterSheet,
    pool: Pool,
    input: &str,
) -> Result<CharacterSheet, ValidationError> {
    let blank = input.trim().is_empty();
    let level = sheet.level;
    lens::bars().try_over(sheet, |bars| {
        match pool {
            Pool::Inata | Pool::Sanity => return Err(ValidationError::ReadOnlyMaximum(pool)),
            Pool::Ether => {
                bars.max_ether = Some(if blank {
                    level.saturating_mul(ETHER_PER_LEVEL)
                } else {
                    parse_int(input).max(0)
                })
                .filter(|max| *max > 0);
            }
            Pool::Vigor => {
                bars.max_vigor = Some(if blank {
                    level.saturating_mul(VIGOR_PER_LEVEL)
                } else {
                    parse_int(input).max(0)
                })
                .filter(|max| *max > 0);
            }
            Pool::Hp => bars.max_hp = Some(parse_int(input).max(0)).filter(|max| *max > 0),
        }
        Ok(())
    })
}

pub fn set_stat(sheet: &CharacterSheet, name: &str, input: &str) -> CharacterSheet {
    let value = parse_int(input);
    lens::stats().over(sheet, |stats| stats.set(name, value))
}

pub fn set_info_field(sheet: &CharacterSheet, field: InfoField, text: &str) -> CharacterSheet {
    lens::character_info().over(sheet, |info| *info.field_mut(field) = text.to_string())
}

pub fn set_coins(sheet: &CharacterSheet, gold: &str, silver: &str) -> CharacterSheet {
    let coins = Coins {
        gold: parse_int(gold).max(0),
        silver: parse_int(silver).max(0),
    };
    lens::coins().set(sheet, coins)
}

pub fn set_level(sheet: &CharacterSheet, input: &str) -> CharacterSheet {
    lens::level().set(sheet, parse_int(input).max(0))
}

pub fn set_name(sheet: &CharacterSheet, name: &str) -> CharacterSheet {
    lens::name().set(sheet, name.to_string())
}

pub fn set_notes(sheet: &CharacterSheet, notes: &str) -> CharacterSheet {
    lens::notes().set(sheet, notes.to_string())
}

pub fn set_image(sheet: &CharacterSheet, url: &str) -> CharacterSheet {
    lens::image().set(sheet, url.trim().to_string())
}

pub fn set_main(sheet: &CharacterSheet, is_main: bool) -> CharacterSheet {
    lens::is_main().set(sheet, is_main)
}

// Form input for a new ability; numbers arrive as typed text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbilityDraft {
    pub title: String,
    pub kind: AbilityType,
    pub description: String,
    pub effect: String,
    pub damage: String,
    pub cost: String,
}

pub fn add_ability(
    sheet: &CharacterSheet,
    draft: &AbilityDraft,
) -> Result<CharacterSheet, ValidationError> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(ValidationError::blank("Ability title"));
    }
    let ability = Ability {
        id: sheet.next_entry_id(),
        title: title.to_string(),
        kind: draft.kind.clone(),
        description: draft.description.clone(),
        effect: draft.effect.clone(),
        damage: draft.damage.clone(),
        cost: parse_int(&draft.cost).max(0),
    };
    Ok(lens::abilities().over(sheet, |abilities| abilities.push(ability)))
}

// Partial edit of an existing ability. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct AbilityPatch {
    pub title: Option<String>,
    pub kind: Option<AbilityType>,
    pub description: Option<String>,
    pub effect: Option<String>,
    pub damage: Option<String>,
    pub cost: Option<String>,
}

pub fn update_ability(
    sheet: &CharacterSheet,
    id: EntryId,
    patch: AbilityPatch,
) -> Result<CharacterSheet, ValidationError> {
    lens::abilities().try_over(sheet, |abilities| {
        let ability = abilities
            .iter_mut()
            .find(|ability| ability.id == id)
            .ok_or(ValidationError::UnknownEntry {
                collection: "abilities",
                id,
            })?;
        if let Some(title) = patch.title {
            ability.title = title;
        }
        if let Some(kind) = patch.kind {
            ability.kind = kind;
        }
        if let Some(description) = patch.description {
            ability.description = description;
        }
        if let Some(effect) = patch.effect {
            ability.effect = effect;
        }
        if let Some(damage) = patch.damage {
            ability.damage = damage;
        }
        if let Some(cost) = patch.cost {
            ability.cost = parse_int(&cost).max(0);
        }
        Ok(())
    })
}

pub fn remove_ability(sheet: &CharacterSheet, id: EntryId) -> CharacterSheet {
    lens::abilities().over(sheet, |abilities| abilities.retain(|a| a.id != id))
}

pub fn add_trait(
    sheet: &CharacterSheet,
    name: &str,
    effect: &str,
) -> Result<CharacterSheet, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::blank("Trait name"));
    }
    let entry = CharacterTrait {
        id: sheet.next_entry_id(),
        name: name.to_string(),
        effect: effect.to_string(),
    };
    Ok(lens::traits().over(sheet, |traits| traits.push(entry)))
}

pub fn remove_trait(sheet: &CharacterSheet, id: EntryId) -> CharacterSheet {
    lens::traits().over(sheet, |traits| traits.retain(|t| t.id != id))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionDraft {
    pub name: String,
    pub description: String,
    pub rounds: String,
    pub damage: String,
    pub effect: String,
}

pub fn add_condition(
    sheet: &CharacterSheet,
    draft: &ConditionDraft,
) -> Result<CharacterSheet, ValidationError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::blank("Condition name"));
    }
    let condition = Condition {
        id: sheet.next_entry_id(),
        name: name.to_string(),
        description: draft.description.clone(),
        rounds: parse_int(&draft.rounds).max(0),
        damage: parse_int(&draft.damage).max(0),
        effect: draft.effect.clone(),
    };
    Ok(lens::effects().over(sheet, |effects| effects.push(condition)))
}

pub fn remove_condition(sheet: &CharacterSheet, id: EntryId) -> CharacterSheet {
    lens::effects().over(sheet, |effects| effects.retain(|c| c.id != id))
}
