//! Immutable-update helpers for the nested parts of a [`CharacterSheet`].
//!
//! A [`Lens`] pairs a read accessor with a write accessor for one field. Updates always work
//! on a clone of the whole sheet and hand the clone back, so the caller's value is never
//! touched and no two sheets ever share a nested object.

use crate::character::{
    Ability, Bars, CharacterInfo, CharacterSheet, CharacterTrait, Coins, Condition,
    InventoryItem, Stats,
};

pub struct Lens<S, A> {
    get: fn(&S) -> &A,
    get_mut: fn(&mut S) -> &mut A,
}

impl<S, A> Clone for Lens<S, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, A> Copy for Lens<S, A> {}

impl<S: Clone, A> Lens<S, A> {
    pub const fn new(get: fn(&S) -> &A, get_mut: fn(&mut S) -> &mut A) -> Self {
        Lens { get, get_mut }
    }

    pub fn view<'s>(&self, whole: &'s S) -> &'s A {
        (self.get)(whole)
    }

    // Replace the focused part, returning the updated copy.
    pub fn set(&self, whole: &S, part: A) -> S {
        self.over(whole, |focus| *focus = part)
    }

    // Apply an in-place edit to the focused part of a copy.
    pub fn over(&self, whole: &S, edit: impl FnOnce(&mut A)) -> S {
        let mut updated = whole.clone();
        edit((self.get_mut)(&mut updated));
        updated
    }

    // Like `over`, but the edit may refuse; on refusal nothing is returned but the error.
    pub fn try_over<E>(
        &self,
        whole: &S,
        edit: impl FnOnce(&mut A) -> Result<(), E>,
    ) -> Result<S, E> {
        let mut updated = whole.clone();
        edit((self.get_mut)(&mut updated))?;
        Ok(updated)
    }
}

macro_rules! sheet_lens {
    ($name:ident, $field:ident, $ty:ty) => {
        pub fn $name() -> Lens<CharacterSheet, $ty> {
            fn get(sheet: &CharacterSheet) -> &$ty {
                &sheet.$field
            }
            fn get_mut(sheet: &mut CharacterSheet) -> &mut $ty {
                &mut sheet.$field
            }
            Lens::new(get, get_mut)
        }
    };
}

sheet_lens!(name, name, String);
sheet_lens!(level, level, i64);
sheet_lens!(is_main, is_main, bool);
sheet_lens!(image, image, String);
sheet_lens!(notes, notes, String);
sheet_lens!(bars, bars, Bars);
sheet_lens!(stats, stats, Stats);
sheet_lens!(character_info, character_info, CharacterInfo);
sheet_lens!(coins, coins, Coins);
sheet_lens!(abilities, abilities, Vec<Ability>);
sheet_lens!(inventory, inventory, Vec<InventoryItem>);
sheet_lens!(traits, traits, Vec<CharacterTrait>);
sheet_lens!(effects, effects, Vec<Condition>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Pool;

    #[test]
    fn over_leaves_the_original_untouched() {
        let sheet = CharacterSheet::default();
        let updated = bars().over(&sheet, |bars| bars.set_current(Pool::Hp, 3));
        assert_eq!(sheet.bars.hp, 20);
        assert_eq!(updated.bars.hp, 3);
        assert_eq!(bars().view(&updated).hp, 3);
    }

    #[test]
    fn try_over_propagates_refusal() {
        let sheet = CharacterSheet::default();
        let result: Result<CharacterSheet, &str> = coins().try_over(&sheet, |_| Err("no"));
        assert_eq!(result, Err("no"));
    }

    #[test]
    fn set_replaces_the_focus() {
        let sheet = CharacterSheet::default();
        let renamed = name().set(&sheet, "Kael".to_string());
        assert_eq!(renamed.name, "Kael");
        assert_eq!(sheet.name, "New Character");
    }
}
