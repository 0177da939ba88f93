// Import required modules and crates.
use once_cell::sync::Lazy;
use rand::Rng; // RNG utilities from the rand crate for generating random numbers.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use strum_macros::{Display, EnumIter, EnumString};

use crate::character::Stats;

// The die types offered by the roller, displayed and parsed as "d20" etc.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    #[default]
    D20,
}

impl DieType {
    // Number of faces of each die type.
    pub fn sides(self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
        }
    }

    // Unknown names roll as a d20.
    pub fn from_name(name: &str) -> Self {
        name.trim().parse().unwrap_or_default()
    }
}

// Source of die faces. Lets callers swap the thread RNG for a seeded or scripted one.
pub trait DieRoller {
    fn roll_die(&mut self, sides: u32) -> u32;
}

// Uniform rolls from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDice;

impl DieRoller for ThreadDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        roll_die_with(&mut rand::rng(), sides)
    }
}

// Uniform rolls from any generator, e.g. a seeded `StdRng`.
#[derive(Debug, Clone)]
pub struct RngDice<R: Rng>(pub R);

impl<R: Rng> DieRoller for RngDice<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        roll_die_with(&mut self.0, sides)
    }
}

/// Replays a fixed sequence of faces, for replaying a logged roll or pinning one down in a
/// test. Each face is clamped into the requested die; once exhausted it rolls 1s.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    faces: VecDeque<u32>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        ScriptedDice {
            faces: faces.into_iter().collect(),
        }
    }
}

impl DieRoller for ScriptedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.faces.pop_front().unwrap_or(1).clamp(1, sides.max(1))
    }
}

// Helper function to roll a single die on the thread RNG.
pub fn roll_die(sides: u32) -> u32 {
    roll_die_with(&mut rand::rng(), sides)
}

fn roll_die_with(rng: &mut impl Rng, sides: u32) -> u32 {
    rng.random_range(1..=sides.max(1))
}

// Full-screen signal for a natural 1 or 20 on a d20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum Flash {
    Red,   // Critical failure.
    Green, // Critical success.
}

// Per-die highlight for a near-critical d20 face (2 or 19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum Highlight {
    Red,
    Green,
}

// Structure to hold the result of one die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DieResult {
    pub raw: u32,
    pub modifier: i64,
    pub total: i64,
    pub highlight: Option<Highlight>,
}

// Structure to hold the results of a dice roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollOutcome {
    pub die: DieType,
    pub results: Vec<DieResult>,
    pub total: i64, // Sum of every die's raw value plus its modifier.
    pub flash: Option<Flash>,
    pub highlighted: Option<usize>, // Index of the die picked by advantage/disadvantage.
}

impl RollOutcome {
    pub fn raw_results(&self) -> Vec<u32> {
        self.results.iter().map(|r| r.raw).collect()
    }

    pub fn is_critical_success(&self) -> bool {
        self.flash == Some(Flash::Green)
    }

    pub fn is_critical_failure(&self) -> bool {
        self.flash == Some(Flash::Red)
    }
}

fn near_critical(die: DieType, raw: u32) -> Option<Highlight> {
    match (die, raw) {
        (DieType::D20, 2) => Some(Highlight::Red),
        (DieType::D20, 19) => Some(Highlight::Green),
        _ => None,
    }
}

fn critical(die: DieType, raw: u32) -> Option<Flash> {
    match (die, raw) {
        (DieType::D20, 1) => Some(Flash::Red),
        (DieType::D20, 20) => Some(Flash::Green),
        _ => None,
    }
}

/// Rolls `count` dice of one type, adding `modifier` to each die.
///
/// Only d20s are classified. Faces 1 and 20 raise a flash, and when several dice flash the
/// last one rolled decides the colour. Faces 2 and 19 are highlighted on their own die.
pub fn roll_many_with(
    roller: &mut impl DieRoller,
    die: DieType,
    count: u32,
    modifier: i64,
) -> RollOutcome {
    let mut results = Vec::with_capacity(count as usize); // Store results of each die roll.
    let mut flash = None;

    for _ in 0..count {
        let raw = roller.roll_die(die.sides());
        if let Some(signal) = critical(die, raw) {
            flash = Some(signal);
        }
        results.push(DieResult {
            raw,
            modifier,
            total: i64::from(raw).saturating_add(modifier),
            highlight: near_critical(die, raw),
        });
    }

    let total = results.iter().fold(0i64, |sum, r| sum.saturating_add(r.total));
    RollOutcome {
        die,
        results,
        total,
        flash,
        highlighted: None,
    }
}

pub fn roll_many(die: DieType, count: u32, modifier: i64) -> RollOutcome {
    roll_many_with(&mut ThreadDice, die, count, modifier)
}

/// Rolls two d20s and marks the higher (advantage) or lower (disadvantage) one.
///
/// The total is the sum of both dice, not the picked die. Both dice get near-critical
/// highlights; a natural 1 on either die wins the flash over a natural 20.
pub fn roll_advantage_with(roller: &mut impl DieRoller, is_advantage: bool) -> RollOutcome {
    let mut outcome = roll_many_with(roller, DieType::D20, 2, 0);
    let raws = outcome.raw_results();
    let picked = if is_advantage {
        raws.iter().max()
    } else {
        raws.iter().min()
    }
    .copied();
    outcome.highlighted = picked.and_then(|face| raws.iter().position(|r| *r == face));
    outcome.flash = if raws.contains(&1) {
        Some(Flash::Red)
    } else if raws.contains(&20) {
        Some(Flash::Green)
    } else {
        None
    };
    outcome
}

pub fn roll_advantage(is_advantage: bool) -> RollOutcome {
    roll_advantage_with(&mut ThreadDice, is_advantage)
}

// A single plain d20. Initiative only flashes; near-critical faces are not highlighted.
pub fn roll_initiative_with(roller: &mut impl DieRoller) -> RollOutcome {
    let mut outcome = roll_many_with(roller, DieType::D20, 1, 0);
    for result in outcome.results.iter_mut() {
        result.highlight = None;
    }
    outcome
}

pub fn roll_initiative() -> RollOutcome {
    roll_initiative_with(&mut ThreadDice)
}

// Parsed "NdM" expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSpec {
    pub count: u32,
    pub sides: u32,
}

static DICE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)d(\d+)").expect("dice pattern is a valid regex"));

/// Finds the first `NdM` in the text. Anything else, including numbers too large to hold, is
/// `None` rather than an error.
pub fn parse_dice_string(text: &str) -> Option<DiceSpec> {
    let captures = DICE_PATTERN.captures(text)?;
    Some(DiceSpec {
        count: captures[1].parse().ok()?,
        sides: captures[2].parse().ok()?,
    })
}

// Raw results and summed total of a parsed expression. Flagging does not apply here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionRoll {
    pub dice_string: String,
    pub results: Vec<u32>,
    pub modifier: i64,
    pub total: i64, // Sum of the dice plus the modifier, applied once.
}

pub fn roll_dice_string_with(
    roller: &mut impl DieRoller,
    text: &str,
    modifier: i64,
) -> Option<ExpressionRoll> {
    let spec = parse_dice_string(text)?;
    let results: Vec<u32> = (0..spec.count)
        .map(|_| roller.roll_die(spec.sides))
        .collect();
    let total = results
        .iter()
        .fold(0i64, |sum, r| sum.saturating_add(i64::from(*r)))
        .saturating_add(modifier);
    Some(ExpressionRoll {
        dice_string: text.to_string(),
        results,
        modifier,
        total,
    })
}

pub fn roll_dice_string(text: &str, modifier: i64) -> Option<ExpressionRoll> {
    roll_dice_string_with(&mut ThreadDice, text, modifier)
}

// Marker for "no attribute": a roll without a stat modifier.
pub const PURE_ROLL: &str = "puro";

// Structure to handle the request for a dice roll from the roller panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollRequest {
    pub die: DieType,
    pub count: u32,
    pub attribute: Option<String>, // Stat supplying the modifier, if any.
    pub manual_modifier: i64,
}

impl Default for RollRequest {
    fn default() -> Self {
        RollRequest {
            die: DieType::D20,
            count: 1,
            attribute: None,
            manual_modifier: 0,
        }
    }
}

impl RollRequest {
    // Stat value (0 when absent) plus the manual modifier.
    pub fn modifier(&self, stats: &Stats) -> i64 {
        let stat = self
            .attribute
            .as_deref()
            .filter(|name| *name != PURE_ROLL)
            .map_or(0, |name| stats.get(name));
        stat.saturating_add(self.manual_modifier)
    }

    // Expression written to the roll history, e.g. "2d6".
    pub fn dice_string(&self) -> String {
        format!("{}{}", self.count, self.die)
    }

    pub fn roll_with(&self, roller: &mut impl DieRoller, stats: &Stats) -> RollOutcome {
        roll_many_with(roller, self.die, self.count, self.modifier(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn every_die_stays_in_range_and_covers_all_faces() {
        let mut dice = RngDice(StdRng::seed_from_u64(7));
        for die in DieType::iter() {
            let sides = die.sides();
            let mut seen = HashSet::new();
            for _ in 0..2_000 {
                let face = dice.roll_die(sides);
                assert!((1..=sides).contains(&face), "{die} rolled {face}");
                seen.insert(face);
            }
            assert_eq!(seen.len(), sides as usize, "{die} missed faces");
        }
    }

    #[test]
    fn thread_roll_die_in_bounds() {
        for _ in 0..500 {
            let face = roll_die(6);
            assert!((1..=6).contains(&face));
        }
    }

    #[test]
    fn die_names_parse_and_display() {
        assert_eq!(DieType::from_name("d8"), DieType::D8);
        assert_eq!(DieType::from_name("D12"), DieType::D12);
        assert_eq!(DieType::from_name("d7"), DieType::D20);
        assert_eq!(DieType::D10.to_string(), "d10");
    }

    #[test]
    fn d20_faces_are_classified() {
        let outcome = roll_many_with(&mut ScriptedDice::new([1]), DieType::D20, 1, 0);
        assert_eq!(outcome.flash, Some(Flash::Red));
        assert!(outcome.is_critical_failure());

        let outcome = roll_many_with(&mut ScriptedDice::new([20]), DieType::D20, 1, 0);
        assert_eq!(outcome.flash, Some(Flash::Green));

        let outcome = roll_many_with(&mut ScriptedDice::new([2, 19, 10]), DieType::D20, 3, 0);
        assert_eq!(outcome.flash, None);
        let highlights: Vec<_> = outcome.results.iter().map(|r| r.highlight).collect();
        assert_eq!(
            highlights,
            vec![Some(Highlight::Red), Some(Highlight::Green), None]
        );
    }

    #[test]
    fn no_other_d20_face_is_flagged() {
        for face in 3..=18 {
            let outcome = roll_many_with(&mut ScriptedDice::new([face]), DieType::D20, 1, 0);
            assert_eq!(outcome.flash, None);
            assert_eq!(outcome.results[0].highlight, None);
        }
    }

    #[test]
    fn other_dice_are_never_classified() {
        let outcome = roll_many_with(&mut ScriptedDice::new([1, 2]), DieType::D6, 2, 0);
        assert_eq!(outcome.flash, None);
        assert!(outcome.results.iter().all(|r| r.highlight.is_none()));
    }

    #[test]
    fn modifier_applies_to_every_die() {
        let outcome = roll_many_with(&mut ScriptedDice::new([3, 5]), DieType::D6, 2, 2);
        assert_eq!(outcome.results[0].total, 5);
        assert_eq!(outcome.results[1].total, 7);
        assert_eq!(outcome.total, 12);
    }

    #[test]
    fn advantage_highlights_max_but_sums_both() {
        let outcome = roll_advantage_with(&mut ScriptedDice::new([5, 17]), true);
        assert_eq!(outcome.highlighted, Some(1));
        assert_eq!(outcome.total, 22);

        let outcome = roll_advantage_with(&mut ScriptedDice::new([5, 17]), false);
        assert_eq!(outcome.highlighted, Some(0));
        assert_eq!(outcome.total, 22);
    }

    #[test]
    fn advantage_flags_both_dice() {
        let outcome = roll_advantage_with(&mut ScriptedDice::new([19, 2]), true);
        assert_eq!(outcome.results[0].highlight, Some(Highlight::Green));
        assert_eq!(outcome.results[1].highlight, Some(Highlight::Red));

        let outcome = roll_advantage_with(&mut ScriptedDice::new([20, 1]), true);
        assert_eq!(outcome.flash, Some(Flash::Red));
        assert_eq!(outcome.highlighted, Some(0));
    }

    #[test]
    fn initiative_is_a_plain_d20() {
        let outcome = roll_initiative_with(&mut ScriptedDice::new([20]));
        assert_eq!(outcome.total, 20);
        assert_eq!(outcome.flash, Some(Flash::Green));
        let outcome = roll_initiative_with(&mut ScriptedDice::new([19]));
        assert_eq!(outcome.results[0].highlight, None);
        assert_eq!(outcome.results[0].modifier, 0);
    }

    #[test]
    fn parse_dice_strings() {
        assert_eq!(
            parse_dice_string("2d6"),
            Some(DiceSpec { count: 2, sides: 6 })
        );
        assert_eq!(
            parse_dice_string("roll 1d20+3"),
            Some(DiceSpec {
                count: 1,
                sides: 20
            })
        );
        assert_eq!(parse_dice_string("d20"), None);
        assert_eq!(parse_dice_string("fireball"), None);
        assert_eq!(parse_dice_string(""), None);
    }

    #[test]
    fn expression_roll_adds_modifier_once() {
        let roll = roll_dice_string_with(&mut ScriptedDice::new([4, 6]), "2d8", 3).unwrap();
        assert_eq!(roll.results, vec![4, 6]);
        assert_eq!(roll.total, 13);
        assert!(roll_dice_string("nothing", 1).is_none());
    }

    #[test]
    fn request_modifier_combines_stat_and_manual() {
        let stats = Stats::from([("for", 3)]);
        let request = RollRequest {
            die: DieType::D6,
            count: 2,
            attribute: Some("for".into()),
            manual_modifier: 1,
        };
        assert_eq!(request.modifier(&stats), 4);
        assert_eq!(request.dice_string(), "2d6");

        let pure = RollRequest {
            attribute: Some(PURE_ROLL.into()),
            ..RollRequest::default()
        };
        assert_eq!(pure.modifier(&stats), 0);
    }
}
