// Per-user roll history: records written after every roll and read back newest first.
use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::dice::{PURE_ROLL, RollOutcome, RollRequest};
use crate::error::StoreError;
use crate::store::{Direction, DocumentStore, Query, Snapshot, SnapshotStream, roll_history_path};
use crate::utils::lenient;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

pub const ADVANTAGE_LABEL: &str = "Vantagem (d20x2)";
pub const DISADVANTAGE_LABEL: &str = "Desvantagem (d20x2)";
pub const INITIATIVE_LABEL: &str = "Iniciativa (d20)";

// Structure to hold one stored roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollRecord {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub dice_string: String, // "2d6", "Vantagem (d20x2)", ...
    #[serde(deserialize_with = "lenient::int_list")]
    pub results: Vec<i64>, // Raw faces, without modifiers.
    #[serde(deserialize_with = "lenient::int")]
    pub modifier: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub total: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub attribute: String, // Stat name, or "puro".
    #[serde(deserialize_with = "lenient::int")]
    pub manual_mod: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub timestamp: i64, // Epoch milliseconds.
}

impl Default for RollRecord {
    fn default() -> Self {
        RollRecord {
            id: None,
            dice_string: String::new(),
            results: Vec::new(),
            modifier: 0,
            total: 0,
            attribute: PURE_ROLL.to_string(),
            manual_mod: 0,
            timestamp: 0,
        }
    }
}

impl RollRecord {
    pub fn from_request(request: &RollRequest, outcome: &RollOutcome, modifier: i64) -> Self {
        RollRecord {
            dice_string: request.dice_string(),
            results: raw_faces(outcome),
            modifier,
            total: outcome.total,
            attribute: request
                .attribute
                .clone()
                .unwrap_or_else(|| PURE_ROLL.to_string()),
            manual_mod: request.manual_modifier,
            ..Default::default()
        }
    }

    pub fn advantage(outcome: &RollOutcome, is_advantage: bool) -> Self {
        let label = if is_advantage {
            ADVANTAGE_LABEL
        } else {
            DISADVANTAGE_LABEL
        };
        Self::unmodified(label, outcome)
    }

    pub fn initiative(outcome: &RollOutcome) -> Self {
        Self::unmodified(INITIATIVE_LABEL, outcome)
    }

    fn unmodified(label: &str, outcome: &RollOutcome) -> Self {
        RollRecord {
            dice_string: label.to_string(),
            results: raw_faces(outcome),
            total: outcome.total,
            ..Default::default()
        }
    }

    fn from_document(id: &str, fields: serde_json::Value) -> Option<Self> {
        match serde_json::from_value::<RollRecord>(fields) {
            Ok(mut record) => {
                record.id = Some(id.to_string());
                Some(record)
            }
            Err(e) => {
                log::warn!("Skipping unreadable roll record {id}: {e}");
                None
            }
        }
    }

    // Local time as dd/mm/YYYY HH:MM; empty when the record has no timestamp.
    pub fn formatted_time(&self) -> String {
        if self.timestamp == 0 {
            return String::new();
        }
        Local
            .timestamp_millis_opt(self.timestamp)
            .single()
            .map(|time| time.format("%d/%m/%Y %H:%M").to_string())
            .unwrap_or_default()
    }
}

fn raw_faces(outcome: &RollOutcome) -> Vec<i64> {
    outcome.results.iter().map(|r| i64::from(r.raw)).collect()
}

/// Appends a record to the user's history, stamping it with the current time. Returns the
/// new document id.
pub fn record_roll(
    store: &dyn DocumentStore,
    username: &str,
    record: &RollRecord,
) -> Result<String, StoreError> {
    let stamped = RollRecord {
        timestamp: Utc::now().timestamp_millis(),
        ..record.clone()
    };
    let fields = serde_json::to_value(&stamped)?;
    let id = store.put(&roll_history_path(username), None, fields)?;
    log::debug!("Recorded roll {} = {} for {username}", stamped.dice_string, stamped.total);
    Ok(id)
}

fn history_query(limit: usize) -> Query {
    Query::order_by("timestamp", Direction::Descending).limit(limit)
}

pub fn records_from_snapshot(snapshot: &Snapshot) -> Vec<RollRecord> {
    snapshot
        .documents
        .iter()
        .filter_map(|doc| RollRecord::from_document(&doc.id, doc.fields.clone()))
        .collect()
}

// The `limit` most recent rolls, newest first.
pub fn recent_rolls(
    store: &dyn DocumentStore,
    username: &str,
    limit: usize,
) -> Result<Vec<RollRecord>, StoreError> {
    let snapshot = store.snapshot(&roll_history_path(username), &history_query(limit))?;
    Ok(records_from_snapshot(&snapshot))
}

// Live view of `recent_rolls`; decode each snapshot with `records_from_snapshot`.
pub fn watch_rolls(
    store: &dyn DocumentStore,
    username: &str,
    limit: usize,
) -> Result<SnapshotStream, StoreError> {
    store.watch(&roll_history_path(username), history_query(limit))
}

// Records whose expression contains `needle`, ignoring case. An empty needle keeps everything.
pub fn filter_history<'a>(records: &'a [RollRecord], needle: &str) -> Vec<&'a RollRecord> {
    let needle = needle.to_lowercase();
    records
        .iter()
        .filter(|record| needle.is_empty() || record.dice_string.to_lowercase().contains(&needle))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
    pub average: i64,
    pub max: i64,
    pub min: i64,
}

/// Average (rounded half up), maximum and minimum of the totals, or `None` for no records.
pub fn history_stats<'a>(
    records: impl IntoIterator<Item = &'a RollRecord>,
) -> Option<HistoryStats> {
    let totals: Vec<i64> = records.into_iter().map(|r| r.total).collect();
    let count = totals.len();
    if count == 0 {
        return None;
    }
    let sum = totals.iter().fold(0i64, |sum, total| sum.saturating_add(*total));
    let average = (sum as f64 / count as f64 + 0.5).floor() as i64;
    Some(HistoryStats {
        average,
        max: totals.iter().copied().max()?,
        min: totals.iter().copied().min()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Stats;
    use crate::dice::{DieType, ScriptedDice, roll_advantage_with, roll_initiative_with};
    use crate::store::MemoryStore;

    fn record(dice_string: &str, total: i64) -> RollRecord {
        RollRecord {
            dice_string: dice_string.to_string(),
            total,
            ..Default::default()
        }
    }

    #[test]
    fn request_record_carries_expression_and_modifiers() {
        let request = RollRequest {
            die: DieType::D6,
            count: 2,
            attribute: Some("for".to_string()),
            manual_modifier: 1,
        };
        let stats = Stats::from([("for", 3)]);
        let outcome = request.roll_with(&mut ScriptedDice::new([4, 5]), &stats);
        let record = RollRecord::from_request(&request, &outcome, request.modifier(&stats));
        assert_eq!(record.dice_string, "2d6");
        assert_eq!(record.results, vec![4, 5]);
        assert_eq!(record.modifier, 4);
        assert_eq!(record.total, 17);
        assert_eq!(record.attribute, "for");
        assert_eq!(record.manual_mod, 1);
    }

    #[test]
    fn special_rolls_use_fixed_labels() {
        let outcome = roll_advantage_with(&mut ScriptedDice::new([5, 17]), false);
        let record = RollRecord::advantage(&outcome, false);
        assert_eq!(record.dice_string, DISADVANTAGE_LABEL);
        assert_eq!(record.results, vec![5, 17]);
        assert_eq!(record.attribute, PURE_ROLL);

        let outcome = roll_initiative_with(&mut ScriptedDice::new([12]));
        assert_eq!(RollRecord::initiative(&outcome).dice_string, INITIATIVE_LABEL);
    }

    #[test]
    fn recent_rolls_are_newest_first_and_bounded() {
        let store = MemoryStore::new();
        for (i, total) in [3, 8, 15].into_iter().enumerate() {
            let fields = serde_json::to_value(RollRecord {
                timestamp: 1_000 + i as i64,
                ..record("1d20", total)
            })
            .unwrap();
            store.put(&roll_history_path("ana"), None, fields).unwrap();
        }
        let rolls = recent_rolls(&store, "ana", 2).unwrap();
        let totals: Vec<i64> = rolls.iter().map(|r| r.total).collect();
        assert_eq!(totals, vec![15, 8]);
        assert!(rolls.iter().all(|r| r.id.is_some()));
    }

    #[test]
    fn watched_history_follows_new_rolls() {
        let store = MemoryStore::new();
        for (i, total) in [3, 8, 15].into_iter().enumerate() {
            let fields = serde_json::to_value(RollRecord {
                timestamp: 1_000 + i as i64,
                ..record("1d20", total)
            })
            .unwrap();
            store.put(&roll_history_path("ana"), None, fields).unwrap();
        }
        let mut stream = watch_rolls(&store, "ana", 2).unwrap();
        let totals = |snapshot: Snapshot| -> Vec<i64> {
            records_from_snapshot(&snapshot).iter().map(|r| r.total).collect()
        };
        assert_eq!(totals(stream.try_next().unwrap().unwrap()), vec![15, 8]);

        record_roll(&store, "ana", &record("2d6", 11)).unwrap();
        assert_eq!(totals(stream.try_next().unwrap().unwrap()), vec![11, 15]);

        record_roll(&store, "bia", &record("1d4", 2)).unwrap();
        assert!(stream.try_next().is_err());
    }

    #[test]
    fn record_roll_stamps_time() {
        let store = MemoryStore::new();
        record_roll(&store, "ana", &record("1d20", 9)).unwrap();
        let rolls = recent_rolls(&store, "ana", DEFAULT_HISTORY_LIMIT).unwrap();
        assert_eq!(rolls.len(), 1);
        assert!(rolls[0].timestamp > 0);
        assert!(!rolls[0].formatted_time().is_empty());
    }

    #[test]
    fn filter_is_case_insensitive() {
        let records = vec![
            record("1d20", 1),
            record(ADVANTAGE_LABEL, 2),
            record(DISADVANTAGE_LABEL, 3),
        ];
        assert_eq!(filter_history(&records, "VANTAGEM").len(), 2);
        assert_eq!(filter_history(&records, "d20").len(), 3);
        assert_eq!(filter_history(&records, "").len(), 3);
    }

    #[test]
    fn stats_round_half_up() {
        let records = vec![record("a", 2), record("b", 3)];
        assert_eq!(
            history_stats(&records),
            Some(HistoryStats {
                average: 3,
                max: 3,
                min: 2
            })
        );
        assert_eq!(history_stats(&Vec::<RollRecord>::new()), None);
    }

    #[test]
    fn stats_saturate_on_huge_totals() {
        let records = vec![record("a", i64::MAX), record("b", i64::MAX)];
        let stats = history_stats(&records).unwrap();
        assert_eq!(stats.max, i64::MAX);
        assert!(stats.average > 0);
    }
}
