// Permissive coercion used everywhere a number or text crosses the storage or input boundary.
// Anything that is not a usable number becomes 0; nothing here ever fails.
use serde::{Deserialize, Deserializer};
use serde_json::Value;

// Coerced numbers are clamped to this magnitude. Epoch-millisecond ids stay well below it.
pub const COERCE_LIMIT: i64 = 1_000_000_000_000_000;

// Parse user-entered text as an integer. Empty or invalid input gives 0.
pub fn parse_int(text: &str) -> i64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0;
    }
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(float_to_int))
        .map_or(0, clamp)
}

// Coerce any JSON value to an integer. Numbers, numeric strings and booleans convert; else 0.
pub fn coerce_int(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(float_to_int))
            .map_or(0, clamp),
        Value::String(text) => parse_int(text),
        Value::Bool(flag) => i64::from(*flag),
        _ => 0,
    }
}

pub fn coerce_non_negative(value: &Value) -> i64 {
    coerce_int(value).max(0)
}

// Text fields accept strings and numbers; everything else reads as empty.
pub fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

fn clamp(value: i64) -> i64 {
    value.clamp(-COERCE_LIMIT, COERCE_LIMIT)
}

fn float_to_int(value: f64) -> i64 {
    if value.is_finite() {
        value.trunc() as i64
    } else {
        0
    }
}

/// Serde adapters for fields that must never fail to load.
pub mod lenient {
    use super::*;

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(coerce_int(&value))
    }

    pub fn non_negative<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(coerce_non_negative(&value))
    }

    // `null`, `""` and `0` all mean "not set" for an overridable maximum.
    pub fn optional_max<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match coerce_non_negative(&value) {
            0 => None,
            max => Some(max),
        })
    }

    pub fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(coerce_int(&value).max(1))
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(coerce_text(&value))
    }

    pub fn optional_text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => None,
            other => Some(coerce_text(&other)).filter(|text| !text.is_empty()),
        })
    }

    pub fn int_map<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<std::collections::BTreeMap<String, i64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| (key.clone(), coerce_int(value)))
                .collect(),
            _ => Default::default(),
        })
    }

    pub fn text_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Array(items) => items
                .iter()
                .map(coerce_text)
                .filter(|text| !text.is_empty())
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn int_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Array(items) => items.iter().map(coerce_int).collect(),
            _ => Vec::new(),
        })
    }

    // Lists of records: a malformed entry is dropped rather than failing the whole sheet.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_int_degrades_to_zero() {
        assert_eq!(parse_int(""), 0);
        assert_eq!(parse_int("   "), 0);
        assert_eq!(parse_int("abc"), 0);
        assert_eq!(parse_int(" 42 "), 42);
        assert_eq!(parse_int("-7"), -7);
        assert_eq!(parse_int("3.9"), 3);
    }

    #[test]
    fn huge_numbers_are_clamped() {
        assert_eq!(parse_int("1e30"), COERCE_LIMIT);
        assert_eq!(parse_int("99999999999999999999"), COERCE_LIMIT);
        assert_eq!(parse_int("-9223372036854775808"), -COERCE_LIMIT);
        assert_eq!(coerce_int(&json!(u64::MAX)), COERCE_LIMIT);
        assert_eq!(coerce_int(&json!(-1e300)), -COERCE_LIMIT);
        assert_eq!(coerce_int(&json!(1700000000000i64)), 1700000000000);
    }

    #[test]
    fn coerce_int_accepts_json_shapes() {
        assert_eq!(coerce_int(&json!(5)), 5);
        assert_eq!(coerce_int(&json!(2.5)), 2);
        assert_eq!(coerce_int(&json!("12")), 12);
        assert_eq!(coerce_int(&json!("")), 0);
        assert_eq!(coerce_int(&json!(null)), 0);
        assert_eq!(coerce_int(&json!(true)), 1);
        assert_eq!(coerce_int(&json!([1, 2])), 0);
        assert_eq!(coerce_non_negative(&json!(-4)), 0);
    }

    #[test]
    fn coerce_text_handles_numbers() {
        assert_eq!(coerce_text(&json!("a")), "a");
        assert_eq!(coerce_text(&json!(25)), "25");
        assert_eq!(coerce_text(&json!(null)), "");
    }
}
