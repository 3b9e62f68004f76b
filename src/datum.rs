//! Decoded resource tree.
//!
//! Benchmark documents arrive as plain JSON with compact `YYYYMMDDhhmmss`
//! timestamps. `Datum` mirrors JSON but carries a native date/time variant so
//! that chart data built from a resource never has to reparse timestamps.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Field name converted by [`convert_timestamps`].
pub const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Time(NaiveDateTime),
    List(Vec<Datum>),
    /// Keys keep document order.
    Record(IndexMap<String, Datum>),
}

impl Datum {
    pub fn record<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Datum)>) -> Self {
        Datum::Record(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<T: Into<Datum>>(items: impl IntoIterator<Item = T>) -> Self {
        Datum::List(items.into_iter().map(Into::into).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Datum> {
        match self {
            Datum::Record(map) => map.get(key),
            _ => None,
        }
    }

    /// Walks nested records; `None` as soon as a segment is missing.
    pub fn path(&self, keys: &[&str]) -> Option<&Datum> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn at(&self, index: usize) -> Option<&Datum> {
        match self {
            Datum::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Datum::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Datum::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, Datum>> {
        match self {
            Datum::Record(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Text entries of a list, skipping anything that is not text.
    pub fn text_items(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|d| d.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Datum::Text(s) => Value::String(s.clone()),
            Datum::Time(t) => Value::String(t.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Datum::List(items) => Value::Array(items.iter().map(Datum::to_json).collect()),
            Datum::Record(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json());
                }
                Value::Object(out)
            }
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Bool(b),
            Value::Number(n) => n.as_f64().map(Datum::Number).unwrap_or(Datum::Null),
            Value::String(s) => Datum::Text(s),
            Value::Array(items) => Datum::List(items.into_iter().map(Datum::from).collect()),
            Value::Object(map) => {
                Datum::Record(map.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Text(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Text(s)
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Datum::Number(n)
    }
}

impl From<u32> for Datum {
    fn from(n: u32) -> Self {
        Datum::Number(f64::from(n))
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<NaiveDateTime> for Datum {
    fn from(t: NaiveDateTime) -> Self {
        Datum::Time(t)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(items: Vec<T>) -> Self {
        Datum::list(items)
    }
}

// =============================================================================
// Compact timestamps
// =============================================================================

/// Parses the 14-digit `YYYYMMDDhhmmss` wire form.
pub fn parse_compact(s: &str) -> Option<NaiveDateTime> {
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| s[range].parse::<u32>().ok();
    let year = s[0..4].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(
        field(8..10)?,
        field(10..12)?,
        field(12..14)?,
    )
}

pub fn format_compact(t: &NaiveDateTime) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

fn compact_time(value: &Datum) -> Option<NaiveDateTime> {
    match value {
        Datum::Text(s) => parse_compact(s),
        Datum::Number(n) if n.fract() == 0.0 && *n >= 0.0 => parse_compact(&format!("{:.0}", n)),
        _ => None,
    }
}

/// Converts the `timestamp` field of every record held in a list, at any
/// depth. Scalars outside lists are left alone: a summary's top-level
/// timestamp is used verbatim to build file names. Returns how many fields
/// were converted.
pub fn convert_timestamps(node: &mut Datum) -> usize {
    match node {
        Datum::Record(map) => map.values_mut().map(convert_timestamps).sum(),
        Datum::List(items) => items
            .iter_mut()
            .map(|item| {
                let mut converted = 0;
                if let Datum::Record(fields) = item {
                    if let Some(slot) = fields.get_mut(TIMESTAMP_FIELD) {
                        if let Some(t) = compact_time(slot) {
                            *slot = Datum::Time(t);
                            converted += 1;
                        }
                    }
                }
                converted + convert_timestamps(item)
            })
            .sum(),
        _ => 0,
    }
}
