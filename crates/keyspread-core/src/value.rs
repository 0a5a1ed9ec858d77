//! Column values and rows.
//!
//! A [`Row`] is the store-facing shape of every entity: an ordered map from
//! column name to [`Value`]. Entities convert to and from rows through the
//! explicit mappings in [`crate::record::TableRow`]; nothing here knows about
//! any particular entity.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::EncodingError;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int(i64),
    StringArray(Vec<String>),
    Timestamp(DateTime<Utc>),
    /// Placeholder the store replaces with its own commit time.
    ///
    /// Clients write this instead of a concrete timestamp for columns such as
    /// `committed_at`, which must reflect when the transaction committed.
    CommitTimestamp,
}

impl Value {
    /// Name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::StringArray(_) => "string array",
            Value::Timestamp(_) => "timestamp",
            Value::CommitTimestamp => "commit timestamp",
        }
    }

    pub fn is_commit_timestamp(&self) -> bool {
        matches!(self, Value::CommitTimestamp)
    }

    /// Convert to JSON.
    ///
    /// Timestamps become RFC 3339 strings. An unresolved commit timestamp
    /// has no value yet and becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::CommitTimestamp => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::StringArray(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
        }
    }

    /// Convert from JSON.
    ///
    /// JSON carries no timestamp type, so timestamps come back as strings and
    /// are parsed lazily by [`Row::timestamp`].
    pub fn from_json(column: &str, value: serde_json::Value) -> Result<Self, EncodingError> {
        match value {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int).ok_or_else(|| {
                EncodingError::TypeMismatch {
                    column: column.to_string(),
                    expected: "int",
                    actual: "float",
                }
            }),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s),
                    _ => Err(EncodingError::TypeMismatch {
                        column: column.to_string(),
                        expected: "string array",
                        actual: "mixed array",
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::StringArray),
            serde_json::Value::Bool(_) => Err(EncodingError::TypeMismatch {
                column: column.to_string(),
                expected: "scalar",
                actual: "bool",
            }),
            serde_json::Value::Object(_) => Err(EncodingError::TypeMismatch {
                column: column.to_string(),
                expected: "scalar",
                actual: "object",
            }),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StringArray(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

/// A store row: column name to value, ordered by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.columns.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of the row restricted to the given columns. Absent columns are skipped.
    pub fn project(&self, columns: &[&str]) -> Row {
        let columns = columns
            .iter()
            .filter_map(|c| self.columns.get(*c).map(|v| (c.to_string(), v.clone())))
            .collect();
        Row { columns }
    }

    /// Overwrite this row's columns with the columns of `other`.
    pub fn merge(&mut self, other: Row) {
        self.columns.extend(other.columns);
    }

    pub fn has_commit_timestamp(&self) -> bool {
        self.columns.values().any(Value::is_commit_timestamp)
    }

    /// Names of the columns still holding the commit timestamp placeholder.
    pub fn commit_timestamp_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, v)| v.is_commit_timestamp())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Replace every commit timestamp placeholder with `committed_at`.
    pub fn resolve_commit_timestamp(&mut self, committed_at: DateTime<Utc>) {
        for value in self.columns.values_mut() {
            if value.is_commit_timestamp() {
                *value = Value::Timestamp(committed_at);
            }
        }
    }

    /// Row as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Row from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Row, EncodingError> {
        let serde_json::Value::Object(map) = value else {
            return Err(EncodingError::TypeMismatch {
                column: "<row>".to_string(),
                expected: "object",
                actual: "non-object",
            });
        };
        let mut row = Row::new();
        for (column, value) in map {
            let value = Value::from_json(&column, value)?;
            row.columns.insert(column, value);
        }
        Ok(row)
    }

    fn required(&self, column: &str) -> Result<&Value, EncodingError> {
        self.columns
            .get(column)
            .ok_or_else(|| EncodingError::missing(column))
    }

    fn mismatch(column: &str, expected: &'static str, actual: &Value) -> EncodingError {
        EncodingError::TypeMismatch {
            column: column.to_string(),
            expected,
            actual: actual.type_name(),
        }
    }

    pub fn string(&self, column: &str) -> Result<&str, EncodingError> {
        match self.required(column)? {
            Value::String(s) => Ok(s),
            other => Err(Self::mismatch(column, "string", other)),
        }
    }

    pub fn int(&self, column: &str) -> Result<i64, EncodingError> {
        match self.required(column)? {
            Value::Int(i) => Ok(*i),
            other => Err(Self::mismatch(column, "int", other)),
        }
    }

    /// String array column. A null array reads as empty.
    pub fn strings(&self, column: &str) -> Result<Vec<String>, EncodingError> {
        match self.required(column)? {
            Value::StringArray(items) => Ok(items.clone()),
            Value::Null => Ok(Vec::new()),
            other => Err(Self::mismatch(column, "string array", other)),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, EncodingError> {
        match self.required(column)? {
            Value::Timestamp(ts) => Ok(*ts),
            Value::String(s) => parse_timestamp(column, s),
            other => Err(Self::mismatch(column, "timestamp", other)),
        }
    }

    /// Optional timestamp. Missing, null and unresolved commit timestamps are `None`.
    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>, EncodingError> {
        match self.columns.get(column) {
            None | Some(Value::Null) | Some(Value::CommitTimestamp) => Ok(None),
            Some(_) => self.timestamp(column).map(Some),
        }
    }
}

fn parse_timestamp(column: &str, s: &str) -> Result<DateTime<Utc>, EncodingError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EncodingError::InvalidField {
            field: "timestamp",
            reason: format!("column '{column}' holds '{s}': {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_typed_accessors() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let row = Row::new()
            .with("name", "gold")
            .with("count", 3_i64)
            .with("tags", vec!["a".to_string()])
            .with("at", ts);

        assert_eq!(row.string("name").unwrap(), "gold");
        assert_eq!(row.int("count").unwrap(), 3);
        assert_eq!(row.strings("tags").unwrap(), vec!["a".to_string()]);
        assert_eq!(row.timestamp("at").unwrap(), ts);
    }

    #[test]
    fn test_missing_and_mismatched_columns() {
        let row = Row::new().with("count", "three");

        assert_eq!(row.int("nope"), Err(EncodingError::missing("nope")));
        assert!(matches!(
            row.int("count"),
            Err(EncodingError::TypeMismatch {
                expected: "int",
                actual: "string",
                ..
            })
        ));
    }

    #[test]
    fn test_timestamp_from_string() {
        let row = Row::new().with("at", "2024-05-01T10:00:00Z");
        let ts = row.timestamp("at").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_commit_timestamp_resolution() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut row = Row::new()
            .with("committed_at", Value::CommitTimestamp)
            .with("id", "x");

        assert!(row.has_commit_timestamp());
        assert_eq!(row.commit_timestamp_columns(), vec!["committed_at"]);
        assert_eq!(row.opt_timestamp("committed_at").unwrap(), None);

        row.resolve_commit_timestamp(ts);
        assert!(!row.has_commit_timestamp());
        assert_eq!(row.opt_timestamp("committed_at").unwrap(), Some(ts));
    }

    #[test]
    fn test_json_conversion() {
        let row = Row::new()
            .with("id", "abc")
            .with("count", 7_i64)
            .with("favorites", vec!["ruby".to_string(), "dia".to_string()])
            .with("gone", Value::Null);

        let json = row.to_json();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["count"], 7);

        let back = Row::from_json(json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_project() {
        let row = Row::new().with("id", "a").with("author", "gold").with("count", 1_i64);
        let projected = row.project(&["id", "author", "absent"]);
        assert_eq!(projected.len(), 2);
        assert!(!projected.contains("count"));
    }
}
