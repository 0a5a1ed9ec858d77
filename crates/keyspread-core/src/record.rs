//! The record entity and its static column mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::EncodingError;
use crate::value::{Row, Value};

/// Explicit mapping between an entity and its store row.
///
/// Every entity declares its columns up front; there is no reflection or
/// attribute-driven marshaling. `from_row` must accept rows written by
/// `to_row` after the store resolved commit timestamps.
pub trait TableRow: Sized {
    /// Entity name used in logs and errors.
    const ENTITY: &'static str;

    /// Columns written by `to_row`, in declaration order.
    const COLUMNS: &'static [&'static str];

    fn to_row(&self) -> Result<Row, EncodingError>;

    fn from_row(row: &Row) -> Result<Self, EncodingError>;
}

/// Column names shared by every record-shaped table.
pub mod columns {
    pub const ID: &str = "id";
    pub const AUTHOR: &str = "author";
    pub const CONTENT: &str = "content";
    pub const COUNT: &str = "count";
    pub const FAVORITES: &str = "favorites";
    pub const SORT_WEIGHT: &str = "sort_weight";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const COMMITTED_AT: &str = "committed_at";
    pub const KEY: &str = "key";
    pub const SHARD_CREATED_AT: &str = "shard_created_at";
}

/// A synthetic record.
///
/// `favorites` never holds duplicates and `id` is never empty; [`Record::validate`]
/// enforces both before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub author: String,
    pub content: String,
    pub count: i64,
    pub favorites: Vec<String>,
    pub sort_weight: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Assigned by the store at commit; always `None` on freshly generated records.
    pub committed_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn validate(&self) -> Result<(), EncodingError> {
        if self.id.is_empty() {
            return Err(EncodingError::invalid("id", "must not be empty"));
        }
        let mut seen = HashSet::with_capacity(self.favorites.len());
        for favorite in &self.favorites {
            if !seen.insert(favorite.as_str()) {
                return Err(EncodingError::invalid(
                    "favorites",
                    format!("duplicate entry '{favorite}'"),
                ));
            }
        }
        Ok(())
    }
}

impl TableRow for Record {
    const ENTITY: &'static str = "Record";

    const COLUMNS: &'static [&'static str] = &[
        columns::ID,
        columns::AUTHOR,
        columns::CONTENT,
        columns::COUNT,
        columns::FAVORITES,
        columns::SORT_WEIGHT,
        columns::CREATED_AT,
        columns::UPDATED_AT,
        columns::COMMITTED_AT,
    ];

    fn to_row(&self) -> Result<Row, EncodingError> {
        self.validate()?;
        Ok(Row::new()
            .with(columns::ID, self.id.as_str())
            .with(columns::AUTHOR, self.author.as_str())
            .with(columns::CONTENT, self.content.as_str())
            .with(columns::COUNT, self.count)
            .with(columns::FAVORITES, self.favorites.clone())
            .with(columns::SORT_WEIGHT, self.sort_weight)
            .with(columns::CREATED_AT, self.created_at)
            .with(columns::UPDATED_AT, self.updated_at)
            .with(columns::COMMITTED_AT, Value::CommitTimestamp))
    }

    fn from_row(row: &Row) -> Result<Self, EncodingError> {
        Ok(Self {
            id: row.string(columns::ID)?.to_string(),
            author: row.string(columns::AUTHOR)?.to_string(),
            content: row.string(columns::CONTENT)?.to_string(),
            count: row.int(columns::COUNT)?,
            favorites: row.strings(columns::FAVORITES)?,
            sort_weight: row.int(columns::SORT_WEIGHT)?,
            created_at: row.timestamp(columns::CREATED_AT)?,
            updated_at: row.timestamp(columns::UPDATED_AT)?,
            committed_at: row.opt_timestamp(columns::COMMITTED_AT)?,
        })
    }
}

/// Id and author pair returned by the projection query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedRecord {
    pub id: String,
    pub author: String,
}

impl ProjectedRecord {
    pub const COLUMNS: &'static [&'static str] = &[columns::ID, columns::AUTHOR];

    pub fn from_row(row: &Row) -> Result<Self, EncodingError> {
        Ok(Self {
            id: row.string(columns::ID)?.to_string(),
            author: row.string(columns::AUTHOR)?.to_string(),
        })
    }
}

/// Bucket id derived from the generation timestamp.
///
/// Only used to correlate write distribution with time after the fact; it
/// never influences key placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardTag(pub u32);

impl ShardTag {
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ShardTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// A record written by the batch benchmark, tagged with its shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkRecord {
    pub record: Record,
    pub shard: ShardTag,
}

impl TableRow for BenchmarkRecord {
    const ENTITY: &'static str = "BenchmarkRecord";

    const COLUMNS: &'static [&'static str] = &[
        columns::ID,
        columns::AUTHOR,
        columns::CONTENT,
        columns::COUNT,
        columns::FAVORITES,
        columns::SORT_WEIGHT,
        columns::CREATED_AT,
        columns::UPDATED_AT,
        columns::COMMITTED_AT,
        columns::SHARD_CREATED_AT,
    ];

    fn to_row(&self) -> Result<Row, EncodingError> {
        Ok(self
            .record
            .to_row()?
            .with(columns::SHARD_CREATED_AT, i64::from(self.shard.0)))
    }

    fn from_row(row: &Row) -> Result<Self, EncodingError> {
        let shard = row.int(columns::SHARD_CREATED_AT)?;
        let shard = u32::try_from(shard)
            .map_err(|_| EncodingError::invalid("shard_created_at", format!("{shard} out of range")))?;
        Ok(Self {
            record: Record::from_row(row)?,
            shard: ShardTag(shard),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_record;
    use chrono::TimeZone;

    #[test]
    fn test_record_row_mapping() {
        let record = sample_record("r-1", "gold");
        let row = record.to_row().unwrap();

        for column in Record::COLUMNS {
            assert!(row.contains(column), "missing column {column}");
        }
        assert_eq!(row.get(columns::COMMITTED_AT), Some(&Value::CommitTimestamp));

        let back = Record::from_row(&row).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_rejects_empty_id() {
        let record = sample_record("", "gold");
        assert!(matches!(
            record.to_row(),
            Err(EncodingError::InvalidField { field: "id", .. })
        ));
    }

    #[test]
    fn test_record_rejects_duplicate_favorites() {
        let mut record = sample_record("r-2", "dia");
        record.favorites = vec!["ruby".to_string(), "ruby".to_string()];
        assert!(matches!(
            record.to_row(),
            Err(EncodingError::InvalidField {
                field: "favorites",
                ..
            })
        ));
    }

    #[test]
    fn test_committed_at_read_back_after_resolution() {
        let record = sample_record("r-3", "silver");
        let mut row = record.to_row().unwrap();
        let committed = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap();
        row.resolve_commit_timestamp(committed);

        let back = Record::from_row(&row).unwrap();
        assert_eq!(back.committed_at, Some(committed));
    }

    #[test]
    fn test_benchmark_record_mapping() {
        let benchmark = BenchmarkRecord {
            record: sample_record("b-1", "ruby"),
            shard: ShardTag(7),
        };
        let row = benchmark.to_row().unwrap();
        assert_eq!(row.int(columns::SHARD_CREATED_AT).unwrap(), 7);
        assert_eq!(BenchmarkRecord::from_row(&row).unwrap(), benchmark);
    }

    #[test]
    fn test_projected_record_from_partial_row() {
        let row = Row::new().with(columns::ID, "p-1").with(columns::AUTHOR, "gold");
        let projected = ProjectedRecord::from_row(&row).unwrap();
        assert_eq!(projected.id, "p-1");
        assert_eq!(projected.author, "gold");
    }
}
