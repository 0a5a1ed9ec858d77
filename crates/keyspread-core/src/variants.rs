//! Record variants whose storage key is not the natural id.

use crate::error::EncodingError;
use crate::key::hashed_key;
use crate::record::{columns, Record, TableRow};
use crate::value::Row;

/// A record stored under `hash(natural id)`.
///
/// The natural id stays in the `id` column so the row can still be found
/// and understood by business meaning; the opaque hash lives in `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedKeyRecord {
    pub key: String,
    pub record: Record,
}

impl HashedKeyRecord {
    pub fn new(record: Record) -> Self {
        Self {
            key: hashed_key(&record.id),
            record,
        }
    }

    pub fn natural_id(&self) -> &str {
        &self.record.id
    }
}

impl TableRow for HashedKeyRecord {
    const ENTITY: &'static str = "HashedKeyRecord";

    const COLUMNS: &'static [&'static str] = &[
        columns::KEY,
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
        if self.key.is_empty() {
            return Err(EncodingError::invalid("key", "must not be empty"));
        }
        Ok(self.record.to_row()?.with(columns::KEY, self.key.as_str()))
    }

    fn from_row(row: &Row) -> Result<Self, EncodingError> {
        Ok(Self {
            key: row.string(columns::KEY)?.to_string(),
            record: Record::from_row(row)?,
        })
    }
}

/// A record stored under a store-generated primary key.
///
/// `record.id` is the natural business id; it is only reachable through the
/// companion [`UniqueIndexEntry`] row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndexRecord {
    pub primary_key: String,
    pub record: Record,
}

impl TableRow for UniqueIndexRecord {
    const ENTITY: &'static str = "UniqueIndexRecord";

    const COLUMNS: &'static [&'static str] = HashedKeyRecord::COLUMNS;

    fn to_row(&self) -> Result<Row, EncodingError> {
        if self.primary_key.is_empty() {
            return Err(EncodingError::invalid("key", "must not be empty"));
        }
        Ok(self
            .record
            .to_row()?
            .with(columns::KEY, self.primary_key.as_str()))
    }

    fn from_row(row: &Row) -> Result<Self, EncodingError> {
        Ok(Self {
            primary_key: row.string(columns::KEY)?.to_string(),
            record: Record::from_row(row)?,
        })
    }
}

/// Secondary index row: natural id to primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndexEntry {
    pub natural_id: String,
    pub primary_key: String,
}

impl UniqueIndexEntry {
    pub const NATURAL_ID: &'static str = "natural_id";
    pub const PRIMARY_KEY: &'static str = "primary_key";
}

impl TableRow for UniqueIndexEntry {
    const ENTITY: &'static str = "UniqueIndexEntry";

    const COLUMNS: &'static [&'static str] = &[Self::NATURAL_ID, Self::PRIMARY_KEY];

    fn to_row(&self) -> Result<Row, EncodingError> {
        if self.natural_id.is_empty() {
            return Err(EncodingError::invalid("natural_id", "must not be empty"));
        }
        Ok(Row::new()
            .with(Self::NATURAL_ID, self.natural_id.as_str())
            .with(Self::PRIMARY_KEY, self.primary_key.as_str()))
    }

    fn from_row(row: &Row) -> Result<Self, EncodingError> {
        Ok(Self {
            natural_id: row.string(Self::NATURAL_ID)?.to_string(),
            primary_key: row.string(Self::PRIMARY_KEY)?.to_string(),
        })
    }
}
