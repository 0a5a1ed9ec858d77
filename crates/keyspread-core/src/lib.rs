//! Core types for keyspread.
//!
//! This crate holds everything that is pure data or pure computation:
//!
//! - the record entities and their explicit column mappings ([`TableRow`]),
//! - the column value model ([`Value`], [`Row`]),
//! - storage keys and the four key-layout strategies ([`KeyStrategy`]),
//! - key-space distribution analysis used to detect write hotspots.
//!
//! Nothing in here talks to a store. The store contract lives in
//! `keyspread-store`, and the generators live in `keyspread-generator`.

pub mod distribution;
pub mod error;
pub mod key;
pub mod oplog;
pub mod record;
pub mod value;
pub mod variants;

#[cfg(test)]
mod testing;

pub use distribution::{chi_square, KeyRanges, RangeHistogram};
pub use error::EncodingError;
pub use key::{hashed_key, DerivedKeys, KeyStrategy, StorageKey};
pub use oplog::{OperationKind, OperationLogEntry};
pub use record::{BenchmarkRecord, ProjectedRecord, Record, ShardTag, TableRow};
pub use value::{Row, Value};
pub use variants::{HashedKeyRecord, UniqueIndexEntry, UniqueIndexRecord};
