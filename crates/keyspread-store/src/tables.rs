//! Table names and store-wide limits.

pub const RECORD: &str = "Record";
pub const RECORD_COMPOSITE_KEY: &str = "RecordCompositeKey";
pub const RECORD_HASHED_KEY: &str = "RecordHashedKey";
pub const RECORD_UNIQUE_INDEX: &str = "RecordUniqueIndex";
/// Secondary index table: natural id to primary key of `RecordUniqueIndex`.
pub const RECORD_NATURAL_ID_INDEX: &str = "RecordNaturalIdIndex";
pub const OPERATION_LOG: &str = "OperationLog";
pub const RECORD_BENCHMARK: &str = "RecordBenchmark";

pub const MIRROR_PREFIX: &str = "RecordMirror";
pub const DEFAULT_MIRROR_COUNT: usize = 3;
/// Mirror table read as a fence by `RecordStore::update`.
pub const FENCE_TABLE: &str = "RecordMirror2";

/// Name of the ascending sort-weight index.
pub const SORT_INDEX: &str = "RecordSortAsc";

pub const MAX_BATCH_SIZE: usize = 1000;
pub const PROJECTION_LIMIT: usize = 10;
pub const LIST_LIMIT: usize = 50;
