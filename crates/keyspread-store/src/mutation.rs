//! Mutations, scan orders and read-modify-write requests.

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use keyspread_core::{OperationKind, Row, StorageKey};

use crate::error::StoreError;

/// One row mutation inside an atomic write set.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create a row. Fails with a uniqueness violation if the key exists.
    Insert {
        table: String,
        key: StorageKey,
        row: Row,
    },
    /// Overwrite columns of an existing row. Fails with not found if absent.
    Update {
        table: String,
        key: StorageKey,
        row: Row,
    },
}

impl Mutation {
    pub fn insert(table: &str, key: StorageKey, row: Row) -> Self {
        Mutation::Insert {
            table: table.to_string(),
            key,
            row,
        }
    }

    pub fn update(table: &str, key: StorageKey, row: Row) -> Self {
        Mutation::Update {
            table: table.to_string(),
            key,
            row,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Mutation::Insert { table, .. } | Mutation::Update { table, .. } => table,
        }
    }

    pub fn key(&self) -> &StorageKey {
        match self {
            Mutation::Insert { key, .. } | Mutation::Update { key, .. } => key,
        }
    }

    pub fn row(&self) -> &Row {
        match self {
            Mutation::Insert { row, .. } | Mutation::Update { row, .. } => row,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Insert { .. } => OperationKind::Insert,
            Mutation::Update { .. } => OperationKind::Update,
        }
    }
}

/// Order in which a scan returns rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderIndex {
    PrimaryKey,
    /// Ascending by one column, ties broken by primary key.
    Ascending { name: String, column: String },
}

impl OrderIndex {
    pub fn ascending(name: &str, column: &str) -> Self {
        OrderIndex::Ascending {
            name: name.to_string(),
            column: column.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OrderIndex::PrimaryKey => "PRIMARY_KEY",
            OrderIndex::Ascending { name, .. } => name,
        }
    }
}

/// A row that must exist for a read-modify-write to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFence {
    pub table: String,
    pub key: StorageKey,
}

impl ReadFence {
    pub fn new(table: &str, key: StorageKey) -> Self {
        Self {
            table: table.to_string(),
            key,
        }
    }
}

/// Serializable counter increment.
///
/// Inside one transaction the store reads every fence row, reads the target
/// row's counter, writes `counter + 1` together with `set` (commit timestamp
/// placeholders resolved), and inserts every row in `append`. A missing
/// fence or target row aborts the whole unit with not found.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterUpdate {
    pub table: String,
    pub key: StorageKey,
    pub counter_column: String,
    pub fences: Vec<ReadFence>,
    pub set: Row,
    pub append: Vec<Mutation>,
}

impl CounterUpdate {
    pub fn new(table: &str, key: StorageKey, counter_column: &str) -> Self {
        Self {
            table: table.to_string(),
            key,
            counter_column: counter_column.to_string(),
            fences: Vec::new(),
            set: Row::new(),
            append: Vec::new(),
        }
    }

    pub fn with_fence(mut self, fence: ReadFence) -> Self {
        self.fences.push(fence);
        self
    }

    pub fn with_set(mut self, set: Row) -> Self {
        self.set = set;
        self
    }

    pub fn with_append(mut self, mutation: Mutation) -> Self {
        self.append.push(mutation);
        self
    }
}

/// Result of a committed counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterOutcome {
    pub value: i64,
    pub committed_at: DateTime<Utc>,
}

/// Lazily produced rows of a scan.
pub type RowStream = BoxStream<'static, Result<Row, StoreError>>;
