//! Atomic multi-table write sets.
//!
//! When the primary key stops carrying meaning, the guarantees it gave for
//! free (uniqueness of the natural id, an audit trail, denormalized copies)
//! have to be written explicitly. [`DualWriteCoordinator`] builds the single
//! write set holding the primary row and all of its derived rows, so the
//! store commits them together or not at all.

use keyspread_core::{
    EncodingError, OperationKind, OperationLogEntry, Row, StorageKey, TableRow,
};

use crate::mutation::Mutation;

/// The row the write set is about.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryWrite {
    pub table: String,
    pub key: StorageKey,
    pub row: Row,
    /// Natural id recorded in the operation log.
    pub entity_id: String,
}

/// Secondary unique-index row written with the primary row.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexWrite {
    pub table: String,
    pub key: StorageKey,
    pub row: Row,
}

/// A planned atomic write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSet {
    pub mutations: Vec<Mutation>,
    /// Id of the operation log entry, when one was attached.
    pub operation_id: Option<String>,
}

impl WriteSet {
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn tables(&self) -> Vec<&str> {
        self.mutations.iter().map(Mutation::table).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DualWriteCoordinator {
    operation_log: Option<String>,
    mirrors: Vec<String>,
}

impl DualWriteCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an operation log entry, written to `table`.
    pub fn with_operation_log(mut self, table: &str) -> Self {
        self.operation_log = Some(table.to_string());
        self
    }

    /// Copy the primary row into each of these tables.
    pub fn with_mirror_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mirrors = tables.into_iter().map(Into::into).collect();
        self
    }

    /// `prefix1` through `prefixN`.
    pub fn mirror_table_names(prefix: &str, count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("{prefix}{i}")).collect()
    }

    pub fn operation_log(&self) -> Option<&str> {
        self.operation_log.as_deref()
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// Log entry insert for a mutation of `entity_id` in `table`.
    pub fn log_mutation(
        &self,
        kind: OperationKind,
        entity_id: &str,
        table: &str,
        payload: &Row,
    ) -> Result<Option<(String, Mutation)>, EncodingError> {
        let Some(log_table) = &self.operation_log else {
            return Ok(None);
        };
        let entry = OperationLogEntry::new(kind, entity_id, table, payload);
        let key = StorageKey::single(entry.operation_id.as_str());
        let mutation = Mutation::insert(log_table, key, entry.to_row()?);
        Ok(Some((entry.operation_id, mutation)))
    }

    /// Plan an insert: primary row, index row, log entry, then mirrors.
    pub fn plan_insert(
        &self,
        primary: PrimaryWrite,
        index: Option<IndexWrite>,
    ) -> Result<WriteSet, EncodingError> {
        let mut mutations = Vec::with_capacity(2 + self.mirrors.len() + usize::from(index.is_some()));
        let logged =
            self.log_mutation(OperationKind::Insert, &primary.entity_id, &primary.table, &primary.row)?;

        let mirrors: Vec<Mutation> = self
            .mirrors
            .iter()
            .map(|table| Mutation::insert(table, primary.key.clone(), primary.row.clone()))
            .collect();

        mutations.push(Mutation::insert(&primary.table, primary.key, primary.row));
        if let Some(index) = index {
            mutations.push(Mutation::insert(&index.table, index.key, index.row));
        }
        let operation_id = logged.map(|(id, mutation)| {
            mutations.push(mutation);
            id
        });
        mutations.extend(mirrors);

        Ok(WriteSet {
            mutations,
            operation_id,
        })
    }
}
