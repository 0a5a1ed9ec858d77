//! Append-only operation log entries.
//!
//! An [`OperationLogEntry`] is written in the same atomic write set as the
//! mutation it describes and is never updated or deleted afterwards. It is
//! used for audit and idempotency inspection, never to serve reads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EncodingError;
use crate::record::{columns, TableRow};
use crate::value::{Row, Value};

/// Kind of mutation recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Insert,
    Update,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(OperationKind::Insert),
            "UPDATE" => Ok(OperationKind::Update),
            other => Err(EncodingError::invalid(
                "kind",
                format!("unknown operation kind '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationLogEntry {
    pub operation_id: String,
    pub kind: OperationKind,
    pub entity_id: String,
    pub table_name: String,
    /// Snapshot of the mutated row as it was submitted.
    pub payload: serde_json::Value,
}

impl OperationLogEntry {
    pub const OPERATION_ID: &'static str = "operation_id";
    pub const KIND: &'static str = "kind";
    pub const ENTITY_ID: &'static str = "entity_id";
    pub const TABLE_NAME: &'static str = "table_name";
    pub const PAYLOAD: &'static str = "payload";

    /// New entry with a fresh operation id.
    pub fn new(kind: OperationKind, entity_id: &str, table_name: &str, payload: &Row) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            kind,
            entity_id: entity_id.to_string(),
            table_name: table_name.to_string(),
            payload: payload.to_json(),
        }
    }
}

impl TableRow for OperationLogEntry {
    const ENTITY: &'static str = "OperationLogEntry";

    const COLUMNS: &'static [&'static str] = &[
        Self::OPERATION_ID,
        Self::KIND,
        Self::ENTITY_ID,
        Self::TABLE_NAME,
        Self::PAYLOAD,
        columns::COMMITTED_AT,
    ];

    fn to_row(&self) -> Result<Row, EncodingError> {
        let payload = serde_json::to_string(&self.payload)
            .map_err(|e| EncodingError::invalid("payload", e.to_string()))?;
        Ok(Row::new()
            .with(Self::OPERATION_ID, self.operation_id.as_str())
            .with(Self::KIND, self.kind.as_str())
            .with(Self::ENTITY_ID, self.entity_id.as_str())
            .with(Self::TABLE_NAME, self.table_name.as_str())
            .with(Self::PAYLOAD, payload)
            .with(columns::COMMITTED_AT, Value::CommitTimestamp))
    }

    fn from_row(row: &Row) -> Result<Self, EncodingError> {
        let payload = serde_json::from_str(row.string(Self::PAYLOAD)?)
            .map_err(|e| EncodingError::invalid("payload", e.to_string()))?;
        Ok(Self {
            operation_id: row.string(Self::OPERATION_ID)?.to_string(),
            kind: row.string(Self::KIND)?.parse()?,
            entity_id: row.string(Self::ENTITY_ID)?.to_string(),
            table_name: row.string(Self::TABLE_NAME)?.to_string(),
            payload,
        })
    }
}
