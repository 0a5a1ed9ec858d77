//! Named tasks and the selector that enables them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// One independent write or query loop the driver can run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TaskKind {
    /// Insert records keyed by natural id.
    InsertRecord,
    /// Insert records keyed by `(author, id)`.
    InsertCompositeKey,
    /// Insert records keyed by the hash of their natural id.
    InsertHashedKey,
    /// Insert records under a random key plus a unique index row.
    InsertUniqueIndex,
    /// Repeatedly list records in ascending sort weight.
    ListRecords,
    /// Repeatedly run the (id, author) projection.
    ListProjection,
    /// Insert a fixed number of benchmark records in batches.
    InsertBenchmarkBatch,
    /// Insert records together with their log entry and mirror rows.
    InsertAuditedRecord,
    /// Audited insert followed by transactional counter updates.
    UpdateRecordCounter,
}

impl TaskKind {
    pub const ALL: [TaskKind; 9] = [
        TaskKind::InsertRecord,
        TaskKind::InsertCompositeKey,
        TaskKind::InsertHashedKey,
        TaskKind::InsertUniqueIndex,
        TaskKind::ListRecords,
        TaskKind::ListProjection,
        TaskKind::InsertBenchmarkBatch,
        TaskKind::InsertAuditedRecord,
        TaskKind::UpdateRecordCounter,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::InsertRecord => "InsertRecord",
            TaskKind::InsertCompositeKey => "InsertCompositeKey",
            TaskKind::InsertHashedKey => "InsertHashedKey",
            TaskKind::InsertUniqueIndex => "InsertUniqueIndex",
            TaskKind::ListRecords => "ListRecords",
            TaskKind::ListProjection => "ListProjection",
            TaskKind::InsertBenchmarkBatch => "InsertBenchmarkBatch",
            TaskKind::InsertAuditedRecord => "InsertAuditedRecord",
            TaskKind::UpdateRecordCounter => "UpdateRecordCounter",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TaskKind::InsertRecord => "insert records keyed by natural id",
            TaskKind::InsertCompositeKey => "insert records keyed by (author, id)",
            TaskKind::InsertHashedKey => "insert records keyed by hash(id)",
            TaskKind::InsertUniqueIndex => "insert under a random key with a unique index row",
            TaskKind::ListRecords => "list records by ascending sort weight",
            TaskKind::ListProjection => "query the (id, author) projection",
            TaskKind::InsertBenchmarkBatch => "insert a fixed count of records in batches",
            TaskKind::InsertAuditedRecord => "insert with operation log and mirror rows",
            TaskKind::UpdateRecordCounter => "audited insert then transactional updates",
        }
    }

    /// Whether the task ends on its own. Every other task loops until cancelled.
    pub fn is_finite(&self) -> bool {
        matches!(self, TaskKind::InsertBenchmarkBatch)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownTask(s.to_string()))
    }
}

/// Which tasks a run enables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSelector {
    enabled: BTreeSet<TaskKind>,
}

impl WorkSelector {
    pub fn all() -> Self {
        Self {
            enabled: TaskKind::ALL.into_iter().collect(),
        }
    }

    pub fn only<I: IntoIterator<Item = TaskKind>>(tasks: I) -> Self {
        let enabled: BTreeSet<TaskKind> = tasks.into_iter().collect();
        if enabled.is_empty() {
            return Self::all();
        }
        Self { enabled }
    }

    /// Selector from task names. Blank names are ignored and an empty
    /// selection enables every task.
    pub fn from_names<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tasks = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .map(|name| name.parse::<TaskKind>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::only(tasks))
    }

    /// Selector from a comma separated list such as `InsertRecord,ListRecords`.
    pub fn parse_list(list: &str) -> Result<Self, ConfigError> {
        Self::from_names(list.split(','))
    }

    pub fn is_enabled(&self, task: TaskKind) -> bool {
        self.enabled.contains(&task)
    }

    /// Enabled tasks in declaration order.
    pub fn enabled(&self) -> Vec<TaskKind> {
        self.enabled.iter().copied().collect()
    }
}

impl Default for WorkSelector {
    fn default() -> Self {
        Self::all()
    }
}
