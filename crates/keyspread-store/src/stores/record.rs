use chrono::{DateTime, Utc};
use keyspread_core::{
    record::columns, KeyStrategy, OperationKind, ProjectedRecord, Record, Row, StorageKey,
    TableRow, Value,
};
use std::sync::Arc;
use tracing::debug;

use super::{check_batch, take_rows};
use crate::dual_write::{DualWriteCoordinator, PrimaryWrite};
use crate::error::StoreError;
use crate::mutation::{CounterOutcome, CounterUpdate, Mutation, OrderIndex, ReadFence};
use crate::tables::{
    DEFAULT_MIRROR_COUNT, FENCE_TABLE, MIRROR_PREFIX, OPERATION_LOG, PROJECTION_LIMIT, RECORD,
    SORT_INDEX,
};
use crate::traits::StoreClient;

/// Records keyed by natural id.
///
/// Also owns the audited write path: `insert_audited` writes the record,
/// an operation log entry and the mirror rows in one commit, and `update`
/// fences on one of those mirrors.
pub struct RecordStore<S> {
    client: Arc<S>,
    table: String,
    coordinator: DualWriteCoordinator,
    list_index: OrderIndex,
    projection_limit: usize,
    fence_table: Option<String>,
}

impl<S: StoreClient> RecordStore<S> {
    pub fn new(client: Arc<S>) -> Self {
        Self {
            client,
            table: RECORD.to_string(),
            coordinator: DualWriteCoordinator::new()
                .with_operation_log(OPERATION_LOG)
                .with_mirror_tables(DualWriteCoordinator::mirror_table_names(
                    MIRROR_PREFIX,
                    DEFAULT_MIRROR_COUNT,
                )),
            list_index: OrderIndex::ascending(SORT_INDEX, columns::SORT_WEIGHT),
            projection_limit: PROJECTION_LIMIT,
            fence_table: Some(FENCE_TABLE.to_string()),
        }
    }

    pub fn with_coordinator(mut self, coordinator: DualWriteCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_list_index(mut self, index: OrderIndex) -> Self {
        self.list_index = index;
        self
    }

    pub fn with_projection_limit(mut self, limit: usize) -> Self {
        self.projection_limit = limit;
        self
    }

    /// Table read as a fence by `update`. `None` disables the fence.
    pub fn with_fence_table(mut self, table: Option<&str>) -> Self {
        self.fence_table = table.map(str::to_string);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn coordinator(&self) -> &DualWriteCoordinator {
        &self.coordinator
    }

    fn key_of(record: &Record) -> Result<StorageKey, StoreError> {
        Ok(KeyStrategy::Natural.derive(record)?.primary)
    }

    pub async fn insert(&self, record: &Record) -> Result<DateTime<Utc>, StoreError> {
        let mutation = Mutation::insert(&self.table, Self::key_of(record)?, record.to_row()?);
        self.client.apply(vec![mutation]).await
    }

    /// Insert up to [`crate::tables::MAX_BATCH_SIZE`] records in one commit.
    pub async fn insert_many(&self, records: &[Record]) -> Result<usize, StoreError> {
        check_batch(records.len())?;
        let mutations = records
            .iter()
            .map(|r| -> Result<Mutation, StoreError> {
                Ok(Mutation::insert(&self.table, Self::key_of(r)?, r.to_row()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.client.apply(mutations).await?;
        Ok(records.len())
    }

    pub async fn get(&self, id: &str) -> Result<Record, StoreError> {
        let row = self
            .client
            .read_row(&self.table, &StorageKey::single(id))
            .await?;
        Ok(Record::from_row(&row)?)
    }

    /// Up to `limit` records in list-index order.
    pub async fn query(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let stream = self.client.scan(&self.table, &self.list_index).await?;
        let rows = take_rows(stream, limit).await?;
        debug!("Listed {} rows from {} via {}", rows.len(), self.table, self.list_index.name());
        rows.iter()
            .map(|row| Record::from_row(row).map_err(StoreError::from))
            .collect()
    }

    /// Store-side (id, author) projection.
    pub async fn query_projection(&self) -> Result<Vec<ProjectedRecord>, StoreError> {
        let rows = self
            .client
            .project(&self.table, ProjectedRecord::COLUMNS, self.projection_limit)
            .await?;
        rows.iter()
            .map(|row| ProjectedRecord::from_row(row).map_err(StoreError::from))
            .collect()
    }

    /// Insert with the operation log entry and mirror rows in one commit.
    pub async fn insert_audited(&self, record: &Record) -> Result<DateTime<Utc>, StoreError> {
        let primary = PrimaryWrite {
            table: self.table.clone(),
            key: Self::key_of(record)?,
            row: record.to_row()?,
            entity_id: record.id.clone(),
        };
        let plan = self.coordinator.plan_insert(primary, None)?;
        debug!("Audited insert of {} touches {} rows", record.id, plan.len());
        self.client.apply(plan.mutations).await
    }

    /// Transactionally increment `count` of record `id`.
    ///
    /// Reads the fence row first, so the update fails with not found unless
    /// the record went through `insert_audited`.
    pub async fn update(&self, id: &str) -> Result<CounterOutcome, StoreError> {
        let key = StorageKey::single(id);
        let set = Row::new()
            .with(columns::UPDATED_AT, Utc::now())
            .with(columns::COMMITTED_AT, Value::CommitTimestamp);

        let mut update = CounterUpdate::new(&self.table, key.clone(), columns::COUNT);
        if let Some(fence) = &self.fence_table {
            update = update.with_fence(ReadFence::new(fence, key));
        }
        if let Some((_, log)) =
            self.coordinator
                .log_mutation(OperationKind::Update, id, &self.table, &set)?
        {
            update = update.with_append(log);
        }
        self.client.read_modify_write(update.with_set(set)).await
    }
}
