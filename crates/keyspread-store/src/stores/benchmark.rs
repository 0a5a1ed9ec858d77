use chrono::{DateTime, Utc};
use keyspread_core::{BenchmarkRecord, KeyStrategy, StorageKey, TableRow};
use std::sync::Arc;

use super::check_batch;
use crate::error::StoreError;
use crate::mutation::Mutation;
use crate::tables::RECORD_BENCHMARK;
use crate::traits::StoreClient;

/// Batched writer for benchmark records, into a configurable table.
pub struct BenchmarkStore<S> {
    client: Arc<S>,
    table: String,
}

impl<S: StoreClient> BenchmarkStore<S> {
    pub fn new(client: Arc<S>) -> Self {
        Self::with_table(client, RECORD_BENCHMARK)
    }

    pub fn with_table(client: Arc<S>, table: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Write one batch in a single commit. Batches over the maximum are
    /// rejected whole; splitting is the caller's job.
    pub async fn insert_many(&self, records: &[BenchmarkRecord]) -> Result<usize, StoreError> {
        check_batch(records.len())?;
        let mutations = records
            .iter()
            .map(|r| -> Result<Mutation, StoreError> {
                let key = KeyStrategy::Natural.derive(&r.record)?.primary;
                Ok(Mutation::insert(&self.table, key, r.to_row()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.client.apply(mutations).await?;
        Ok(records.len())
    }

    pub async fn get(&self, id: &str) -> Result<(BenchmarkRecord, Option<DateTime<Utc>>), StoreError> {
        let row = self
            .client
            .read_row(&self.table, &StorageKey::single(id))
            .await?;
        let record = BenchmarkRecord::from_row(&row)?;
        let committed_at = record.record.committed_at;
        Ok((record, committed_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::stores::testing::record;
    use keyspread_core::ShardTag;

    #[tokio::test]
    async fn test_custom_table_and_shard_column() {
        let client = Arc::new(MemoryStore::new());
        let store = BenchmarkStore::with_table(Arc::clone(&client), "Bench");
        let batch: Vec<BenchmarkRecord> = (0..5)
            .map(|i| BenchmarkRecord {
                record: record(&format!("b-{i}"), "gold", i),
                shard: ShardTag(i as u32),
            })
            .collect();

        assert_eq!(store.insert_many(&batch).await.unwrap(), 5);
        assert_eq!(client.row_count("Bench"), 5);

        let (read, committed_at) = store.get("b-3").await.unwrap();
        assert_eq!(read.shard, ShardTag(3));
        assert!(committed_at.is_some());
    }

    #[tokio::test]
    async fn test_oversized_batch_writes_nothing() {
        let client = Arc::new(MemoryStore::new());
        let store = BenchmarkStore::new(Arc::clone(&client));
        let batch: Vec<BenchmarkRecord> = (0..1001)
            .map(|i| BenchmarkRecord {
                record: record(&format!("b-{i}"), "gold", i),
                shard: ShardTag(0),
            })
            .collect();

        assert!(matches!(
            store.insert_many(&batch).await,
            Err(StoreError::BatchTooLarge { .. })
        ));
        assert_eq!(client.row_count(RECORD_BENCHMARK), 0);
    }
}
