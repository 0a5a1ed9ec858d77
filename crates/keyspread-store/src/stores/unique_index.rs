use chrono::{DateTime, Utc};
use keyspread_core::{KeyStrategy, Record, StorageKey, TableRow, UniqueIndexEntry, UniqueIndexRecord};
use std::sync::Arc;
use tracing::debug;

use crate::dual_write::{DualWriteCoordinator, IndexWrite, PrimaryWrite};
use crate::error::StoreError;
use crate::tables::{RECORD_NATURAL_ID_INDEX, RECORD_UNIQUE_INDEX};
use crate::traits::StoreClient;

/// Records under a random primary key, plus a natural-id index table.
///
/// The primary row and its index row commit together. A second insert for
/// the same natural id collides on the index row and fails with a
/// uniqueness violation, leaving no orphan primary row behind.
pub struct UniqueIndexStore<S> {
    client: Arc<S>,
    table: String,
    index_table: String,
    coordinator: DualWriteCoordinator,
}

impl<S: StoreClient> UniqueIndexStore<S> {
    pub fn new(client: Arc<S>) -> Self {
        Self {
            client,
            table: RECORD_UNIQUE_INDEX.to_string(),
            index_table: RECORD_NATURAL_ID_INDEX.to_string(),
            coordinator: DualWriteCoordinator::new(),
        }
    }

    pub fn with_coordinator(mut self, coordinator: DualWriteCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn index_table(&self) -> &str {
        &self.index_table
    }

    /// Insert and return the stored form as a lookup would read it back.
    pub async fn insert(&self, record: Record) -> Result<(UniqueIndexRecord, DateTime<Utc>), StoreError> {
        let keys = KeyStrategy::DecoupledWithUniqueIndex.derive(&record)?;
        let natural_key = keys
            .secondary
            .unwrap_or_else(|| StorageKey::single(record.id.as_str()));
        let primary_key = keys.primary.encoded();

        let entry = UniqueIndexEntry {
            natural_id: record.id.clone(),
            primary_key: primary_key.clone(),
        };
        let mut stored = UniqueIndexRecord {
            primary_key,
            record,
        };

        let primary = PrimaryWrite {
            table: self.table.clone(),
            key: keys.primary,
            row: stored.to_row()?,
            entity_id: stored.record.id.clone(),
        };
        let index = IndexWrite {
            table: self.index_table.clone(),
            key: natural_key,
            row: entry.to_row()?,
        };
        let plan = self.coordinator.plan_insert(primary, Some(index))?;
        let committed_at = self.client.apply(plan.mutations).await?;
        stored.record.committed_at = Some(committed_at);
        debug!("Indexed {} under {}", stored.record.id, stored.primary_key);
        Ok((stored, committed_at))
    }

    pub async fn get_by_primary_key(&self, primary_key: &str) -> Result<UniqueIndexRecord, StoreError> {
        let row = self
            .client
            .read_row(&self.table, &StorageKey::single(primary_key))
            .await?;
        Ok(UniqueIndexRecord::from_row(&row)?)
    }

    pub async fn index_entry(&self, natural_id: &str) -> Result<UniqueIndexEntry, StoreError> {
        let row = self
            .client
            .read_row(&self.index_table, &StorageKey::single(natural_id))
            .await?;
        Ok(UniqueIndexEntry::from_row(&row)?)
    }

    /// Two reads: the index row, then the primary row it points at.
    pub async fn get_by_natural_id(&self, natural_id: &str) -> Result<UniqueIndexRecord, StoreError> {
        let entry = self.index_entry(natural_id).await?;
        self.get_by_primary_key(&entry.primary_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::stores::testing::record;

    #[tokio::test]
    async fn test_two_hop_lookup() {
        let store = UniqueIndexStore::new(Arc::new(MemoryStore::new()));
        let (stored, _) = store.insert(record("n-1", "gold", 0)).await.unwrap();

        assert_ne!(stored.primary_key, "n-1");
        let by_natural = store.get_by_natural_id("n-1").await.unwrap();
        assert_eq!(by_natural, stored);
        assert_eq!(store.get_by_primary_key(&stored.primary_key).await.unwrap(), stored);
        assert!(store.get_by_natural_id("n-2").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_natural_id_rejected() {
        let client = Arc::new(MemoryStore::new());
        let store = UniqueIndexStore::new(Arc::clone(&client));

        let first = store.insert(record("n-1", "gold", 0)).await;
        let second = store.insert(record("n-1", "ruby", 0)).await;

        let first = first.unwrap().0;
        assert!(second.unwrap_err().is_uniqueness_violation());
        assert_eq!(client.row_count(RECORD_NATURAL_ID_INDEX), 1);
        assert_eq!(client.row_count(RECORD_UNIQUE_INDEX), 1);
        assert_eq!(store.get_by_natural_id("n-1").await.unwrap(), first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_index_row_per_natural_id_under_concurrency() {
        let client = Arc::new(MemoryStore::new());
        let store = Arc::new(UniqueIndexStore::new(Arc::clone(&client)));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = format!("n-{}", i % 4);
                tokio::spawn(async move { store.insert(record(&id, "dia", 0)).await })
            })
            .collect();

        let mut ok = 0;
        let mut violations = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) if e.is_uniqueness_violation() => violations += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, violations), (4, 12));
        assert_eq!(client.row_count(RECORD_NATURAL_ID_INDEX), 4);
        assert_eq!(client.row_count(RECORD_UNIQUE_INDEX), 4);
    }
}
