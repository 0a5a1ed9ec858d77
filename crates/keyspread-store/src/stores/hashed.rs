use chrono::{DateTime, Utc};
use keyspread_core::{hashed_key, HashedKeyRecord, Record, StorageKey, TableRow};
use std::sync::Arc;

use super::check_batch;
use crate::error::StoreError;
use crate::mutation::Mutation;
use crate::tables::RECORD_HASHED_KEY;
use crate::traits::StoreClient;

/// Records keyed by `hash(natural id)`.
///
/// Two lookup paths: by the opaque key, and by natural id, which re-derives
/// the hash and then checks the stored id.
pub struct HashedKeyStore<S> {
    client: Arc<S>,
    table: String,
}

impl<S: StoreClient> HashedKeyStore<S> {
    pub fn new(client: Arc<S>) -> Self {
        Self {
            client,
            table: RECORD_HASHED_KEY.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn mutation(&self, record: &HashedKeyRecord) -> Result<Mutation, StoreError> {
        Ok(Mutation::insert(
            &self.table,
            StorageKey::single(record.key.as_str()),
            record.to_row()?,
        ))
    }

    /// Insert and return the stored form, which carries the opaque key and
    /// the commit timestamp.
    pub async fn insert(&self, record: Record) -> Result<(HashedKeyRecord, DateTime<Utc>), StoreError> {
        let mut hashed = HashedKeyRecord::new(record);
        let committed_at = self.client.apply(vec![self.mutation(&hashed)?]).await?;
        hashed.record.committed_at = Some(committed_at);
        Ok((hashed, committed_at))
    }

    pub async fn insert_many(&self, records: Vec<Record>) -> Result<usize, StoreError> {
        check_batch(records.len())?;
        let mutations = records
            .into_iter()
            .map(|r| self.mutation(&HashedKeyRecord::new(r)))
            .collect::<Result<Vec<_>, _>>()?;
        let count = mutations.len();
        self.client.apply(mutations).await?;
        Ok(count)
    }

    pub async fn get_by_key(&self, key: &str) -> Result<HashedKeyRecord, StoreError> {
        let row = self
            .client
            .read_row(&self.table, &StorageKey::single(key))
            .await?;
        Ok(HashedKeyRecord::from_row(&row)?)
    }

    pub async fn get_by_natural_id(&self, id: &str) -> Result<HashedKeyRecord, StoreError> {
        let key = hashed_key(id);
        let found = self.get_by_key(&key).await?;
        if found.natural_id() != id {
            return Err(StoreError::not_found(&self.table, id));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::stores::testing::record;

    #[tokio::test]
    async fn test_both_lookup_paths() {
        let store = HashedKeyStore::new(Arc::new(MemoryStore::new()));
        let (stored, _) = store.insert(record("h-1", "dia", 0)).await.unwrap();

        assert_ne!(stored.key, "h-1");
        assert_eq!(store.get_by_key(&stored.key).await.unwrap(), stored);
        assert_eq!(store.get_by_key(&stored.key).await.unwrap(), store.get_by_natural_id("h-1").await.unwrap());
        assert_eq!(store.get_by_natural_id("h-1").await.unwrap().record.author, "dia");
        assert!(store.get_by_natural_id("h-2").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_same_natural_id_collides() {
        let store = HashedKeyStore::new(Arc::new(MemoryStore::new()));
        store.insert(record("h-1", "dia", 0)).await.unwrap();
        let err = store.insert(record("h-1", "gold", 0)).await.unwrap_err();
        assert!(err.is_uniqueness_violation());
    }
}
