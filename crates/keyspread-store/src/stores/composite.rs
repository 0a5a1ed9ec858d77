use chrono::{DateTime, Utc};
use futures::StreamExt;
use keyspread_core::{record::columns, KeyStrategy, Record, StorageKey, TableRow};
use std::sync::Arc;

use super::check_batch;
use crate::error::StoreError;
use crate::mutation::{Mutation, OrderIndex};
use crate::tables::RECORD_COMPOSITE_KEY;
use crate::traits::StoreClient;

/// Records keyed by `(author, id)`.
///
/// Writes spread over the author space, but each author's rows sit together,
/// so a single prolific author is still a hotspot.
pub struct CompositeKeyStore<S> {
    client: Arc<S>,
    table: String,
}

impl<S: StoreClient> CompositeKeyStore<S> {
    pub fn new(client: Arc<S>) -> Self {
        Self {
            client,
            table: RECORD_COMPOSITE_KEY.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn mutation(&self, record: &Record) -> Result<Mutation, StoreError> {
        let key = KeyStrategy::Composite.derive(record)?.primary;
        Ok(Mutation::insert(&self.table, key, record.to_row()?))
    }

    pub async fn insert(&self, record: &Record) -> Result<DateTime<Utc>, StoreError> {
        let mutation = self.mutation(record)?;
        self.client.apply(vec![mutation]).await
    }

    pub async fn insert_many(&self, records: &[Record]) -> Result<usize, StoreError> {
        check_batch(records.len())?;
        let mutations = records
            .iter()
            .map(|r| self.mutation(r))
            .collect::<Result<Vec<_>, _>>()?;
        self.client.apply(mutations).await?;
        Ok(records.len())
    }

    pub async fn get(&self, author: &str, id: &str) -> Result<Record, StoreError> {
        let key = StorageKey::composite([author, id]);
        let row = self.client.read_row(&self.table, &key).await?;
        Ok(Record::from_row(&row)?)
    }

    /// Up to `limit` records of one author, in id order.
    ///
    /// Walks the primary key order and stops at the end of the author's run.
    pub async fn list_by_author(&self, author: &str, limit: usize) -> Result<Vec<Record>, StoreError> {
        let mut stream = self.client.scan(&self.table, &OrderIndex::PrimaryKey).await?;
        let mut records = Vec::new();
        while records.len() < limit {
            let Some(row) = stream.next().await else {
                break;
            };
            let row = row?;
            let row_author = row.string(columns::AUTHOR)?;
            if row_author < author {
                continue;
            }
            if row_author > author {
                break;
            }
            records.push(Record::from_row(&row)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::stores::testing::record;

    #[tokio::test]
    async fn test_authors_are_contiguous() {
        let client = Arc::new(MemoryStore::new());
        let store = CompositeKeyStore::new(Arc::clone(&client));
        let authors = ["ruby", "gold", "dia", "gold", "ruby", "dia", "gold"];
        let batch: Vec<Record> = authors
            .iter()
            .enumerate()
            .map(|(i, a)| record(&format!("c-{}", 9 - i), a, 0))
            .collect();
        store.insert_many(&batch).await.unwrap();

        let gold = store.list_by_author("gold", 10).await.unwrap();
        let ids: Vec<&str> = gold.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c-3", "c-6", "c-8"]);

        let dia = store.list_by_author("dia", 1).await.unwrap();
        assert_eq!(dia.len(), 1);
        assert!(store.list_by_author("nobody", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_needs_both_parts() {
        let store = CompositeKeyStore::new(Arc::new(MemoryStore::new()));
        store.insert(&record("c-1", "sapphire", 0)).await.unwrap();

        assert_eq!(store.get("sapphire", "c-1").await.unwrap().id, "c-1");
        assert!(store.get("gold", "c-1").await.unwrap_err().is_not_found());
    }
}
