//! The store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyspread_core::{Row, StorageKey};

use crate::error::StoreError;
use crate::mutation::{CounterOutcome, CounterUpdate, Mutation, OrderIndex, RowStream};

/// Row-level contract over a transactional, range-sharded store.
///
/// Implementations:
/// - In-process (`MemoryStore`)
/// - SurrealDB v2 (`Surreal2Store` in the keyspread-surreal crate)
///
/// One client is shared by every worker, so every method takes `&self`.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Apply all mutations atomically and return the commit timestamp.
    ///
    /// Either every mutation commits or none does.
    async fn apply(&self, mutations: Vec<Mutation>) -> Result<DateTime<Utc>, StoreError>;

    /// Point read of one row.
    async fn read_row(&self, table: &str, key: &StorageKey) -> Result<Row, StoreError>;

    /// Stream every row of `table` in the given order.
    ///
    /// Rows are produced on demand; dropping the stream stops the scan.
    async fn scan(&self, table: &str, order: &OrderIndex) -> Result<RowStream, StoreError>;

    /// At most `limit` rows of `table`, restricted to `columns` by the store.
    async fn project(
        &self,
        table: &str,
        columns: &[&str],
        limit: usize,
    ) -> Result<Vec<Row>, StoreError>;

    /// Serializable read-modify-write of a counter column.
    async fn read_modify_write(&self, update: CounterUpdate) -> Result<CounterOutcome, StoreError>;
}
