//! Typed stores, one per key strategy.
//!
//! Each store is generic over the [`crate::StoreClient`] it writes through and
//! holds it as an `Arc`, so one client can back every store of a run.

mod benchmark;
mod composite;
mod hashed;
mod record;
mod unique_index;

pub use benchmark::BenchmarkStore;
pub use composite::CompositeKeyStore;
pub use hashed::HashedKeyStore;
pub use record::RecordStore;
pub use unique_index::UniqueIndexStore;

use futures::StreamExt;
use keyspread_core::Row;

use crate::error::StoreError;
use crate::mutation::RowStream;
use crate::tables::MAX_BATCH_SIZE;

/// Pull at most `limit` rows from a scan, then drop it.
///
/// The limit is checked before each poll so no row past it is ever requested.
pub(crate) async fn take_rows(mut stream: RowStream, limit: usize) -> Result<Vec<Row>, StoreError> {
    let mut rows = Vec::with_capacity(limit.min(MAX_BATCH_SIZE));
    while rows.len() < limit {
        match stream.next().await {
            Some(row) => rows.push(row?),
            None => break,
        }
    }
    Ok(rows)
}

pub(crate) fn check_batch(size: usize) -> Result<(), StoreError> {
    if size > MAX_BATCH_SIZE {
        return Err(StoreError::BatchTooLarge {
            size,
            max: MAX_BATCH_SIZE,
        });
    }
    Ok(())
}
