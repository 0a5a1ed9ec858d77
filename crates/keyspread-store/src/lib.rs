//! Store contract and typed stores for keyspread.
//!
//! # Architecture
//!
//! ```text
//! RecordStore / CompositeKeyStore / HashedKeyStore / UniqueIndexStore / BenchmarkStore
//!        │  (typed entities, key strategies, batch limits)
//!        ▼
//! DualWriteCoordinator ── builds atomic write sets (index row, log entry, mirrors)
//!        │
//!        ▼
//! dyn StoreClient ── apply / read_row / scan / project / read_modify_write
//!        │
//!        ├── MemoryStore (in-process, per-range write accounting)
//!        └── Surreal2Store (keyspread-surreal)
//! ```

pub mod dual_write;
pub mod error;
pub mod memory;
pub mod mutation;
pub mod stores;
pub mod tables;
pub mod traits;

pub use dual_write::{DualWriteCoordinator, IndexWrite, PrimaryWrite, WriteSet};
pub use error::{ErrorKind, StoreError};
pub use memory::MemoryStore;
pub use mutation::{CounterOutcome, CounterUpdate, Mutation, OrderIndex, ReadFence, RowStream};
pub use stores::{BenchmarkStore, CompositeKeyStore, HashedKeyStore, RecordStore, UniqueIndexStore};
pub use traits::StoreClient;
