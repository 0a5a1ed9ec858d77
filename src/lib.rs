//! Keyspread
//!
//! Load generation against range-sharded key-value stores, comparing key
//! layouts that avoid piling concurrent inserts onto one hot range.
//!
//! # Workspace crates
//!
//! - `keyspread_core` - records, column mappings, key strategies, range statistics
//! - `keyspread_generator` - seeded record generation and shard tagging
//! - `keyspread_store` - the `StoreClient` contract, the in-memory store, typed stores
//! - `keyspread_surreal` - `StoreClient` over SurrealDB
//!
//! # CLI Usage
//!
//! ```bash
//! # Every task against the in-memory store for 30 seconds
//! keyspread run --duration 30s
//!
//! # Batched benchmark only, against a SurrealDB server
//! keyspread run --backend surreal --surreal-endpoint ws://localhost:8000 \
//!     --tasks InsertBenchmarkBatch --benchmark-count 100000
//!
//! # Compare where each key strategy sends writes
//! keyspread analyze-keys --id-scheme ulid
//! ```

pub mod analyze;
pub mod batch;
pub mod config;
pub mod driver;
pub mod error;
pub mod report;
pub mod tasks;
mod workers;

pub use batch::Batcher;
pub use config::{DriverConfig, StoreBackend, SurrealOpts};
pub use driver::ConcurrentWriteDriver;
pub use error::{ConfigError, TaskError};
pub use report::{DriverReport, StopReason, TaskMetrics, TaskOutcome, TaskReport};
pub use tasks::{TaskKind, WorkSelector};
