//! Synthetic record generation for keyspread.
//!
//! [`RecordGenerator`] produces the records every write task inserts. It is
//! driven by a seeded [`rand::rngs::StdRng`], so two generators built with the
//! same seed produce the same sequence of random fields (timestamps excepted,
//! which come from the wall clock unless supplied).
//!
//! [`ShardAssigner`] tags benchmark records with a bucket derived from the
//! generation timestamp, for correlating write distribution with time.

pub mod generator;
pub mod generators;
pub mod shard;

pub use generator::{GeneratorError, IdScheme, RecordGenerator, RecordIterator};
pub use generators::author::AUTHORS;
pub use shard::{ShardAssigner, DEFAULT_SHARD_COUNT};
