//! Run configuration.
//!
//! [`DriverConfig`] is the plain settings struct the driver consumes. The
//! clap option groups below map command-line flags and their environment
//! variable fallbacks onto it.

pub mod duration;

use clap::{Args, ValueEnum};
use keyspread_generator::{IdScheme, ShardAssigner, DEFAULT_SHARD_COUNT};
use keyspread_store::tables::{
    DEFAULT_MIRROR_COUNT, LIST_LIMIT, MAX_BATCH_SIZE, PROJECTION_LIMIT, RECORD_BENCHMARK,
};
use keyspread_surreal::SurrealConfig;
use std::time::Duration;

use crate::error::ConfigError;

/// Records between progress log lines.
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Settings shared by every worker of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Rows returned per `ListRecords` iteration.
    pub list_limit: usize,
    /// Rows returned per `ListProjection` iteration.
    pub projection_limit: usize,
    /// Records per `InsertBenchmarkBatch` flush.
    pub batch_size: usize,
    pub shard_count: u32,
    /// Mirror tables written by audited inserts.
    pub mirror_tables: usize,
    pub benchmark_table: String,
    /// Records inserted by `InsertBenchmarkBatch`. Zero skips the task.
    pub benchmark_count: u64,
    /// Counter updates per record in `UpdateRecordCounter`.
    pub updates_per_record: u32,
    /// Base seed; `None` draws from entropy.
    pub seed: Option<u64>,
    pub id_scheme: IdScheme,
    /// Stop the run after this long.
    pub duration: Option<Duration>,
    pub progress_interval: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            list_limit: LIST_LIMIT,
            projection_limit: PROJECTION_LIMIT,
            batch_size: MAX_BATCH_SIZE,
            shard_count: DEFAULT_SHARD_COUNT,
            mirror_tables: DEFAULT_MIRROR_COUNT,
            benchmark_table: RECORD_BENCHMARK.to_string(),
            benchmark_count: 0,
            updates_per_record: 10,
            seed: None,
            id_scheme: IdScheme::Uuid,
            duration: None,
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

impl DriverConfig {
    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit;
        self
    }

    pub fn with_projection_limit(mut self, limit: usize) -> Self {
        self.projection_limit = limit;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_shard_count(mut self, count: u32) -> Self {
        self.shard_count = count;
        self
    }

    pub fn with_mirror_tables(mut self, count: usize) -> Self {
        self.mirror_tables = count;
        self
    }

    pub fn with_benchmark(mut self, table: &str, count: u64) -> Self {
        self.benchmark_table = table.to_string();
        self.benchmark_count = count;
        self
    }

    pub fn with_updates_per_record(mut self, updates: u32) -> Self {
        self.updates_per_record = updates;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_id_scheme(mut self, id_scheme: IdScheme) -> Self {
        self.id_scheme = id_scheme;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Reject settings no worker could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: self.batch_size,
                max: MAX_BATCH_SIZE,
            });
        }
        ShardAssigner::new(self.shard_count)?;
        Ok(())
    }
}

/// Store the run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// In-process range-sharded store with per-range write accounting
    Memory,
    /// SurrealDB v2 server, or the embedded engine with a `mem://` endpoint
    Surreal,
}

/// How natural ids are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdSchemeArg {
    /// Random UUID v4
    Uuid,
    /// Time-ordered ULID
    Ulid,
}

impl From<IdSchemeArg> for IdScheme {
    fn from(arg: IdSchemeArg) -> Self {
        match arg {
            IdSchemeArg::Uuid => IdScheme::Uuid,
            IdSchemeArg::Ulid => IdScheme::Ulid,
        }
    }
}

/// SurrealDB connection options.
#[derive(Args, Debug, Clone)]
pub struct SurrealOpts {
    /// SurrealDB endpoint URL (`ws://host:port` or `mem://`)
    #[arg(long, default_value = "ws://localhost:8000", env = "SURREAL_ENDPOINT")]
    pub surreal_endpoint: String,

    /// SurrealDB username
    #[arg(long, default_value = "root", env = "SURREAL_USERNAME")]
    pub surreal_username: String,

    /// SurrealDB password
    #[arg(long, default_value = "root", env = "SURREAL_PASSWORD")]
    pub surreal_password: String,

    /// SurrealDB namespace
    #[arg(long, default_value = "keyspread", env = "SURREAL_NAMESPACE")]
    pub surreal_namespace: String,

    /// SurrealDB database
    #[arg(long, default_value = "keyspread", env = "SURREAL_DATABASE")]
    pub surreal_database: String,

    /// Rows fetched per round trip while scanning
    #[arg(long, default_value = "100")]
    pub page_size: usize,
}

impl SurrealOpts {
    pub fn to_config(&self) -> SurrealConfig {
        SurrealConfig::default()
            .with_endpoint(&self.surreal_endpoint)
            .with_namespace(&self.surreal_namespace)
            .with_database(&self.surreal_database)
            .with_credentials(&self.surreal_username, &self.surreal_password)
            .with_page_size(self.page_size)
    }
}

/// Options of the `run` command that shape the workers.
#[derive(Args, Debug, Clone)]
pub struct DriverOpts {
    /// Comma separated task names; empty runs every task
    #[arg(long, default_value = "", env = "KEYSPREAD_TASKS")]
    pub tasks: String,

    /// Table written by InsertBenchmarkBatch
    #[arg(long, default_value = RECORD_BENCHMARK, env = "KEYSPREAD_BENCHMARK_TABLE")]
    pub benchmark_table: String,

    /// Records written by InsertBenchmarkBatch (0 skips the task)
    #[arg(long, default_value = "0", env = "KEYSPREAD_BENCHMARK_COUNT")]
    pub benchmark_count: u64,

    /// Records per benchmark flush
    #[arg(long, default_value_t = MAX_BATCH_SIZE, env = "KEYSPREAD_BATCH_SIZE")]
    pub batch_size: usize,

    /// Shard buckets for benchmark records
    #[arg(long, default_value_t = DEFAULT_SHARD_COUNT)]
    pub shard_count: u32,

    /// Mirror tables written by audited inserts
    #[arg(long, default_value_t = DEFAULT_MIRROR_COUNT)]
    pub mirror_tables: usize,

    /// Counter updates per record in UpdateRecordCounter
    #[arg(long, default_value = "10")]
    pub updates_per_record: u32,

    /// Rows per ListRecords query
    #[arg(long, default_value_t = LIST_LIMIT)]
    pub list_limit: usize,

    /// Seed for reproducible record generation
    #[arg(long, env = "KEYSPREAD_SEED")]
    pub seed: Option<u64>,

    /// Natural id scheme
    #[arg(long, value_enum, default_value = "uuid")]
    pub id_scheme: IdSchemeArg,

    /// Stop after this long (e.g. "30s", "5m"); runs until Ctrl+C otherwise
    #[arg(long)]
    pub duration: Option<String>,
}

impl DriverOpts {
    pub fn to_config(&self) -> anyhow::Result<DriverConfig> {
        let mut config = DriverConfig::default()
            .with_list_limit(self.list_limit)
            .with_batch_size(self.batch_size)
            .with_shard_count(self.shard_count)
            .with_mirror_tables(self.mirror_tables)
            .with_benchmark(&self.benchmark_table, self.benchmark_count)
            .with_updates_per_record(self.updates_per_record)
            .with_id_scheme(self.id_scheme.into());
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(duration) = &self.duration {
            config = config.with_duration(duration::parse_duration(duration)?);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.list_limit, 50);
        assert_eq!(config.projection_limit, 10);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.shard_count, 10);
        assert_eq!(config.mirror_tables, 3);
        assert_eq!(config.benchmark_table, "RecordBenchmark");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_batch_and_shards() {
        let config = DriverConfig::default().with_batch_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBatchSize { size: 0, max: 1000 })
        ));

        let config = DriverConfig::default().with_batch_size(1001);
        assert!(config.validate().is_err());

        let config = DriverConfig::default().with_shard_count(0);
        assert!(matches!(config.validate(), Err(ConfigError::Generator(_))));
    }

    #[test]
    fn test_surreal_opts_to_config() {
        let opts = SurrealOpts {
            surreal_endpoint: "mem://".to_string(),
            surreal_username: "u".to_string(),
            surreal_password: "p".to_string(),
            surreal_namespace: "ns".to_string(),
            surreal_database: "db".to_string(),
            page_size: 0,
        };
        let config = opts.to_config();
        assert!(config.is_embedded());
        assert_eq!(config.namespace, "ns");
        assert_eq!(config.page_size, 1);
    }
}
