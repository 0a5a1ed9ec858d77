//! Per-task worker loops.
//!
//! A worker owns its record generator and its typed stores, shares nothing
//! mutable with other workers, and keeps at most one store call in flight.
//! Every iteration checks the cancellation token and yields to the runtime.

use keyspread_core::BenchmarkRecord;
use keyspread_generator::{RecordGenerator, ShardAssigner};
use keyspread_store::tables::{MIRROR_PREFIX, OPERATION_LOG};
use keyspread_store::{
    BenchmarkStore, CompositeKeyStore, DualWriteCoordinator, HashedKeyStore, RecordStore,
    StoreClient, UniqueIndexStore,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::Batcher;
use crate::config::DriverConfig;
use crate::error::TaskError;
use crate::report::{TaskMetrics, TaskOutcome, TaskReport};
use crate::tasks::TaskKind;

/// How a worker loop returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Completed,
    Cancelled,
}

pub(crate) struct Worker<S> {
    task: TaskKind,
    client: Arc<S>,
    config: DriverConfig,
    cancel: CancellationToken,
    generator: RecordGenerator,
    shards: ShardAssigner,
}

impl<S: StoreClient + 'static> Worker<S> {
    pub(crate) fn new(
        task: TaskKind,
        client: Arc<S>,
        config: DriverConfig,
        cancel: CancellationToken,
        shards: ShardAssigner,
        index: u64,
    ) -> Self {
        let generator = match config.seed {
            Some(seed) => RecordGenerator::for_worker(seed, index),
            None => RecordGenerator::from_entropy(),
        }
        .with_id_scheme(config.id_scheme);
        Self {
            task,
            client,
            config,
            cancel,
            generator,
            shards,
        }
    }

    pub(crate) async fn run(mut self) -> TaskReport {
        let started = Instant::now();
        let mut metrics = TaskMetrics::default();
        info!("Starting task {}", self.task);

        let result = match self.task {
            TaskKind::InsertRecord => self.insert_records(&mut metrics).await,
            TaskKind::InsertCompositeKey => self.insert_composite(&mut metrics).await,
            TaskKind::InsertHashedKey => self.insert_hashed(&mut metrics).await,
            TaskKind::InsertUniqueIndex => self.insert_unique_index(&mut metrics).await,
            TaskKind::ListRecords => self.list_records(&mut metrics).await,
            TaskKind::ListProjection => self.list_projection(&mut metrics).await,
            TaskKind::InsertBenchmarkBatch => self.insert_benchmark(&mut metrics).await,
            TaskKind::InsertAuditedRecord => self.insert_audited(&mut metrics).await,
            TaskKind::UpdateRecordCounter => self.update_counters(&mut metrics).await,
        };
        metrics.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match result {
            Ok(Exit::Completed) => {
                info!(
                    "Task {} completed: {} records written",
                    self.task, metrics.records_written
                );
                TaskOutcome::Completed
            }
            Ok(Exit::Cancelled) => {
                debug!("Task {} cancelled after {} operations", self.task, metrics.operations);
                TaskOutcome::Cancelled
            }
            Err(e) => {
                error!("Task {} failed: {}", self.task, e);
                TaskOutcome::failed(&e)
            }
        };

        TaskReport {
            task: self.task,
            outcome,
            metrics,
        }
    }

    fn record_store(&self) -> RecordStore<S> {
        let mirrors =
            DualWriteCoordinator::mirror_table_names(MIRROR_PREFIX, self.config.mirror_tables);
        let fence = mirrors.get(1).or(mirrors.first()).cloned();
        RecordStore::new(Arc::clone(&self.client))
            .with_coordinator(
                DualWriteCoordinator::new()
                    .with_operation_log(OPERATION_LOG)
                    .with_mirror_tables(mirrors),
            )
            .with_projection_limit(self.config.projection_limit)
            .with_fence_table(fence.as_deref())
    }

    fn wrote(&self, metrics: &mut TaskMetrics, records: u64) {
        let interval = self.config.progress_interval.max(1);
        let before = metrics.records_written / interval;
        metrics.records_written += records;
        metrics.operations += 1;
        if metrics.records_written / interval > before {
            info!("{}: {} records written", self.task, metrics.records_written);
        }
    }

    async fn insert_records(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = self.record_store();
        while !self.cancel.is_cancelled() {
            let record = self.generator.next_record();
            store.insert(&record).await?;
            debug!("Inserted record {}", record.id);
            self.wrote(metrics, 1);
            tokio::task::yield_now().await;
        }
        Ok(Exit::Cancelled)
    }

    async fn insert_composite(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = CompositeKeyStore::new(Arc::clone(&self.client));
        while !self.cancel.is_cancelled() {
            let record = self.generator.next_record();
            store.insert(&record).await?;
            debug!("Inserted composite key {}/{}", record.author, record.id);
            self.wrote(metrics, 1);
            tokio::task::yield_now().await;
        }
        Ok(Exit::Cancelled)
    }

    async fn insert_hashed(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = HashedKeyStore::new(Arc::clone(&self.client));
        while !self.cancel.is_cancelled() {
            let record = self.generator.next_record();
            let (hashed, _) = store.insert(record).await?;
            debug!("Inserted {} under hashed key {}", hashed.natural_id(), hashed.key);
            self.wrote(metrics, 1);
            tokio::task::yield_now().await;
        }
        Ok(Exit::Cancelled)
    }

    async fn insert_unique_index(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = UniqueIndexStore::new(Arc::clone(&self.client));
        while !self.cancel.is_cancelled() {
            let record = self.generator.next_record();
            let (inserted, _) = store.insert(record).await?;
            debug!(
                "Inserted {} under primary key {}",
                inserted.record.id, inserted.primary_key
            );
            self.wrote(metrics, 1);
            tokio::task::yield_now().await;
        }
        Ok(Exit::Cancelled)
    }

    async fn list_records(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = self.record_store();
        while !self.cancel.is_cancelled() {
            let records = store.query(self.config.list_limit).await?;
            metrics.operations += 1;
            metrics.rows_read += records.len() as u64;
            // Point read of every listed row.
            for listed in &records {
                if self.cancel.is_cancelled() {
                    break;
                }
                let record = store.get(&listed.id).await?;
                metrics.operations += 1;
                metrics.rows_read += 1;
                debug!("Read back {} (count {})", record.id, record.count);
            }
            tokio::task::yield_now().await;
        }
        Ok(Exit::Cancelled)
    }

    async fn list_projection(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = self.record_store();
        while !self.cancel.is_cancelled() {
            let projected = store.query_projection().await?;
            metrics.operations += 1;
            metrics.rows_read += projected.len() as u64;
            tokio::task::yield_now().await;
        }
        Ok(Exit::Cancelled)
    }

    /// Insert `benchmark_count` records in batches of `batch_size`.
    ///
    /// The final partial batch is flushed when the count runs out. On
    /// cancellation it is dropped and counted instead.
    async fn insert_benchmark(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = BenchmarkStore::with_table(Arc::clone(&self.client), &self.config.benchmark_table);
        let mut batcher: Batcher<BenchmarkRecord> = Batcher::new(self.config.batch_size);

        for _ in 0..self.config.benchmark_count {
            if self.cancel.is_cancelled() {
                metrics.dropped_records = batcher.discard() as u64;
                if metrics.dropped_records > 0 {
                    warn!(
                        "{}: dropped {} buffered records on cancellation",
                        self.task, metrics.dropped_records
                    );
                }
                return Ok(Exit::Cancelled);
            }
            let record = self.generator.next_benchmark_record(&self.shards);
            if let Some(batch) = batcher.push(record) {
                self.flush(&store, &batch, metrics).await?;
            }
            tokio::task::yield_now().await;
        }
        if let Some(rest) = batcher.finish() {
            self.flush(&store, &rest, metrics).await?;
        }
        Ok(Exit::Completed)
    }

    async fn flush(
        &self,
        store: &BenchmarkStore<S>,
        batch: &[BenchmarkRecord],
        metrics: &mut TaskMetrics,
    ) -> Result<(), TaskError> {
        let written = store.insert_many(batch).await?;
        debug!("Flushed {} records to {}", written, store.table());
        metrics.flush_sizes.push(written);
        self.wrote(metrics, written as u64);
        Ok(())
    }

    async fn insert_audited(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = self.record_store();
        while !self.cancel.is_cancelled() {
            let record = self.generator.next_record();
            store.insert_audited(&record).await?;
            debug!("Audited insert of {}", record.id);
            self.wrote(metrics, 1);
            tokio::task::yield_now().await;
        }
        Ok(Exit::Cancelled)
    }

    async fn update_counters(&mut self, metrics: &mut TaskMetrics) -> Result<Exit, TaskError> {
        let store = self.record_store();
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Exit::Cancelled);
            }
            let record = self.generator.next_record();
            store.insert_audited(&record).await?;
            self.wrote(metrics, 1);

            for _ in 0..self.config.updates_per_record {
                if self.cancel.is_cancelled() {
                    return Ok(Exit::Cancelled);
                }
                let outcome = store.update(&record.id).await?;
                metrics.operations += 1;
                debug!(
                    "Counter of {} is now {} (committed {})",
                    record.id, outcome.value, outcome.committed_at
                );
                tokio::task::yield_now().await;
            }
        }
    }
}
