//! The concurrent write driver.
//!
//! One tokio task per enabled [`TaskKind`], all writing through a single
//! injected store client. The driver waits for the first worker to end,
//! whether by failure or by running out of work, then cancels the rest and
//! joins every one of them so the report covers the whole run.
//!
//! ```text
//! WorkSelector ──► ConcurrentWriteDriver ──spawn──► Worker (one per task)
//!                        │                            │
//!                        │◄──────── TaskReport ───────┘
//!                        │
//!     first exit / Ctrl+C / deadline ──► cancel all ──► join all ──► DriverReport
//! ```

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use keyspread_generator::ShardAssigner;
use keyspread_store::StoreClient;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::error::{ConfigError, TaskError};
use crate::report::{DriverReport, StopReason, TaskMetrics, TaskOutcome, TaskReport};
use crate::tasks::{TaskKind, WorkSelector};
use crate::workers::Worker;

pub struct ConcurrentWriteDriver<S> {
    client: Arc<S>,
    config: DriverConfig,
}

impl<S: StoreClient + 'static> ConcurrentWriteDriver<S> {
    pub fn new(client: Arc<S>, config: DriverConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Tasks that will start, and tasks skipped for lack of work.
    pub fn plan(&self, selector: &WorkSelector) -> (Vec<TaskKind>, Vec<TaskKind>) {
        selector.enabled().into_iter().partition(|task| {
            if *task == TaskKind::InsertBenchmarkBatch && self.config.benchmark_count == 0 {
                warn!("Skipping {}: benchmark count is 0", task);
                return false;
            }
            true
        })
    }

    pub async fn run(&self, selector: &WorkSelector) -> Result<DriverReport, ConfigError> {
        self.run_until(selector, CancellationToken::new()).await
    }

    /// Run until a worker ends, `shutdown` fires or the configured duration
    /// elapses, whichever comes first.
    pub async fn run_until(
        &self,
        selector: &WorkSelector,
        shutdown: CancellationToken,
    ) -> Result<DriverReport, ConfigError> {
        self.config.validate()?;
        let shards = ShardAssigner::new(self.config.shard_count)?;
        let started_at = Utc::now();
        let started = Instant::now();

        let (tasks, skipped) = self.plan(selector);
        if tasks.is_empty() {
            warn!("No tasks enabled");
            return Ok(DriverReport {
                started_at,
                duration_ms: 0,
                stop_reason: StopReason::Idle,
                skipped,
                tasks: Vec::new(),
                distributions: Vec::new(),
            });
        }

        let cancel = shutdown.child_token();
        let mut pending: FuturesUnordered<_> = tasks
            .iter()
            .enumerate()
            .map(|(index, &task)| {
                let worker = Worker::new(
                    task,
                    Arc::clone(&self.client),
                    self.config.clone(),
                    cancel.child_token(),
                    shards,
                    index as u64,
                );
                tokio::spawn(worker.run()).map(move |joined| (task, joined))
            })
            .collect();
        info!("Started {} tasks", tasks.len());

        let deadline = self.config.duration;
        let timer = async move {
            match deadline {
                Some(duration) => tokio::time::sleep(duration).await,
                None => futures::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        let mut stop_reason: Option<StopReason> = None;
        let mut reports = Vec::with_capacity(tasks.len());
        loop {
            tokio::select! {
                joined = pending.next() => {
                    let Some((task, joined)) = joined else {
                        break;
                    };
                    let report = joined.unwrap_or_else(|e| TaskReport {
                        task,
                        outcome: TaskOutcome::failed(&TaskError::Panicked(e.to_string())),
                        metrics: TaskMetrics::default(),
                    });
                    if stop_reason.is_none() {
                        let reason = match &report.outcome {
                            TaskOutcome::Failed { .. } => StopReason::TaskFailed { task },
                            TaskOutcome::Completed => StopReason::TaskCompleted { task },
                            TaskOutcome::Cancelled => StopReason::Shutdown,
                        };
                        info!("Stopping all tasks: {:?}", reason);
                        stop_reason = Some(reason);
                        cancel.cancel();
                    }
                    reports.push(report);
                }
                _ = shutdown.cancelled(), if stop_reason.is_none() => {
                    info!("Shutdown requested, stopping all tasks");
                    stop_reason = Some(StopReason::Shutdown);
                    cancel.cancel();
                }
                _ = &mut timer, if stop_reason.is_none() => {
                    info!("Run duration elapsed, stopping all tasks");
                    stop_reason = Some(StopReason::Deadline);
                    cancel.cancel();
                }
            }
        }

        reports.sort_by_key(|r| r.task);
        Ok(DriverReport {
            started_at,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            stop_reason: stop_reason.unwrap_or(StopReason::Shutdown),
            skipped,
            tasks: reports,
            distributions: Vec::new(),
        })
    }
}
