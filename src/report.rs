//! Run report types.

use anyhow::Context;
use chrono::{DateTime, Utc};
use keyspread_core::RangeHistogram;
use keyspread_store::ErrorKind;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::error::TaskError;
use crate::tasks::TaskKind;

/// Counters kept by one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskMetrics {
    /// Store calls that succeeded.
    pub operations: u64,
    /// Primary records committed.
    pub records_written: u64,
    /// Rows returned by list and projection queries.
    pub rows_read: u64,
    /// Size of every batch flush, in order.
    pub flush_sizes: Vec<usize>,
    /// Buffered records discarded on cancellation.
    pub dropped_records: u64,
    pub duration_ms: u64,
}

impl TaskMetrics {
    pub fn flushes(&self) -> usize {
        self.flush_sizes.len()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn records_per_second(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.records_written as f64 / secs
        } else {
            0.0
        }
    }
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// A finite task ran to the end.
    Completed,
    /// Stopped by the driver.
    Cancelled,
    Failed {
        kind: Option<ErrorKind>,
        message: String,
    },
}

impl TaskOutcome {
    pub fn failed(error: &TaskError) -> Self {
        TaskOutcome::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub task: TaskKind,
    pub outcome: TaskOutcome,
    pub metrics: TaskMetrics,
}

/// What made the driver cancel its workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    TaskFailed { task: TaskKind },
    TaskCompleted { task: TaskKind },
    Shutdown,
    Deadline,
    /// No task was enabled.
    Idle,
}

/// Write distribution of one table over the store's key ranges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDistribution {
    pub table: String,
    pub writes: u64,
    pub counts: Vec<u64>,
    pub chi_square: f64,
    pub hottest_range: Option<usize>,
    pub hottest_share: f64,
}

impl TableDistribution {
    pub fn from_histogram(table: &str, histogram: &RangeHistogram) -> Self {
        Self {
            table: table.to_string(),
            writes: histogram.total(),
            counts: histogram.counts().to_vec(),
            chi_square: histogram.chi_square(),
            hottest_range: histogram.hottest().map(|(i, _)| i),
            hottest_share: histogram.hottest_share(),
        }
    }
}

/// Result of a driver run.
#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stop_reason: StopReason,
    /// Tasks that were enabled but not started.
    pub skipped: Vec<TaskKind>,
    pub tasks: Vec<TaskReport>,
    pub distributions: Vec<TableDistribution>,
}

impl DriverReport {
    /// True when no worker failed.
    pub fn passed(&self) -> bool {
        !self.tasks.iter().any(|t| t.outcome.is_failure())
    }

    pub fn task(&self, kind: TaskKind) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task == kind)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.outcome.is_failure())
    }

    pub fn total_records_written(&self) -> u64 {
        self.tasks.iter().map(|t| t.metrics.records_written).sum()
    }

    pub fn total_operations(&self) -> u64 {
        self.tasks.iter().map(|t| t.metrics.operations).sum()
    }

    pub fn with_distributions<I>(mut self, histograms: I) -> Self
    where
        I: IntoIterator<Item = (String, RangeHistogram)>,
    {
        self.distributions = histograms
            .into_iter()
            .map(|(table, h)| TableDistribution::from_histogram(&table, &h))
            .collect();
        self
    }

    pub fn summary(&self) -> String {
        let status = if self.passed() { "PASSED" } else { "FAILED" };
        let mut summary = format!(
            "Keyspread Run: {}\n\
             ================\n\
             Started: {}\n\
             Duration: {:?}\n\
             Stopped by: {}\n\
             Records written: {}\n\
             Store operations: {}\n\n",
            status,
            self.started_at.to_rfc3339(),
            Duration::from_millis(self.duration_ms),
            describe_stop(&self.stop_reason),
            self.total_records_written(),
            self.total_operations(),
        );

        summary.push_str("Tasks:\n");
        for task in &self.tasks {
            let outcome = match &task.outcome {
                TaskOutcome::Completed => "completed".to_string(),
                TaskOutcome::Cancelled => "cancelled".to_string(),
                TaskOutcome::Failed { message, .. } => format!("failed: {message}"),
            };
            summary.push_str(&format!(
                "- {}: {} ({} ops, {} written, {} read, {:.1} records/sec)\n",
                task.task,
                outcome,
                task.metrics.operations,
                task.metrics.records_written,
                task.metrics.rows_read,
                task.metrics.records_per_second(),
            ));
            if task.metrics.flushes() > 0 {
                summary.push_str(&format!("  flushes: {}\n", task.metrics.flushes()));
            }
            if task.metrics.dropped_records > 0 {
                summary.push_str(&format!(
                    "  dropped on cancel: {}\n",
                    task.metrics.dropped_records
                ));
            }
        }
        for skipped in &self.skipped {
            summary.push_str(&format!("- {skipped}: skipped\n"));
        }

        if !self.distributions.is_empty() {
            summary.push_str("\nWrite distribution:\n");
            for dist in &self.distributions {
                summary.push_str(&format!(
                    "- {}: {} writes over {} ranges, chi-square {:.1}, hottest range {:.1}%\n",
                    dist.table,
                    dist.writes,
                    dist.counts.len(),
                    dist.chi_square,
                    dist.hottest_share * 100.0,
                ));
            }
        }

        summary
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {path:?}"))?;
        Ok(())
    }
}

fn describe_stop(reason: &StopReason) -> String {
    match reason {
        StopReason::TaskFailed { task } => format!("{task} failed"),
        StopReason::TaskCompleted { task } => format!("{task} completed"),
        StopReason::Shutdown => "shutdown signal".to_string(),
        StopReason::Deadline => "duration elapsed".to_string(),
        StopReason::Idle => "no tasks enabled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspread_store::StoreError;

    fn report(tasks: Vec<TaskReport>) -> DriverReport {
        DriverReport {
            started_at: Utc::now(),
            duration_ms: 1500,
            stop_reason: StopReason::Deadline,
            skipped: vec![TaskKind::InsertBenchmarkBatch],
            tasks,
            distributions: Vec::new(),
        }
    }

    #[test]
    fn test_records_per_second() {
        let metrics = TaskMetrics {
            records_written: 1000,
            duration_ms: 10_000,
            ..Default::default()
        };
        assert_eq!(metrics.records_per_second(), 100.0);
        assert_eq!(TaskMetrics::default().records_per_second(), 0.0);
    }

    #[test]
    fn test_report_passed_and_failures() {
        let ok = TaskReport {
            task: TaskKind::InsertRecord,
            outcome: TaskOutcome::Cancelled,
            metrics: TaskMetrics {
                records_written: 7,
                operations: 7,
                ..Default::default()
            },
        };
        let err = TaskError::from(StoreError::uniqueness_violation("RecordNaturalIdIndex", "a"));
        let failed = TaskReport {
            task: TaskKind::InsertUniqueIndex,
            outcome: TaskOutcome::failed(&err),
            metrics: TaskMetrics::default(),
        };

        assert!(report(vec![ok.clone()]).passed());

        let mixed = report(vec![ok, failed]);
        assert!(!mixed.passed());
        assert_eq!(mixed.failures().count(), 1);
        assert_eq!(mixed.total_records_written(), 7);
        assert!(matches!(
            mixed.task(TaskKind::InsertUniqueIndex).unwrap().outcome,
            TaskOutcome::Failed {
                kind: Some(ErrorKind::UniquenessViolation),
                ..
            }
        ));

        let summary = mixed.summary();
        assert!(summary.contains("FAILED"));
        assert!(summary.contains("InsertBenchmarkBatch: skipped"));
        assert!(summary.contains("duration elapsed"));
    }

    #[test]
    fn test_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let task = TaskReport {
            task: TaskKind::InsertBenchmarkBatch,
            outcome: TaskOutcome::Completed,
            metrics: TaskMetrics {
                flush_sizes: vec![1000, 500],
                records_written: 1500,
                ..Default::default()
            },
        };
        report(vec![task]).write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["stop_reason"]["reason"], "deadline");
        assert_eq!(json["tasks"][0]["task"], "InsertBenchmarkBatch");
        assert_eq!(json["tasks"][0]["outcome"]["status"], "completed");
        assert_eq!(json["tasks"][0]["metrics"]["flush_sizes"][1], 500);
    }
}
