//! Keyspread CLI
//!
//! Runs key-layout load tests against a range-sharded store.
//!
//! # Usage Examples
//!
//! ## Run every task against the in-memory store
//! ```bash
//! keyspread run --duration 30s --report-json run.json
//! ```
//!
//! ## Run selected tasks against SurrealDB
//! ```bash
//! keyspread run \
//!   --backend surreal \
//!   --surreal-endpoint ws://localhost:8000 \
//!   --surreal-username root \
//!   --surreal-password root \
//!   --tasks InsertHashedKey,InsertUniqueIndex,ListRecords \
//!   --duration 5m
//! ```
//!
//! ## Batched benchmark
//! ```bash
//! KEYSPREAD_TASKS=InsertBenchmarkBatch \
//! KEYSPREAD_BENCHMARK_TABLE=RecordBenchmark \
//! KEYSPREAD_BENCHMARK_COUNT=250000 \
//! keyspread run
//! ```
//!
//! ## Compare key strategies offline
//! ```bash
//! keyspread analyze-keys --id-scheme ulid --ranges 32
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use keyspread::analyze::{analyze, AnalysisConfig};
use keyspread::config::{DriverOpts, IdSchemeArg};
use keyspread::{
    ConcurrentWriteDriver, DriverReport, StoreBackend, SurrealOpts, TaskKind, TaskOutcome,
    WorkSelector,
};
use keyspread_core::KeyRanges;
use keyspread_store::MemoryStore;
use keyspread_surreal::Surreal2Store;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "keyspread")]
#[command(about = "Load-test key layouts against range-sharded stores")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enabled write and query tasks concurrently
    Run {
        /// Store to write to
        #[arg(long, value_enum, default_value = "memory", env = "KEYSPREAD_BACKEND")]
        backend: StoreBackend,

        /// Task and workload options
        #[command(flatten)]
        driver_opts: DriverOpts,

        /// SurrealDB options (surreal backend only)
        #[command(flatten)]
        surreal_opts: SurrealOpts,

        /// Key ranges tracked by the in-memory store
        #[arg(long, default_value = "16")]
        key_ranges: usize,

        /// Write the run report as JSON to this path
        #[arg(long, value_name = "PATH")]
        report_json: Option<PathBuf>,
    },

    /// Compare where each key strategy sends new writes
    AnalyzeKeys {
        /// Records loaded before the key space is split
        #[arg(long, default_value = "10000")]
        warmup: u64,

        /// Records measured after the split
        #[arg(long, default_value = "10000")]
        writes: u64,

        /// Number of key ranges
        #[arg(long, default_value = "16")]
        ranges: usize,

        /// Generator seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Natural id scheme
        #[arg(long, value_enum, default_value = "ulid")]
        id_scheme: IdSchemeArg,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the task names accepted by --tasks
    ListTasks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            backend,
            driver_opts,
            surreal_opts,
            key_ranges,
            report_json,
        } => {
            let config = driver_opts
                .to_config()
                .context("Invalid run configuration")?;
            let selector = WorkSelector::parse_list(&driver_opts.tasks)
                .context("Invalid task selection")?;
            let shutdown = shutdown_on_ctrl_c();

            let report = match backend {
                StoreBackend::Memory => {
                    let store = Arc::new(MemoryStore::with_key_ranges(KeyRanges::uniform_hex(
                        key_ranges,
                    )));
                    let report = ConcurrentWriteDriver::new(Arc::clone(&store), config)
                        .run_until(&selector, shutdown)
                        .await?;
                    report.with_distributions(store.write_distributions())
                }
                StoreBackend::Surreal => {
                    let surreal_config = surreal_opts.to_config();
                    let store = Surreal2Store::connect(&surreal_config)
                        .await
                        .with_context(|| {
                            format!("Failed to connect to SurrealDB at {}", surreal_config.endpoint)
                        })?;
                    ConcurrentWriteDriver::new(Arc::new(store), config)
                        .run_until(&selector, shutdown)
                        .await?
                }
            };

            finish(&report, report_json)?;
        }
        Commands::AnalyzeKeys {
            warmup,
            writes,
            ranges,
            seed,
            id_scheme,
            json,
        } => {
            let config = AnalysisConfig {
                warmup,
                writes,
                ranges,
                seed,
                id_scheme: id_scheme.into(),
            };
            let analysis = analyze(&config).context("Key analysis failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                println!("{}", analysis.render_table());
            }
        }
        Commands::ListTasks => {
            for task in TaskKind::ALL {
                println!("{:<22} {}", task.name(), task.description());
            }
        }
    }

    Ok(())
}

fn finish(report: &DriverReport, report_json: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", report.summary());

    if let Some(path) = report_json {
        report.write_json(&path)?;
        info!("Run report written to {:?}", path);
    }

    if let Some(failure) = report.failures().next() {
        let message = match &failure.outcome {
            TaskOutcome::Failed { message, .. } => message.as_str(),
            _ => "unknown error",
        };
        anyhow::bail!(
            "{} task(s) failed; {}: {}",
            report.failures().count(),
            failure.task,
            message
        );
    }
    Ok(())
}

/// Token cancelled on Ctrl+C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal (Ctrl+C)");
                trigger.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {e}"),
        }
    });

    token
}
