//! Zipflow - Main entry point

use anyhow::Context;
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use zipflow_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use zipflow_ingest::{scheduler, Cli, Orchestrator, PipelineConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("zipflow")
        .build();

    // Environment variables take precedence over the flags
    let log_config = match log_config.clone().merge_env() {
        Ok(merged) => merged,
        Err(e) => {
            eprintln!("Warning: ignoring logging environment: {:#}", e);
            log_config
        },
    };

    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    if let Err(e) = run(&cli).await {
        error!(error = %format!("{:#}", e), "Zipflow stopped with an error");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.apply(PipelineConfig::from_env()?);

    info!(
        watch_dir = %config.watch_dir.display(),
        archive_dir = %config.archive_dir.display(),
        database = %config.database_path.display(),
        lookup_url = %config.lookup_base_url,
        "Starting zipflow"
    );

    let orchestrator = Orchestrator::from_config(config).context("Failed to start pipeline")?;
    orchestrator
        .ensure_directories()
        .context("Failed to prepare watch and archive directories")?;

    let shutdown = CancellationToken::new();
    let signals = scheduler::cancel_on_signal(shutdown.clone());

    let result = if cli.once {
        if cli.interval.is_some() {
            info!("--interval has no effect with --once");
        }
        orchestrator.run_once(&shutdown).await.map(|summary| {
            info!(
                files = summary.files_processed(),
                completed = summary.batches_completed,
                partial = summary.batches_partial,
                failed = summary.batches_failed,
                rows_succeeded = summary.rows_succeeded,
                rows_failed = summary.rows_failed,
                archived = summary.files_archived,
                archive_failures = summary.archive_failures,
                "Single pass complete"
            );
        })
    } else {
        let interval = orchestrator.config().poll_interval();
        scheduler::run_continuous(&orchestrator, interval, shutdown.clone()).await
    };

    signals.abort();
    result.map_err(anyhow::Error::from)
}
