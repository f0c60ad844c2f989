//! Continuous mode and shutdown handling

use std::time::{Duration, Instant};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;
use crate::events::PipelineEvent;
use crate::orchestrator::Orchestrator;

/// Repeat single passes until `shutdown` is cancelled.
///
/// The token is checked between files (inside the pass), between passes and
/// while waiting for the next poll. A failed pass is reported and the loop
/// carries on, unless the failure is a persistence error, which is returned.
pub async fn run_continuous(
    orchestrator: &Orchestrator,
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut iteration: u64 = 0;

    info!(interval_secs = interval.as_secs_f64(), "Starting continuous mode");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        iteration += 1;
        let started = Instant::now();

        match orchestrator.run_once(&shutdown).await {
            Ok(summary) => {
                info!(
                    iteration,
                    duration_ms = started.elapsed().as_millis() as u64,
                    files = summary.files_processed(),
                    rows_succeeded = summary.rows_succeeded,
                    rows_failed = summary.rows_failed,
                    "Iteration completed"
                );
            },
            Err(e) if e.is_fatal() => {
                error!(iteration, error = %e, "Audit store failure, stopping");
                return Err(e);
            },
            Err(e) => {
                orchestrator.events().emit(&PipelineEvent::IterationFailed {
                    reason: e.to_string(),
                });
            },
        }

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {},
        }
    }

    info!(iterations = iteration, "Continuous mode stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing the current file before stopping");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing the current file before stopping");
        },
    }
}

/// Cancel `token` when a shutdown signal arrives
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    })
}
