use std::sync::Arc;

use tokio::signal;

use crate::server::AppState;
use crate::workflow::types::RunState;

/// Error recorded on runs cut off by a shutdown.
pub const SHUTDOWN_ERROR: &str = "Run was interrupted by a shutdown";

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Perform graceful shutdown: fail runs cut off mid-step and leave suspended
/// and queued runs on disk for the next start.
pub async fn graceful_shutdown(state: &Arc<AppState>) {
    tracing::info!("Starting graceful shutdown...");

    let unfinished: Vec<_> = state
        .runs
        .list()
        .await
        .into_iter()
        .filter(|r| !r.state.is_terminal())
        .collect();

    if unfinished.is_empty() {
        tracing::info!("No unfinished runs");
        return;
    }

    for run in unfinished {
        match run.state {
            RunState::Generating | RunState::Dispatching { .. } => {
                tracing::info!(run_id = %run.run_id, state = run.state.name(), "Failing interrupted run");

                // Only if the run has not moved on since the snapshot
                if let Err(e) = state
                    .runs
                    .transition_from(
                        &run.run_id,
                        run.state.name(),
                        RunState::Failed {
                            error: SHUTDOWN_ERROR.to_string(),
                        },
                    )
                    .await
                {
                    tracing::warn!(
                        run_id = %run.run_id,
                        error = %e,
                        "Run not marked interrupted during shutdown"
                    );
                }
            }
            _ => {
                tracing::info!(
                    run_id = %run.run_id,
                    state = run.state.name(),
                    "Run will resume on next start"
                );
            }
        }
    }

    tracing::info!("Graceful shutdown complete");
}
