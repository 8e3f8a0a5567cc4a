use std::sync::Arc;

use crate::queue::task::Task;
use crate::server::AppState;
use crate::workflow::types::RunState;

/// Error recorded on runs whose side effects were cut off by a restart.
pub const INTERRUPTED_ERROR: &str = "Run was interrupted by a restart";

/// Rehydrate persisted runs after a restart.
///
/// Suspended runs re-register their token with the original deadline and go
/// first in their submitter's line; queued runs follow in submission order.
/// Runs caught mid-generation or mid-dispatch are failed, since the external
/// calls may or may not have happened.
pub async fn recover_runs(state: &Arc<AppState>) {
    tracing::info!("Scanning run store for unfinished runs...");

    let runs = state.runs.list().await;
    let mut resumed = 0usize;
    let mut requeued = Vec::new();

    for record in runs {
        if record.state == RunState::Queued {
            requeued.push(record);
            continue;
        }

        match &record.state {
            RunState::AwaitingApproval {
                token_id, deadline, ..
            } => {
                let created_at = *deadline
                    - chrono::Duration::from_std(state.config.workflow.approval_timeout())
                        .unwrap_or_else(|_| chrono::Duration::zero());
                state.tokens.restore(token_id, created_at, *deadline).await;

                tracing::info!(
                    run_id = %record.run_id,
                    token_id = %token_id,
                    deadline = %deadline,
                    "Resuming suspended run"
                );

                super::submit(
                    state,
                    Task::ResumeApproval {
                        run_id: record.run_id.clone(),
                        submitter: record.submitter.clone(),
                    },
                );
                resumed += 1;
            }
            RunState::Generating | RunState::Dispatching { .. } => {
                tracing::warn!(
                    run_id = %record.run_id,
                    state = record.state.name(),
                    "Failing run interrupted mid-step"
                );
                if let Err(e) = state
                    .runs
                    .transition_from(
                        &record.run_id,
                        record.state.name(),
                        RunState::Failed {
                            error: INTERRUPTED_ERROR.to_string(),
                        },
                    )
                    .await
                {
                    tracing::error!(run_id = %record.run_id, error = %e, "Failed to record interruption");
                }
            }
            RunState::Queued | RunState::Completed { .. } | RunState::Failed { .. } => {}
        }
    }

    let requeued_count = requeued.len();
    for record in requeued {
        super::submit(
            state,
            Task::StartRun {
                run_id: record.run_id,
                submitter: record.submitter,
            },
        );
    }

    tracing::info!(
        resumed,
        requeued = requeued_count,
        "Startup recovery complete"
    );
}
