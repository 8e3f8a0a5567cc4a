use crate::error::{AppError, Result};
use crate::store::RunStore;
use crate::workflow::types::{RunState, RunStatus};

/// Project a run onto what a polling caller sees. Read-only.
pub async fn get_status(runs: &RunStore, run_id: &str) -> Result<RunStatus> {
    let record = runs
        .get(run_id)
        .await
        .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;

    Ok(match record.state {
        RunState::Completed { result } => RunStatus::Complete(result),
        RunState::Failed { error } => RunStatus::Error { error },
        _ => RunStatus::Pending,
    })
}
