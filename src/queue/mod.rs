pub mod gate;
pub mod startup;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use crate::server::AppState;
use crate::workflow;

use gate::AdmissionPermit;
use task::Task;

/// How often settled approval tokens are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Queue a task behind any in-flight run of the same submitter and process it
/// in the background once admitted.
pub fn submit(state: &Arc<AppState>, task: Task) {
    let pending = state.gate.acquire(task.submitter());

    match pending.queue_position() {
        Some(position) => tracing::info!(
            task = %task.description(),
            submitter = task.submitter(),
            position,
            "Task queued behind in-flight run"
        ),
        None => tracing::info!(task = %task.description(), "Enqueuing task"),
    }

    let state = Arc::clone(state);
    tokio::spawn(async move {
        match pending.wait().await {
            Ok(permit) => process(&state, task, permit).await,
            Err(e) => {
                tracing::error!(task = %task.description(), error = %e, "Task was never admitted");
            }
        }
    });
}

async fn process(state: &AppState, task: Task, _permit: AdmissionPermit) {
    tracing::info!(run_id = task.run_id(), task = %task.description(), "Processing task");

    let result = match &task {
        Task::StartRun { run_id, .. } => workflow::meme::run_meme_workflow(state, run_id).await,
        Task::ResumeApproval { run_id, .. } => workflow::meme::resume_approval(state, run_id).await,
    };

    match result {
        Ok(outcome) => {
            tracing::info!(
                task = %task.description(),
                outcome = ?outcome,
                "Task completed"
            );
        }
        Err(e) => {
            tracing::error!(
                task = %task.description(),
                error = %e,
                "Task failed"
            );
        }
    }
}

/// Periodically expire orphaned tokens and purge settled ones.
pub async fn run_token_sweeper(state: Arc<AppState>) {
    let retention = state.config.workflow.token_retention();
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    tracing::info!(retention_secs = retention.as_secs(), "Token sweeper started");

    loop {
        interval.tick().await;
        let removed = state.tokens.sweep(retention).await;
        if removed > 0 {
            tracing::debug!(removed, "Purged settled approval tokens");
        }
    }
}
