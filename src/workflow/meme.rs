use crate::error::{AppError, Result};
use crate::notify::ApprovalRequest;
use crate::server::AppState;
use crate::workflow::types::{Candidates, RunState, WorkflowResult};

/// Drive a queued run to completion: generate two candidates, ask a reviewer
/// on Slack, and wait for the choice.
///
/// Any failure fails the whole run; no partial result is ever recorded.
pub async fn run_meme_workflow(state: &AppState, run_id: &str) -> Result<WorkflowResult> {
    let record = state
        .runs
        .get(run_id)
        .await
        .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;

    if record.state != RunState::Queued {
        return Err(AppError::Internal(format!(
            "Run {run_id} cannot start from state {}",
            record.state.name()
        )));
    }

    let outcome = generate_and_await(state, run_id, &record.prompt).await;
    finish(state, run_id, outcome).await
}

/// Re-enter the approval wait of a run suspended before a restart.
/// The token must already be restored in the registry.
pub async fn resume_approval(state: &AppState, run_id: &str) -> Result<WorkflowResult> {
    let record = state
        .runs
        .get(run_id)
        .await
        .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;

    let (candidates, token_id) = match record.state {
        RunState::AwaitingApproval {
            candidates,
            token_id,
            ..
        } => (candidates, token_id),
        other => {
            return Err(AppError::Internal(format!(
                "Run {run_id} is not awaiting approval (state {})",
                other.name()
            )));
        }
    };

    let outcome = await_decision(state, run_id, &candidates, &token_id).await;
    finish(state, run_id, outcome).await
}

async fn generate_and_await(state: &AppState, run_id: &str, prompt: &str) -> Result<WorkflowResult> {
    state.runs.transition(run_id, RunState::Generating).await?;

    // Two independent generations of the same prompt, joined all-or-nothing
    tracing::info!(run_id, "Generating meme candidates");
    let (first, second) = tokio::try_join!(
        state.generator.generate(prompt),
        state.generator.generate(prompt),
    )?;

    let candidates = Candidates {
        variant1_url: first.image_url,
        variant2_url: second.image_url,
    };

    let token = state
        .tokens
        .create(state.config.workflow.approval_timeout())
        .await?;

    state
        .runs
        .transition(
            run_id,
            RunState::Dispatching {
                candidates: candidates.clone(),
                token_id: token.id.clone(),
            },
        )
        .await?;

    tracing::info!(
        run_id,
        token_id = %token.id,
        variant1 = %candidates.variant1_url,
        variant2 = %candidates.variant2_url,
        "Sending Slack notification"
    );

    // On failure the token is orphaned and expires on its own
    state
        .notifier
        .notify(&ApprovalRequest {
            variant1_url: candidates.variant1_url.clone(),
            variant2_url: candidates.variant2_url.clone(),
            token_id: token.id.clone(),
            prompt: prompt.to_string(),
        })
        .await?;

    state
        .runs
        .transition(
            run_id,
            RunState::AwaitingApproval {
                candidates: candidates.clone(),
                token_id: token.id.clone(),
                deadline: token.deadline,
            },
        )
        .await?;

    tracing::info!(run_id, token_id = %token.id, deadline = %token.deadline, "Slack notification sent, waiting for approval");

    await_decision(state, run_id, &candidates, &token.id).await
}

async fn await_decision(
    state: &AppState,
    run_id: &str,
    candidates: &Candidates,
    token_id: &str,
) -> Result<WorkflowResult> {
    let variant = state.tokens.wait(token_id).await?;
    tracing::info!(run_id, token_id, variant = %variant, "Meme variant chosen");
    Ok(WorkflowResult::approved(candidates, variant))
}

async fn finish(
    state: &AppState,
    run_id: &str,
    outcome: Result<WorkflowResult>,
) -> Result<WorkflowResult> {
    match outcome {
        Ok(result) => {
            state
                .runs
                .transition(
                    run_id,
                    RunState::Completed {
                        result: result.clone(),
                    },
                )
                .await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(store_err) = state
                .runs
                .transition(
                    run_id,
                    RunState::Failed {
                        error: e.to_string(),
                    },
                )
                .await
            {
                tracing::error!(run_id, error = %store_err, "Failed to record run failure");
            }
            Err(e)
        }
    }
}
