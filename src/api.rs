use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::queue::{self, task::Task};
use crate::server::AppState;
use crate::workflow::status::get_status;
use crate::workflow::types::RunRecord;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    pub prompt: Option<String>,
    /// Admission key; runs with the same key execute one at a time.
    pub submitter: Option<String>,
}

/// `POST /api/generate-meme`
pub async fn submit_run(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    // An empty or unparsable body is treated like a missing prompt
    let request: SubmitRequest = serde_json::from_slice(&body).unwrap_or_default();

    let prompt = match request.prompt.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Prompt is required" })),
            );
        }
    };

    let submitter = request
        .submitter
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.config.workflow.default_submitter.clone());

    let record = RunRecord::new(&prompt, &submitter);
    let run_id = record.run_id.clone();

    if let Err(e) = state.runs.insert(record).await {
        tracing::error!(error = %e, "Failed to persist new run");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        );
    }

    tracing::info!(run_id = %run_id, submitter = %submitter, "Run submitted");

    queue::submit(
        &state,
        Task::StartRun {
            run_id: run_id.clone(),
            submitter,
        },
    );

    (
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "runId": run_id })),
    )
}

/// `GET /api/generate-meme/result/:run_id`
pub async fn run_status(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match get_status(&state.runs, &run_id).await {
        Ok(status) => match serde_json::to_value(&status) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => internal_error(&AppError::from(e)),
        },
        Err(e @ AppError::RunNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "error": e.to_string() })),
        ),
        Err(e) => internal_error(&e),
    }
}

fn internal_error(e: &AppError) -> (StatusCode, Json<Value>) {
    tracing::error!(error = %e, "Status lookup failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "error": e.to_string() })),
    )
}
