use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Html;
use serde::Deserialize;

use crate::approval::signature::verify_signature;
use crate::approval::ApprovalDecision;
use crate::error::AppError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub variant: Option<String>,
}

/// `GET /endpoints/:token_id?variant=N`, the target of the Slack buttons.
pub async fn handle_approval_link(
    State(state): State<Arc<AppState>>,
    Path(token_id): Path<String>,
    Query(query): Query<LinkQuery>,
) -> (StatusCode, Html<String>) {
    let raw_variant = query
        .variant
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok());

    match state.tokens.resolve(&token_id, raw_variant).await {
        Ok(variant) => (
            StatusCode::OK,
            page(
                "Choice recorded",
                &format!("Thanks! Meme variant {variant} was selected."),
            ),
        ),
        Err(e) => {
            tracing::warn!(token_id = %token_id, error = %e, "Approval link rejected");
            (status_for(&e), page("Choice not recorded", &e.to_string()))
        }
    }
}

/// `POST /slack/actions`, Slack's interactivity request URL.
pub async fn handle_slack_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = state.config.signing_secret() {
        let timestamp = headers
            .get("x-slack-request-timestamp")
            .and_then(|v| v.to_str().ok());
        let signature = headers.get("x-slack-signature").and_then(|v| v.to_str().ok());

        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            tracing::warn!("Missing Slack signature headers");
            return StatusCode::UNAUTHORIZED;
        };

        let now = chrono::Utc::now().timestamp();
        if let Err(e) = verify_signature(secret, timestamp, &body, signature, now) {
            tracing::warn!(error = %e, "Slack signature verification failed");
            return StatusCode::UNAUTHORIZED;
        }
    }

    // The raw body was needed for the signature; decode the form only now
    let form: SlackActionForm = match serde_urlencoded::from_bytes(&body) {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!(error = %e, "Slack action request without payload field");
            return StatusCode::BAD_REQUEST;
        }
    };

    let payload: InteractionPayload = match serde_json::from_str(&form.payload) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse Slack interaction payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    if payload.kind != "block_actions" {
        tracing::debug!(kind = %payload.kind, "Ignoring Slack interaction");
        return StatusCode::OK;
    }

    let Some(action) = payload
        .actions
        .iter()
        .find(|a| a.action_id.starts_with("meme_approve_"))
    else {
        return StatusCode::OK;
    };

    let decision: ApprovalDecision = match action
        .value
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
    {
        Ok(Some(d)) => d,
        Ok(None) | Err(_) => {
            tracing::warn!(action_id = %action.action_id, "Approval button carried no decision");
            return StatusCode::BAD_REQUEST;
        }
    };

    match state
        .tokens
        .resolve(&decision.token_id, decision.chosen_variant)
        .await
    {
        Ok(variant) => {
            tracing::info!(
                token_id = %decision.token_id,
                variant = %variant,
                user = ?payload.user.as_ref().map(|u| &u.id),
                "Approval received from Slack"
            );
        }
        // Url buttons also open the approval link, so a duplicate is expected
        Err(AppError::TokenAlreadyResolved(_)) => {
            tracing::debug!(token_id = %decision.token_id, "Duplicate Slack approval ignored");
        }
        Err(e) => {
            tracing::warn!(token_id = %decision.token_id, error = %e, "Slack approval rejected");
        }
    }

    StatusCode::OK
}

/// `application/x-www-form-urlencoded` body Slack posts to the action URL.
#[derive(Debug, Deserialize)]
struct SlackActionForm {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    actions: Vec<ActionPayload>,
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct ActionPayload {
    action_id: String,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::TokenNotFound(_) => StatusCode::NOT_FOUND,
        AppError::TokenAlreadyResolved(_) => StatusCode::CONFLICT,
        AppError::TokenExpired(_) => StatusCode::GONE,
        AppError::ApprovalRejected(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>",
        escape_html(message)
    ))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
