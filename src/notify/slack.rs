use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::approval::ApprovalDecision;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::notify::{ApprovalRequest, Notifier};
use crate::workflow::types::Variant;

const TITLE: &str = "Choose the funniest meme";

/// Posts approval requests to a Slack incoming webhook.
pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
    public_url: String,
}

impl SlackNotifier {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.slack.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build Slack HTTP client: {e}")))?;

        Ok(Self {
            client,
            webhook_url: config.slack.webhook_url.clone(),
            public_url: config.public_url().to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, request: &ApprovalRequest) -> Result<()> {
        let message = approval_message(request, &self.public_url);
        let body = serde_json::to_vec(&message)?;

        tracing::info!(
            token_id = %request.token_id,
            message_bytes = body.len(),
            "Sending Slack approval message"
        );

        let response = self
            .client
            .post(&self.webhook_url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error sending Slack notification");
                AppError::Dispatch(format!("Request to Slack failed: {e}"))
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        tracing::info!(status = %status, response = %text, "Slack response received");

        if !status.is_success() {
            return Err(AppError::Dispatch(format!(
                "Slack returned {status}: {text}"
            )));
        }

        Ok(())
    }
}

// --- Block Kit types ---

#[derive(Debug, Serialize)]
pub struct SlackMessage {
    pub text: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: TextObject,
    },
    Section {
        text: TextObject,
    },
    Divider,
    Image {
        image_url: String,
        alt_text: String,
        title: TextObject,
    },
    Actions {
        elements: Vec<Button>,
    },
}

#[derive(Debug, Serialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<bool>,
}

impl TextObject {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: "plain_text",
            text: text.into(),
            emoji: Some(true),
        }
    }

    fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            kind: "mrkdwn",
            text: text.into(),
            emoji: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: TextObject,
    pub style: &'static str,
    pub value: String,
    pub action_id: String,
    pub url: String,
}

/// Link a reviewer follows to pick `variant` for `token_id`.
pub fn approval_link(public_url: &str, token_id: &str, variant: Variant) -> String {
    format!(
        "{}/endpoints/{}?variant={}",
        public_url.trim_end_matches('/'),
        urlencoding::encode(token_id),
        variant
    )
}

/// Build the interactive approval message.
///
/// Both buttons carry the same token and distinct variants, so the receiving
/// endpoint can resolve the token from the click alone.
pub fn approval_message(request: &ApprovalRequest, public_url: &str) -> SlackMessage {
    let urls = [&request.variant1_url, &request.variant2_url];

    let mut blocks = vec![
        Block::Header {
            text: TextObject::plain(format!("🎭 {TITLE}")),
        },
        Block::Section {
            text: TextObject::mrkdwn(format!("*Prompt:*\n{}", request.prompt)),
        },
        Block::Divider,
        Block::Section {
            text: TextObject::mrkdwn(format!(
                "*Meme Variants:*\n1. {}\n2. {}",
                request.variant1_url, request.variant2_url
            )),
        },
    ];

    for (variant, url) in Variant::ALL.iter().zip(urls) {
        blocks.push(Block::Image {
            image_url: url.clone(),
            alt_text: format!("Meme variant {variant}"),
            title: TextObject::plain(format!("Variant {variant}")),
        });
    }

    let elements = Variant::ALL
        .iter()
        .map(|&variant| {
            let decision = ApprovalDecision {
                token_id: request.token_id.clone(),
                chosen_variant: Some(variant.number() as i64),
            };
            Button {
                kind: "button",
                text: TextObject::plain(format!("Select Variant {variant}")),
                style: "primary",
                // Serializing a two-field struct cannot fail
                value: serde_json::to_string(&decision).unwrap_or_default(),
                action_id: format!("meme_approve_{variant}"),
                url: approval_link(public_url, &request.token_id, variant),
            }
        })
        .collect();

    blocks.push(Block::Actions { elements });

    SlackMessage {
        text: TITLE.to_string(),
        blocks,
    }
}
