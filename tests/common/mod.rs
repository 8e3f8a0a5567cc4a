#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use memepick::config::{
    AppConfig, GeminiConfig, PublicAppConfig, ServerConfig, SlackConfig, UploadThingConfig,
    WorkflowConfig,
};
use memepick::error::{AppError, Result};
use memepick::generator::ImageGenerator;
use memepick::notify::{ApprovalRequest, Notifier};
use memepick::server::AppState;
use memepick::workflow::types::GenerationResult;

pub fn test_config(state_dir: &Path, approval_timeout_secs: u64) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        gemini: GeminiConfig {
            api_key: "test-gemini-key".to_string(),
            ..GeminiConfig::default()
        },
        uploadthing: UploadThingConfig {
            token: "dGVzdA==".to_string(),
            ..UploadThingConfig::default()
        },
        slack: SlackConfig {
            webhook_url: "http://127.0.0.1:9/hook".to_string(),
            ..SlackConfig::default()
        },
        app: PublicAppConfig {
            public_url: "https://memes.test".to_string(),
        },
        workflow: WorkflowConfig {
            approval_timeout_secs,
            state_dir: state_dir.to_path_buf(),
            ..WorkflowConfig::default()
        },
    }
}

/// Generator returning numbered URLs; optionally failing one call.
pub struct FakeGenerator {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    delay: Duration,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on_call == Some(call) {
            return Err(AppError::Generation(format!(
                "no image data for {prompt}"
            )));
        }
        Ok(GenerationResult {
            image_url: format!("https://cdn.test/u{call}.png"),
        })
    }
}

/// Notifier that hands every request to the test through a channel.
pub struct FakeNotifier {
    sent: mpsc::UnboundedSender<ApprovalRequest>,
    fail: bool,
    pub history: Mutex<Vec<ApprovalRequest>>,
}

impl FakeNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sent: tx,
                fail: false,
                history: Mutex::new(Vec::new()),
            },
            rx,
        )
    }

    pub fn failing() -> (Self, mpsc::UnboundedReceiver<ApprovalRequest>) {
        let (mut notifier, rx) = Self::new();
        notifier.fail = true;
        (notifier, rx)
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, request: &ApprovalRequest) -> Result<()> {
        if self.fail {
            return Err(AppError::Dispatch("Slack returned 500".to_string()));
        }
        self.history.lock().await.push(request.clone());
        let _ = self.sent.send(request.clone());
        Ok(())
    }
}

pub async fn test_state(
    config: AppConfig,
    generator: Arc<dyn ImageGenerator>,
    notifier: Arc<dyn Notifier>,
) -> Arc<AppState> {
    Arc::new(
        AppState::with_components(config, generator, notifier)
            .await
            .unwrap(),
    )
}

/// Receive the next approval request or fail the test.
pub async fn next_request(rx: &mut mpsc::UnboundedReceiver<ApprovalRequest>) -> ApprovalRequest {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for approval request")
        .expect("notifier channel closed")
}
