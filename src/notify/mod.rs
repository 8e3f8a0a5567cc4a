pub mod slack;

use async_trait::async_trait;

use crate::error::Result;

/// Everything the reviewer needs to pick a candidate.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub variant1_url: String,
    pub variant2_url: String,
    pub token_id: String,
    pub prompt: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the approval request once. Failures are not retried here.
    async fn notify(&self, request: &ApprovalRequest) -> Result<()>;
}
