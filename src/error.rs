use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image generation failed: {0}")]
    Generation(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Slack dispatch failed: {0}")]
    Dispatch(String),

    #[error("No approval received within {0} seconds")]
    ApprovalTimeout(u64),

    #[error("Approval rejected: {0}")]
    ApprovalRejected(String),

    #[error("Unknown approval token: {0}")]
    TokenNotFound(String),

    #[error("Approval token {0} was already resolved")]
    TokenAlreadyResolved(String),

    #[error("Approval token {0} has expired")]
    TokenExpired(String),

    #[error("Request verification failed: {0}")]
    SignatureVerification(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
