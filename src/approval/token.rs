use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use crate::error::{AppError, Result};
use crate::workflow::types::Variant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Pending,
    Resolved,
    Expired,
}

/// Single-use identifier pairing a reviewer's decision with one suspended run.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationToken {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub state: TokenState,
}

impl CorrelationToken {
    pub fn timeout(&self) -> Duration {
        (self.deadline - self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// What the reviewer sent, delivered to the suspended run.
#[derive(Debug)]
enum Resolution {
    Approved(Variant),
    Rejected(String),
}

struct TokenEntry {
    token: CorrelationToken,
    settled_at: Option<DateTime<Utc>>,
    sender: Option<oneshot::Sender<Resolution>>,
    // Taken by the run that suspends on the token
    receiver: Option<oneshot::Receiver<Resolution>>,
}

impl TokenEntry {
    fn settle(&mut self, state: TokenState) -> Option<oneshot::Sender<Resolution>> {
        self.token.state = state;
        self.settled_at = Some(Utc::now());
        self.sender.take()
    }
}

/// In-memory registry of correlation tokens.
///
/// A token accepts exactly one resolution. Settled tokens stay behind as
/// tombstones so late or repeated resolutions keep being rejected, until
/// [`TokenRegistry::sweep`] purges them.
#[derive(Default)]
pub struct TokenRegistry {
    entries: Mutex<HashMap<String, TokenEntry>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh pending token.
    pub async fn create(&self, timeout: Duration) -> Result<CorrelationToken> {
        let id = format!("tok_{}", uuid::Uuid::new_v4().simple());
        let created_at = Utc::now();
        let deadline = created_at
            + chrono::Duration::from_std(timeout)
                .map_err(|e| AppError::Internal(format!("Invalid token timeout: {e}")))?;
        Ok(self.register(id, created_at, deadline).await)
    }

    /// Re-register a token persisted before a restart, keeping its original deadline.
    pub async fn restore(
        &self,
        id: &str,
        created_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> CorrelationToken {
        self.register(id.to_string(), created_at, deadline).await
    }

    async fn register(
        &self,
        id: String,
        created_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> CorrelationToken {
        let (sender, receiver) = oneshot::channel();
        let token = CorrelationToken {
            id: id.clone(),
            created_at,
            deadline,
            state: TokenState::Pending,
        };

        let mut entries = self.entries.lock().await;
        entries.insert(
            id,
            TokenEntry {
                token: token.clone(),
                settled_at: None,
                sender: Some(sender),
                receiver: Some(receiver),
            },
        );

        token
    }

    /// Resolve a pending token with the reviewer's raw choice.
    ///
    /// A missing or out-of-range variant burns the token and fails the
    /// waiting run; the token cannot be resolved again afterwards.
    pub async fn resolve(&self, token_id: &str, raw_variant: Option<i64>) -> Result<Variant> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(token_id)
            .ok_or_else(|| AppError::TokenNotFound(token_id.to_string()))?;

        match entry.token.state {
            TokenState::Resolved => {
                return Err(AppError::TokenAlreadyResolved(token_id.to_string()));
            }
            TokenState::Expired => return Err(AppError::TokenExpired(token_id.to_string())),
            TokenState::Pending => {}
        }

        if Utc::now() >= entry.token.deadline {
            // Dropping the sender wakes the waiter, which reports the timeout
            entry.settle(TokenState::Expired);
            return Err(AppError::TokenExpired(token_id.to_string()));
        }

        let variant = raw_variant.and_then(Variant::from_raw);
        let sender = entry.settle(TokenState::Resolved);

        match variant {
            Some(variant) => {
                if let Some(sender) = sender {
                    if sender.send(Resolution::Approved(variant)).is_err() {
                        tracing::warn!(token_id, "Token resolved but no run is waiting on it");
                    }
                }
                tracing::info!(token_id, variant = %variant, "Approval token resolved");
                Ok(variant)
            }
            None => {
                let reason = match raw_variant {
                    Some(raw) => format!("variant {raw} is not 1 or 2"),
                    None => "no valid variant was provided".to_string(),
                };
                if let Some(sender) = sender {
                    let _ = sender.send(Resolution::Rejected(reason.clone()));
                }
                tracing::warn!(token_id, reason = %reason, "Approval token burned by malformed decision");
                Err(AppError::ApprovalRejected(reason))
            }
        }
    }

    /// Suspend until the token is resolved or its deadline passes.
    ///
    /// The wait is a plain future: no thread is held while suspended.
    pub async fn wait(&self, token_id: &str) -> Result<Variant> {
        let (deadline, timeout_secs, mut receiver) = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .get_mut(token_id)
                .ok_or_else(|| AppError::TokenNotFound(token_id.to_string()))?;
            let receiver = entry.receiver.take().ok_or_else(|| {
                AppError::Internal(format!("A run is already waiting on token {token_id}"))
            })?;
            (entry.token.deadline, entry.token.timeout().as_secs(), receiver)
        };

        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        let received = tokio::select! {
            received = &mut receiver => Some(received),
            _ = tokio::time::sleep(remaining) => None,
        };

        let resolution = match received {
            Some(received) => received.ok(),
            None => {
                let expired_now = {
                    let mut entries = self.entries.lock().await;
                    match entries.get_mut(token_id) {
                        Some(entry) if entry.token.state == TokenState::Pending => {
                            entry.settle(TokenState::Expired);
                            true
                        }
                        _ => false,
                    }
                };
                if expired_now {
                    None
                } else {
                    // A resolution won the race and has already been sent
                    receiver.try_recv().ok()
                }
            }
        };

        match resolution {
            Some(Resolution::Approved(variant)) => Ok(variant),
            Some(Resolution::Rejected(reason)) => Err(AppError::ApprovalRejected(reason)),
            None => {
                tracing::warn!(token_id, "Approval token expired");
                Err(AppError::ApprovalTimeout(timeout_secs))
            }
        }
    }

    pub async fn get(&self, token_id: &str) -> Option<CorrelationToken> {
        let entries = self.entries.lock().await;
        entries.get(token_id).map(|e| e.token.clone())
    }

    /// Expire overdue pending tokens and drop tombstones settled longer than
    /// `retention` ago. Returns the number of entries removed.
    pub async fn sweep(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let mut entries = self.entries.lock().await;

        for entry in entries.values_mut() {
            if entry.token.state == TokenState::Pending && now >= entry.token.deadline {
                entry.settle(TokenState::Expired);
            }
        }

        let before = entries.len();
        entries.retain(|_, entry| match entry.settled_at {
            Some(settled_at) => now - settled_at < retention,
            None => true,
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
