use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::workflow::types::{RunRecord, RunState};

/// Durable run records, one JSON file per run under `{state_dir}/runs`.
///
/// Reads are served from memory; every mutation is written to disk
/// (temp file + rename) before it becomes visible.
pub struct RunStore {
    dir: PathBuf,
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl RunStore {
    /// Open the store, loading every persisted run.
    pub async fn open(state_dir: &Path) -> Result<Self> {
        let dir = state_dir.join("runs");
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Store(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let mut runs = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<RunRecord>(&bytes) {
                Ok(record) => {
                    runs.insert(record.run_id.clone(), record);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable run record");
                }
            }
        }

        tracing::info!(dir = %dir.display(), count = runs.len(), "Run store opened");

        Ok(Self {
            dir,
            runs: RwLock::new(runs),
        })
    }

    pub async fn insert(&self, record: RunRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&record.run_id) {
            return Err(AppError::Store(format!("Run {} already exists", record.run_id)));
        }
        self.persist(&record).await?;
        runs.insert(record.run_id.clone(), record);
        Ok(())
    }

    pub async fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.read().await.get(run_id).cloned()
    }

    /// Move a run to `state`. Terminal runs are immutable.
    pub async fn transition(&self, run_id: &str, state: RunState) -> Result<RunRecord> {
        self.apply(run_id, None, state).await
    }

    /// Move a run to `state` only if it is still in the state named `expected`.
    ///
    /// The check and the write happen under one lock, so callers acting on an
    /// older snapshot cannot overwrite a run that has since moved on.
    pub async fn transition_from(
        &self,
        run_id: &str,
        expected: &str,
        state: RunState,
    ) -> Result<RunRecord> {
        self.apply(run_id, Some(expected), state).await
    }

    async fn apply(
        &self,
        run_id: &str,
        expected: Option<&str>,
        state: RunState,
    ) -> Result<RunRecord> {
        let mut runs = self.runs.write().await;
        let current = runs
            .get(run_id)
            .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;

        if current.state.is_terminal() {
            return Err(AppError::Store(format!(
                "Run {run_id} is already {}",
                current.state.name()
            )));
        }

        if let Some(expected) = expected {
            if current.state.name() != expected {
                return Err(AppError::Store(format!(
                    "Run {run_id} is {}, not {expected}",
                    current.state.name()
                )));
            }
        }

        let mut updated = current.clone();
        updated.state = state;
        updated.updated_at = Utc::now();

        self.persist(&updated).await?;
        runs.insert(run_id.to_string(), updated.clone());

        tracing::debug!(run_id, state = updated.state.name(), "Run transitioned");
        Ok(updated)
    }

    pub async fn list(&self) -> Vec<RunRecord> {
        let runs = self.runs.read().await;
        let mut list: Vec<RunRecord> = runs.values().cloned().collect();
        list.sort_by_key(|r| r.created_at);
        list
    }

    async fn persist(&self, record: &RunRecord) -> Result<()> {
        let path = self.dir.join(format!("{}.json", record.run_id));
        let tmp = self.dir.join(format!("{}.json.tmp", record.run_id));
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            AppError::Store(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            AppError::Store(format!("Failed to move {} into place: {e}", path.display()))
        })?;
        Ok(())
    }
}
