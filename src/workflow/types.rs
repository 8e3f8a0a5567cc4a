use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the two meme candidates offered to the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Variant {
    One,
    Two,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::One, Variant::Two];

    pub fn number(self) -> u8 {
        match self {
            Variant::One => 1,
            Variant::Two => 2,
        }
    }

    /// Parse a raw reviewer-supplied value. Anything other than 1 or 2 is `None`.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Variant::One),
            2 => Some(Variant::Two),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Variant {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Variant::from_raw(value as i64).ok_or_else(|| format!("invalid variant {value}"))
    }
}

impl From<Variant> for u8 {
    fn from(v: Variant) -> Self {
        v.number()
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A rendered and re-hosted candidate image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub image_url: String,
}

/// The pair of candidates produced by the fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidates {
    pub variant1_url: String,
    pub variant2_url: String,
}

/// Final outcome of an approved run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub variant1_reference: String,
    pub variant2_reference: String,
    pub selected_variant: Variant,
    pub approved: bool,
}

impl WorkflowResult {
    pub fn approved(candidates: &Candidates, selected: Variant) -> Self {
        Self {
            variant1_reference: candidates.variant1_url.clone(),
            variant2_reference: candidates.variant2_url.clone(),
            selected_variant: selected,
            approved: true,
        }
    }
}

/// Persisted state machine of a run. Every transition is written to the
/// run store before the next step starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// Waiting for the submitter's admission permit.
    Queued,
    Generating,
    Dispatching {
        candidates: Candidates,
        token_id: String,
    },
    AwaitingApproval {
        candidates: Candidates,
        token_id: String,
        deadline: DateTime<Utc>,
    },
    Completed {
        result: WorkflowResult,
    },
    Failed {
        error: String,
    },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed { .. } | RunState::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Generating => "generating",
            RunState::Dispatching { .. } => "dispatching",
            RunState::AwaitingApproval { .. } => "awaiting_approval",
            RunState::Completed { .. } => "completed",
            RunState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub prompt: String,
    pub submitter: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RunState,
}

impl RunRecord {
    pub fn new(prompt: &str, submitter: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: format!("run_{}", uuid::Uuid::new_v4().simple()),
            prompt: prompt.to_string(),
            submitter: submitter.to_string(),
            created_at: now,
            updated_at: now,
            state: RunState::Queued,
        }
    }
}

/// What a polling caller sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Complete(WorkflowResult),
    Error { error: String },
}
