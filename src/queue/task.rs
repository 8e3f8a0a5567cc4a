/// Work items admitted through the per-submitter gate.
#[derive(Debug, Clone)]
pub enum Task {
    /// Generate, notify and wait for approval on a freshly submitted run.
    StartRun { run_id: String, submitter: String },
    /// Re-enter the approval wait for a run suspended before a restart.
    ResumeApproval { run_id: String, submitter: String },
}

impl Task {
    pub fn run_id(&self) -> &str {
        match self {
            Task::StartRun { run_id, .. } => run_id,
            Task::ResumeApproval { run_id, .. } => run_id,
        }
    }

    pub fn submitter(&self) -> &str {
        match self {
            Task::StartRun { submitter, .. } => submitter,
            Task::ResumeApproval { submitter, .. } => submitter,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Task::StartRun { run_id, submitter } => {
                format!("Start run {run_id} for {submitter}")
            }
            Task::ResumeApproval { run_id, submitter } => {
                format!("Resume approval wait of run {run_id} for {submitter}")
            }
        }
    }
}
