use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chain::ChainPolicy;
use crate::slurm::JobId;

/// Where a chain element got to
///
/// Elements move PENDING -> RENDERED -> WRITTEN -> SUBMITTED and end up CHAINED (their job id
/// feeds the next element) or FAILED. Elements a fail-fast chain never reached stay PENDING.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElementState {
    Pending,
    Rendered,
    Written,
    Submitted,
    Chained,
    Failed,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match self {
            ElementState::Pending => "PENDING",
            ElementState::Rendered => "RENDERED",
            ElementState::Written => "WRITTEN",
            ElementState::Submitted => "SUBMITTED",
            ElementState::Chained => "CHAINED",
            ElementState::Failed => "FAILED",
        };
        write!(f, "{state}")
    }
}

/// One submission attempt; `job_id` is set only when the scheduler accepted the script
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub index: usize,
    pub script_path: PathBuf,
    pub state: ElementState,
    pub dependency: Option<JobId>,
    pub job_id: Option<JobId>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SubmissionRecord {
    pub fn pending(index: usize, script_path: PathBuf) -> Self {
        SubmissionRecord {
            index,
            script_path,
            state: ElementState::Pending,
            dependency: None,
            job_id: None,
            submitted_at: None,
            error: None,
            warnings: Vec::new(),
        }
    }
}

/// Everything a run did, printed as JSON so an operator can resubmit by hand
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub policy: ChainPolicy,
    pub records: Vec<SubmissionRecord>,
}

impl ChainReport {
    pub fn states(&self) -> Vec<ElementState> {
        self.records.iter().map(|record| record.state).collect()
    }

    /// Job id of the last element that made it into the queue
    pub fn last_job_id(&self) -> Option<&JobId> {
        self.records.iter().rev().find_map(|record| record.job_id.as_ref())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SubmissionRecord> {
        self.records.iter().filter(|record| record.state == ElementState::Failed)
    }
}
