//! Job domain types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status token the backend uses for a finished job
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Status token the backend uses for a job that raised
pub const STATUS_FAILURE: &str = "FAILURE";

/// Status a job carries before its first poll answers
pub const STATUS_SUBMITTED: &str = "SUBMITTED";

/// Opaque backend status token
///
/// Only [`STATUS_SUCCESS`] and [`STATUS_FAILURE`] mean anything to the client;
/// every other spelling is "still running".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStatus(String);

impl JobStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_success(&self) -> bool {
        self.0 == STATUS_SUCCESS
    }

    pub fn is_failure(&self) -> bool {
        self.0 == STATUS_FAILURE
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a finished job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobResult {
    PullRequest { url: String },
    Failure { message: String },
}

/// One submitted transformation task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: String,
    status: JobStatus,
    result: Option<JobResult>,
}

impl Job {
    /// A job the backend has just accepted
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::new(STATUS_SUBMITTED),
            result: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    /// Record the latest poll answer
    pub(crate) fn refresh(&mut self, status: JobStatus, result: Option<JobResult>) {
        self.status = status;
        self.result = result;
    }
}
