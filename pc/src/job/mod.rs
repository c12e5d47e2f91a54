//! Job submission and status polling
//!
//! [`JobOrchestrator`] submits work and owns the single live watch;
//! [`JobPoller`] is the polling state machine that watch runs.

mod orchestrator;
mod poller;
mod types;

pub use orchestrator::JobOrchestrator;
pub use poller::{GENERIC_FAILURE, JobPoller, NO_PULL_REQUEST, PollOutcome, PollSettings, PollState, Tick, classify};
pub use types::{Job, JobResult, JobStatus, STATUS_FAILURE, STATUS_SUBMITTED, STATUS_SUCCESS};
