//! JobOrchestrator - submit a job and keep exactly one watch alive
//!
//! The orchestrator owns a single [`PollHandle`]. Starting a submission (or a
//! watch on an existing id) cancels the handle before anything else happens, so
//! only the newest job is ever polled. Abandoned jobs keep running server-side;
//! nothing is sent to the backend when a watch is dropped.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::poller::{JobPoller, PollOutcome, PollSettings};
use super::types::Job;
use crate::api::{Backend, ClientError, SubmitRequest};
use crate::auth::AuthGate;
use crate::status::{StatusBoard, StatusKind, StatusReporter};

/// The live watch on the current job
struct PollHandle {
    job_id: String,
    generation: u64,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    fn cancel(self) {
        debug!(job_id = %self.job_id, generation = self.generation, "PollHandle::cancel: called");
        self.task.abort();
    }
}

/// Submits transformation jobs and watches the current one
pub struct JobOrchestrator {
    backend: Arc<dyn Backend>,
    gate: AuthGate,
    board: StatusBoard,
    settings: PollSettings,
    current: Mutex<Option<PollHandle>>,
}

impl JobOrchestrator {
    pub fn new(backend: Arc<dyn Backend>, gate: AuthGate, board: StatusBoard, settings: PollSettings) -> Self {
        debug!(?settings, "JobOrchestrator::new: called");
        Self {
            backend,
            gate,
            board,
            settings,
            current: Mutex::new(None),
        }
    }

    /// The status line this orchestrator publishes to
    pub fn status(&self) -> &StatusBoard {
        &self.board
    }

    /// Submit a job and start watching it
    ///
    /// Returns as soon as the backend has assigned a job id; the watch continues in
    /// the background. Precondition failures leave any running watch untouched.
    pub async fn submit(&self, repo: &str, goal: &str) -> Result<Job, ClientError> {
        debug!(%repo, goal_len = goal.len(), "submit: called");
        if repo.trim().is_empty() {
            return Err(ClientError::validation("Please enter a GitHub repository URL."));
        }
        if goal.trim().is_empty() {
            return Err(ClientError::validation("Please enter a goal for the transformation."));
        }
        self.gate.check()?;

        let mut current = self.current.lock().await;
        let reporter = self.board.reporter();
        if let Some(previous) = current.take() {
            info!(job_id = %previous.job_id, "Abandoning watch for new submission");
            previous.cancel();
        }
        reporter.publish(StatusKind::Submitting, format!("Submitting job for {}...", repo));

        let request = SubmitRequest {
            repo_url: repo.to_string(),
            task_description: goal.to_string(),
        };
        let response = match self.gate.observe(self.backend.submit(request).await) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Submission failed");
                Self::report_failure(&reporter, &e, &self.gate);
                return Err(e);
            }
        };

        let Some(job_id) = response.job_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) else {
            let e = ClientError::MalformedResponse("submit response has no job_id".to_string());
            warn!(error = %e, "Submission failed");
            Self::report_failure(&reporter, &e, &self.gate);
            return Err(e);
        };

        info!(%job_id, %repo, "Job submitted");
        let reporter = reporter.for_job(&job_id);
        let text = response
            .status
            .filter(|s| !s.trim().is_empty())
            .map(|s| format!("Job {}: {}", job_id, s))
            .unwrap_or_else(|| format!("Job {} submitted", job_id));
        reporter.publish(StatusKind::Running, text);

        let job = Job::new(&job_id);
        *current = Some(self.spawn_watch(job.clone(), reporter));
        Ok(job)
    }

    /// Start watching a job submitted earlier, abandoning the current watch
    pub async fn watch(&self, job_id: &str) -> Result<Job, ClientError> {
        debug!(%job_id, "watch: called");
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(ClientError::validation("Please enter a job id to watch."));
        }
        self.gate.check()?;

        let mut current = self.current.lock().await;
        let reporter = self.board.reporter().for_job(job_id);
        if let Some(previous) = current.take() {
            info!(job_id = %previous.job_id, "Abandoning watch for another job");
            previous.cancel();
        }
        reporter.publish(StatusKind::Running, format!("Watching job {}", job_id));

        let job = Job::new(job_id);
        *current = Some(self.spawn_watch(job.clone(), reporter));
        Ok(job)
    }

    /// Stop watching the current job; returns its id if there was one
    pub async fn abandon(&self) -> Option<String> {
        debug!("abandon: called");
        let previous = self.current.lock().await.take()?;
        let job_id = previous.job_id.clone();
        info!(%job_id, "Abandoning watch");
        previous.cancel();

        self.board
            .reporter()
            .for_job(&job_id)
            .publish(StatusKind::Stopped, format!("Stopped watching job {}", job_id));
        Some(job_id)
    }

    /// Id of the job currently being watched, if its watch is still going
    pub async fn active_job(&self) -> Option<String> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .filter(|handle| !handle.task.is_finished())
            .map(|handle| handle.job_id.clone())
    }

    /// Wait for the current watch to end
    ///
    /// Returns `None` when there is nothing to wait for or the watch was abandoned.
    pub async fn wait(&self) -> Option<PollOutcome> {
        debug!("wait: called");
        let handle = self.current.lock().await.take()?;
        match handle.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                debug!(job_id = %handle.job_id, error = %e, "wait: watch did not complete");
                None
            }
        }
    }

    fn spawn_watch(&self, job: Job, reporter: StatusReporter) -> PollHandle {
        let job_id = job.id().to_string();
        let generation = reporter.generation();
        debug!(%job_id, generation, "spawn_watch: called");
        let poller = JobPoller::new(job, self.backend.clone(), self.gate.clone(), reporter, self.settings);
        PollHandle {
            job_id,
            generation,
            task: tokio::spawn(poller.run()),
        }
    }

    fn report_failure(reporter: &StatusReporter, error: &ClientError, gate: &AuthGate) {
        let (kind, text) = match error {
            ClientError::AuthRequired => (StatusKind::AwaitingLogin, gate.login().to_string()),
            other => (StatusKind::Warning, format!("Submission failed: {}", other)),
        };
        reporter.publish(kind, text);
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.current.get_mut().take() {
            debug!(job_id = %handle.job_id, "JobOrchestrator::drop: abandoning watch");
            handle.cancel();
        }
    }
}
