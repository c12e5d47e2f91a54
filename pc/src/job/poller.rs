//! Job polling state machine
//!
//! A [`JobPoller`] owns one job id and advances by one poll per [`JobPoller::tick`].
//! `tick` never sleeps; it tells the caller when to call again, so the transition
//! logic can be exercised without waiting out the real delay. [`JobPoller::run`]
//! is the timer-driven loop used in production.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::types::{Job, JobResult, JobStatus};
use crate::api::{Backend, ClientError, TaskResult, TaskStatusResponse};
use crate::auth::AuthGate;
use crate::config::PollingConfig;
use crate::status::{StatusKind, StatusReporter};

/// Shown when a failed job carries no reason
pub const GENERIC_FAILURE: &str = "The agent could not complete the task.";

/// Shown when a job finished but produced no pull request
pub const NO_PULL_REQUEST: &str = "Job finished without creating a pull request.";

/// Cadence and limits for a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between the answer to one poll and the next poll
    pub interval: Duration,

    /// Give up watching after this many polls
    pub max_polls: Option<u32>,
}

impl PollSettings {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            max_polls: config.max_polls,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

/// Where a watch stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Not terminal yet; carries the last status token seen
    Running { status: JobStatus },

    /// Terminal: the job produced a pull request
    Succeeded { pr_url: String },

    /// Terminal: the job failed
    Failed { reason: String },

    /// Halted because the session was refused; the job itself is unaffected
    AwaitingLogin,

    /// Halted for a reason unrelated to the job's outcome
    Stopped { reason: String },
}

impl PollState {
    /// The job reached an outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Succeeded { .. } | PollState::Failed { .. })
    }

    /// No further poll will be issued
    pub fn is_final(&self) -> bool {
        !matches!(self, PollState::Running { .. })
    }
}

/// What the driver should do after a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Call `tick` again after this delay
    PollAgain(Duration),

    /// The watch is over
    Finished(PollState),
}

/// Final report of a watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub job: Job,
    pub state: PollState,
}

/// Decide the next state from one poll answer
///
/// A usable pull-request URL wins over whatever the status token says. Otherwise
/// `FAILURE` fails with the result's message, and `SUCCESS` without a URL fails too:
/// the worker reports its own errors that way. Anything else keeps running.
pub fn classify(response: &TaskStatusResponse) -> Result<PollState, ClientError> {
    let status = response
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ClientError::MalformedResponse("status response has no status".to_string()))?;
    let status = JobStatus::new(status);
    let result = TaskResult::from_value(response.result.as_ref());

    if let Some(pr_url) = result.pr_url {
        return Ok(PollState::Succeeded { pr_url });
    }

    if status.is_failure() {
        return Ok(PollState::Failed {
            reason: result.message.unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        });
    }

    if status.is_success() {
        return Ok(PollState::Failed {
            reason: result.message.unwrap_or_else(|| NO_PULL_REQUEST.to_string()),
        });
    }

    Ok(PollState::Running { status })
}

/// Drives one job to a terminal state
pub struct JobPoller {
    job: Job,
    backend: Arc<dyn Backend>,
    gate: AuthGate,
    reporter: StatusReporter,
    settings: PollSettings,
    polls: u32,
    state: PollState,
}

impl JobPoller {
    pub fn new(
        job: Job,
        backend: Arc<dyn Backend>,
        gate: AuthGate,
        reporter: StatusReporter,
        settings: PollSettings,
    ) -> Self {
        debug!(job_id = %job.id(), ?settings, "JobPoller::new: called");
        let state = PollState::Running {
            status: job.status().clone(),
        };
        Self {
            job,
            backend,
            gate,
            reporter,
            settings,
            polls: 0,
            state,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Number of polls issued so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Issue one poll and apply its answer
    pub async fn tick(&mut self) -> Tick {
        let job_id = self.job.id().to_string();
        debug!(%job_id, polls = self.polls, "tick: called");

        if self.state.is_final() {
            debug!(%job_id, state = ?self.state, "tick: already finished");
            return Tick::Finished(self.state.clone());
        }

        if self.reporter.is_superseded() {
            debug!(%job_id, "tick: superseded by a newer watch");
            self.state = PollState::Stopped {
                reason: "superseded by a newer job".to_string(),
            };
            return Tick::Finished(self.state.clone());
        }

        if !self.gate.is_authenticated() {
            debug!(%job_id, "tick: session unauthenticated, not polling");
            return self.halt_for_login();
        }

        self.polls += 1;
        let response = match self.backend.task_status(&job_id).await {
            Ok(response) => response,
            Err(ClientError::AuthRequired) => {
                self.gate.mark_unauthenticated();
                return self.halt_for_login();
            }
            Err(e) if e.is_transient() => {
                warn!(%job_id, error = %e, "Poll failed, will retry");
                self.reporter.publish(
                    StatusKind::Warning,
                    format!("Could not refresh job {}: {}. Retrying.", job_id, e),
                );
                return self.schedule_next();
            }
            Err(e) => {
                warn!(%job_id, error = %e, "Poll failed permanently");
                return self.stop(format!("Stopped watching job {}: {}", job_id, e));
            }
        };

        match classify(&response) {
            Ok(state) => self.apply(state, response.message.as_deref()),
            Err(e) => {
                warn!(%job_id, error = %e, "Unusable status response");
                self.stop(format!("Stopped watching job {}: {}", job_id, e))
            }
        }
    }

    /// Tick until the watch is over, sleeping between polls
    pub async fn run(mut self) -> PollOutcome {
        info!(job_id = %self.job.id(), interval = ?self.settings.interval, "Watching job");
        loop {
            match self.tick().await {
                Tick::PollAgain(delay) => tokio::time::sleep(delay).await,
                Tick::Finished(state) => {
                    info!(job_id = %self.job.id(), polls = self.polls, ?state, "Stopped watching job");
                    return PollOutcome { job: self.job, state };
                }
            }
        }
    }

    fn apply(&mut self, state: PollState, note: Option<&str>) -> Tick {
        let job_id = self.job.id().to_string();
        debug!(%job_id, ?state, "apply: called");

        match &state {
            PollState::Succeeded { pr_url } => {
                info!(%job_id, %pr_url, "Job succeeded");
                self.job.refresh(
                    JobStatus::new(super::types::STATUS_SUCCESS),
                    Some(JobResult::PullRequest { url: pr_url.clone() }),
                );
                self.reporter
                    .publish(StatusKind::Succeeded, format!("Pull request created: {}", pr_url));
            }
            PollState::Failed { reason } => {
                info!(%job_id, %reason, "Job failed");
                self.job.refresh(
                    JobStatus::new(super::types::STATUS_FAILURE),
                    Some(JobResult::Failure { message: reason.clone() }),
                );
                self.reporter.publish(StatusKind::Failed, format!("Job failed: {}", reason));
            }
            PollState::Running { status } => {
                self.job.refresh(status.clone(), None);
                let text = match note.map(str::trim).filter(|n| !n.is_empty()) {
                    Some(note) => format!("Job {}: {} ({})", job_id, status, note),
                    None => format!("Job {}: {}", job_id, status),
                };
                self.reporter.publish(StatusKind::Running, text);
            }
            PollState::AwaitingLogin | PollState::Stopped { .. } => {}
        }

        self.state = state;
        if self.state.is_final() {
            Tick::Finished(self.state.clone())
        } else {
            self.schedule_next()
        }
    }

    fn schedule_next(&mut self) -> Tick {
        if let Some(max) = self.settings.max_polls
            && self.polls >= max
        {
            debug!(polls = self.polls, max, "schedule_next: poll limit reached");
            return self.stop(format!(
                "Stopped watching job {} after {} polls; it may still be running on the server.",
                self.job.id(),
                self.polls
            ));
        }
        Tick::PollAgain(self.settings.interval)
    }

    fn halt_for_login(&mut self) -> Tick {
        let redirect = self.gate.login();
        info!(job_id = %self.job.id(), "Watch halted, login required");
        self.reporter.publish(
            StatusKind::AwaitingLogin,
            format!(
                "Session expired while watching job {}. {} to continue.",
                self.job.id(),
                redirect
            ),
        );
        self.state = PollState::AwaitingLogin;
        Tick::Finished(self.state.clone())
    }

    fn stop(&mut self, reason: String) -> Tick {
        self.reporter.publish(StatusKind::Stopped, reason.clone());
        self.state = PollState::Stopped { reason };
        Tick::Finished(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::backend::mock::MockBackend;
    use crate::status::StatusBoard;
    use serde_json::json;

    const INTERVAL: Duration = Duration::from_millis(10);

    struct Fixture {
        backend: Arc<MockBackend>,
        gate: AuthGate,
        board: StatusBoard,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                backend: Arc::new(MockBackend::new()),
                gate: AuthGate::new("http://localhost:5001/login"),
                board: StatusBoard::new(),
            }
        }

        fn poller(&self, job_id: &str, max_polls: Option<u32>) -> JobPoller {
            JobPoller::new(
                Job::new(job_id),
                self.backend.clone(),
                self.gate.clone(),
                self.board.reporter().for_job(job_id),
                PollSettings {
                    interval: INTERVAL,
                    max_polls,
                },
            )
        }
    }

    #[tokio::test]
    async fn test_success_with_pr_url() {
        let fx = Fixture::new();
        fx.backend.push_status(
            "job-1",
            Ok(TaskStatusResponse::with_result(
                "SUCCESS",
                json!({"status": "success", "pr_url": "https://x/pr/1"}),
            )),
        );
        let mut poller = fx.poller("job-1", None);

        let tick = poller.tick().await;
        assert_eq!(
            tick,
            Tick::Finished(PollState::Succeeded {
                pr_url: "https://x/pr/1".to_string()
            })
        );

        let line = fx.board.current();
        assert_eq!(line.kind, StatusKind::Succeeded);
        assert!(line.text.contains("https://x/pr/1"));
        assert_eq!(
            poller.job().result(),
            Some(&JobResult::PullRequest {
                url: "https://x/pr/1".to_string()
            })
        );

        // Nothing further is polled
        assert!(matches!(poller.tick().await, Tick::Finished(_)));
        assert_eq!(fx.backend.poll_count("job-1"), 1);
    }

    #[tokio::test]
    async fn test_failure_surfaces_message() {
        let fx = Fixture::new();
        fx.backend.push_status(
            "job-1",
            Ok(TaskStatusResponse::with_result("FAILURE", json!({"message": "boom"}))),
        );
        let mut poller = fx.poller("job-1", None);

        let tick = poller.tick().await;
        assert_eq!(
            tick,
            Tick::Finished(PollState::Failed {
                reason: "boom".to_string()
            })
        );
        let line = fx.board.current();
        assert_eq!(line.kind, StatusKind::Failed);
        assert!(line.text.contains("boom"));

        assert!(matches!(poller.tick().await, Tick::Finished(_)));
        assert_eq!(fx.backend.poll_count("job-1"), 1);
    }

    #[tokio::test]
    async fn test_failure_without_message_is_generic() {
        let fx = Fixture::new();
        fx.backend.push_status("job-1", Ok(TaskStatusResponse::status("FAILURE")));
        let mut poller = fx.poller("job-1", None);

        assert_eq!(
            poller.tick().await,
            Tick::Finished(PollState::Failed {
                reason: GENERIC_FAILURE.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_running_schedules_exactly_one_more_poll() {
        let fx = Fixture::new();
        fx.backend.push_status(
            "job-1",
            Ok(TaskStatusResponse {
                status: Some("PENDING".to_string()),
                result: None,
                message: Some("Task is still processing".to_string()),
            }),
        );
        let mut poller = fx.poller("job-1", None);

        assert_eq!(poller.tick().await, Tick::PollAgain(INTERVAL));
        assert_eq!(fx.backend.poll_count("job-1"), 1);
        assert_eq!(
            poller.state(),
            &PollState::Running {
                status: JobStatus::new("PENDING")
            }
        );

        let line = fx.board.current();
        assert_eq!(line.kind, StatusKind::Running);
        assert_eq!(line.text, "Job job-1: PENDING (Task is still processing)");
    }

    #[tokio::test]
    async fn test_pr_url_wins_over_unknown_status() {
        let fx = Fixture::new();
        fx.backend.push_status(
            "job-1",
            Ok(TaskStatusResponse::with_result(
                "DONE_ISH",
                json!({"pr_url": "https://github.com/o/r/pull/9"}),
            )),
        );
        let mut poller = fx.poller("job-1", None);

        assert!(matches!(
            poller.tick().await,
            Tick::Finished(PollState::Succeeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_success_without_pr_url_fails_with_worker_message() {
        let fx = Fixture::new();
        fx.backend.push_status(
            "job-1",
            Ok(TaskStatusResponse::with_result(
                "SUCCESS",
                json!({"status": "error", "message": "Repository not found"}),
            )),
        );
        let mut poller = fx.poller("job-1", None);

        assert_eq!(
            poller.tick().await,
            Tick::Finished(PollState::Failed {
                reason: "Repository not found".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_401_halts_without_failing_job() {
        let fx = Fixture::new();
        fx.backend.push_status("job-1", Err(ClientError::AuthRequired));
        let mut poller = fx.poller("job-1", None);

        assert_eq!(poller.tick().await, Tick::Finished(PollState::AwaitingLogin));
        assert!(!fx.gate.is_authenticated());
        assert_eq!(poller.job().result(), None);

        let line = fx.board.current();
        assert_eq!(line.kind, StatusKind::AwaitingLogin);
        assert!(line.text.contains("http://localhost:5001/login"));

        assert_eq!(poller.tick().await, Tick::Finished(PollState::AwaitingLogin));
        assert_eq!(fx.backend.poll_count("job-1"), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_session_never_polls() {
        let fx = Fixture::new();
        fx.gate.mark_unauthenticated();
        let mut poller = fx.poller("job-1", None);

        assert_eq!(poller.tick().await, Tick::Finished(PollState::AwaitingLogin));
        assert_eq!(fx.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_network_error_keeps_polling() {
        let fx = Fixture::new();
        fx.backend
            .push_status("job-1", Err(ClientError::Network("connection reset".to_string())))
            .push_status(
                "job-1",
                Ok(TaskStatusResponse::with_result("SUCCESS", json!({"pr_url": "https://x/pr/2"}))),
            );
        let mut poller = fx.poller("job-1", None);

        assert_eq!(poller.tick().await, Tick::PollAgain(INTERVAL));
        let line = fx.board.current();
        assert_eq!(line.kind, StatusKind::Warning);
        assert!(line.text.contains("connection reset"));

        assert!(matches!(
            poller.tick().await,
            Tick::Finished(PollState::Succeeded { .. })
        ));
        assert_eq!(fx.backend.poll_count("job-1"), 2);
    }

    #[tokio::test]
    async fn test_server_error_keeps_polling_but_client_error_stops() {
        let fx = Fixture::new();
        fx.backend
            .push_status(
                "job-1",
                Err(ClientError::ServerRejected {
                    status: 500,
                    message: "Error 111 connecting to 127.0.0.1:6379".to_string(),
                }),
            )
            .push_status(
                "job-1",
                Err(ClientError::ServerRejected {
                    status: 404,
                    message: "Not Found".to_string(),
                }),
            );
        let mut poller = fx.poller("job-1", None);

        assert_eq!(poller.tick().await, Tick::PollAgain(INTERVAL));
        assert!(matches!(poller.tick().await, Tick::Finished(PollState::Stopped { .. })));
        assert_eq!(fx.board.current().kind, StatusKind::Stopped);
        assert!(fx.gate.is_authenticated());
    }

    #[tokio::test]
    async fn test_missing_status_stops_watch() {
        let fx = Fixture::new();
        fx.backend.push_status("job-1", Ok(TaskStatusResponse::default()));
        let mut poller = fx.poller("job-1", None);

        let tick = poller.tick().await;
        assert!(matches!(tick, Tick::Finished(PollState::Stopped { .. })));
        assert!(!poller.state().is_terminal());
    }

    #[tokio::test]
    async fn test_poll_limit() {
        let fx = Fixture::new();
        let mut poller = fx.poller("job-1", Some(2));

        assert_eq!(poller.tick().await, Tick::PollAgain(INTERVAL));
        let tick = poller.tick().await;
        assert!(matches!(tick, Tick::Finished(PollState::Stopped { .. })));
        assert!(fx.board.current().text.contains("after 2 polls"));
        assert_eq!(fx.backend.poll_count("job-1"), 2);
    }

    #[tokio::test]
    async fn test_superseded_poller_stops_quietly() {
        let fx = Fixture::new();
        let mut poller = fx.poller("job-1", None);

        let newer = fx.board.reporter().for_job("job-2");
        newer.publish(StatusKind::Submitting, "Submitting job");

        assert!(matches!(poller.tick().await, Tick::Finished(PollState::Stopped { .. })));
        assert_eq!(fx.backend.poll_count("job-1"), 0);
        assert_eq!(fx.board.current().text, "Submitting job");
    }

    #[tokio::test]
    async fn test_run_until_success() {
        let fx = Fixture::new();
        fx.backend
            .push_status("job-1", Ok(TaskStatusResponse::status("PENDING")))
            .push_status("job-1", Ok(TaskStatusResponse::status("STARTED")))
            .push_status(
                "job-1",
                Ok(TaskStatusResponse::with_result("SUCCESS", json!({"pr_url": "https://x/pr/3"}))),
            );

        let outcome = fx.poller("job-1", None).run().await;

        assert_eq!(
            outcome.state,
            PollState::Succeeded {
                pr_url: "https://x/pr/3".to_string()
            }
        );
        assert!(outcome.job.status().is_success());
        assert_eq!(fx.backend.polled(), vec!["job-1", "job-1", "job-1"]);
    }

    #[test]
    fn test_classify_only_exact_terminal_spellings() {
        for status in [" FAILURE ", "SUCCESS\n", "failure", "  RETRY "] {
            let state = classify(&TaskStatusResponse::status(status)).unwrap();
            assert_eq!(
                state,
                PollState::Running {
                    status: JobStatus::new(status)
                },
                "{:?} should still be running",
                status
            );
        }
        assert!(classify(&TaskStatusResponse::status("   ")).is_err());
    }
}
