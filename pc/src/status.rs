//! The single user-visible status line
//!
//! Every update replaces the previous line; nothing is appended. Each job watch
//! publishes through a [`StatusReporter`] stamped with a generation number, and a
//! reporter is silenced as soon as a newer generation has published. That keeps a
//! loop that was abandoned mid-request from overwriting its successor's line.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

/// What kind of news the status line carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Idle,
    Submitting,
    Running,
    Succeeded,
    Failed,
    AwaitingLogin,
    Warning,
    Stopped,
}

impl StatusKind {
    /// No further update will follow for this generation
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            StatusKind::Succeeded | StatusKind::Failed | StatusKind::AwaitingLogin | StatusKind::Stopped
        )
    }
}

/// The current status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub generation: u64,
    pub job_id: Option<String>,
    pub kind: StatusKind,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Owner of the status line
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<StatusLine>>,
    next_generation: Arc<AtomicU64>,
}

impl StatusBoard {
    pub fn new() -> Self {
        debug!("StatusBoard::new: called");
        let (tx, _) = watch::channel(StatusLine {
            generation: 0,
            job_id: None,
            kind: StatusKind::Idle,
            text: "Ready".to_string(),
            updated_at: Utc::now(),
        });
        Self {
            tx: Arc::new(tx),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Snapshot of the line as it stands
    pub fn current(&self) -> StatusLine {
        self.tx.borrow().clone()
    }

    /// Receive every replacement of the line from now on
    pub fn subscribe(&self) -> watch::Receiver<StatusLine> {
        self.tx.subscribe()
    }

    /// Reporter for a new generation, superseding all earlier reporters once it publishes
    pub fn reporter(&self) -> StatusReporter {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        debug!(generation, "StatusBoard::reporter: called");
        StatusReporter {
            tx: self.tx.clone(),
            generation,
            job_id: None,
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Generation-bound handle for publishing status lines
#[derive(Clone)]
pub struct StatusReporter {
    tx: Arc<watch::Sender<StatusLine>>,
    generation: u64,
    job_id: Option<String>,
}

impl StatusReporter {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Same generation, now attributed to a job
    pub fn for_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Replace the line unless a newer generation already owns it
    ///
    /// Returns whether the line was replaced.
    pub fn publish(&self, kind: StatusKind, text: impl Into<String>) -> bool {
        let text = text.into();
        let published = self.tx.send_if_modified(|line| {
            if line.generation > self.generation {
                return false;
            }
            *line = StatusLine {
                generation: self.generation,
                job_id: self.job_id.clone(),
                kind,
                text: text.clone(),
                updated_at: Utc::now(),
            };
            true
        });
        debug!(generation = self.generation, ?kind, published, "StatusReporter::publish");
        published
    }

    /// Whether a newer generation has taken over the line
    pub fn is_superseded(&self) -> bool {
        self.tx.borrow().generation > self.generation
    }
}
