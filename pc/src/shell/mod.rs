//! Interactive shell for Parivartan
//!
//! Plays the part of the web page: a repository field, a goal field, the enhance
//! and submit buttons as slash commands, and the status line printed as it changes.

mod session;

pub use session::{ShellSession, render};

use std::sync::Arc;

use eyre::Result;

use crate::api::Backend;
use crate::auth::AuthGate;
use crate::config::Config;
use crate::job::{JobOrchestrator, PollSettings};
use crate::status::StatusBoard;

/// Run the interactive shell
///
/// This is the main entry point for `parivartan shell` and for a bare `parivartan`.
pub async fn run_interactive(config: &Config, backend: Arc<dyn Backend>, gate: AuthGate) -> Result<()> {
    let orchestrator = JobOrchestrator::new(
        backend.clone(),
        gate.clone(),
        StatusBoard::new(),
        PollSettings::from_config(&config.polling),
    );

    let mut session = ShellSession::new(backend, gate, orchestrator);
    session.run().await
}
