//! Shell session management

use std::sync::Arc;

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{Backend, ClientError};
use crate::auth::AuthGate;
use crate::enhance::{Goal, PromptEnhancer};
use crate::job::JobOrchestrator;
use crate::status::{StatusKind, StatusLine};

/// Interactive shell session
///
/// Holds the repository and goal the way a form would, and drives the enhancer
/// and the orchestrator from slash commands. Status line changes are printed by a
/// background task as they happen.
pub struct ShellSession {
    backend: Arc<dyn Backend>,
    gate: AuthGate,
    enhancer: PromptEnhancer,
    orchestrator: JobOrchestrator,
    repo: Option<String>,
    goal: Goal,
}

impl ShellSession {
    /// Create a new shell session
    pub fn new(backend: Arc<dyn Backend>, gate: AuthGate, orchestrator: JobOrchestrator) -> Self {
        debug!("ShellSession::new: called");
        Self {
            enhancer: PromptEnhancer::new(backend.clone(), gate.clone()),
            backend,
            gate,
            orchestrator,
            repo: None,
            goal: Goal::default(),
        }
    }

    /// Run the shell main loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let printer = spawn_status_printer(self.orchestrator.status().subscribe());
        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(input);

                    let result = if input.starts_with('/') {
                        self.handle_slash_command(input).await
                    } else {
                        // Plain text is the goal
                        self.goal.replace(input);
                        println!("{}", "Goal set.".dimmed());
                        SlashResult::Continue
                    };
                    if result == SlashResult::Quit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    printer.abort();
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        if let Some(job_id) = self.orchestrator.abandon().await {
            println!(
                "{}",
                format!("Stopped watching job {}; it keeps running on the server.", job_id).dimmed()
            );
        }
        printer.abort();
        println!("Goodbye!");
        Ok(())
    }

    /// Print welcome message
    fn print_welcome(&self) {
        println!();
        println!("{}", "Code Parivartan".bright_cyan().bold());
        println!("Type a goal, set a repository with {}, then {}", "/repo".yellow(), "/submit".yellow());
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    /// Handle slash commands
    async fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let (cmd, arg) = match input.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (input, ""),
        };
        debug!(%cmd, "handle_slash_command: called");

        match cmd {
            "/help" | "/h" => {
                self.print_help();
                SlashResult::Continue
            }
            "/quit" | "/q" | "/exit" => SlashResult::Quit,
            "/repo" | "/r" => {
                if arg.is_empty() {
                    match &self.repo {
                        Some(repo) => println!("Repository: {}", repo),
                        None => println!("{}", "No repository set.".dimmed()),
                    }
                } else {
                    self.repo = Some(arg.to_string());
                    println!("{}", "Repository set.".dimmed());
                }
                SlashResult::Continue
            }
            "/goal" | "/g" => {
                if arg.is_empty() {
                    self.print_goal();
                } else {
                    self.goal.replace(arg);
                    println!("{}", "Goal set.".dimmed());
                }
                SlashResult::Continue
            }
            "/enhance" | "/e" => {
                println!("{}", "Enhancing...".dimmed());
                match self.enhancer.enhance_goal(&self.goal).await {
                    Ok(()) => {
                        println!("{}", "Goal enhanced:".bright_cyan());
                        self.print_goal();
                        SlashResult::Continue
                    }
                    Err(e) => self.report_error(&e),
                }
            }
            "/submit" | "/s" => {
                let repo = self.repo.clone().unwrap_or_default();
                match self.orchestrator.submit(&repo, &self.goal.get()).await {
                    Ok(job) => {
                        debug!(job_id = %job.id(), "handle_slash_command: submitted");
                        SlashResult::Continue
                    }
                    Err(e) => self.report_error(&e),
                }
            }
            "/watch" | "/w" => match self.orchestrator.watch(arg).await {
                Ok(_) => SlashResult::Continue,
                Err(e) => self.report_error(&e),
            },
            "/abandon" => {
                if self.orchestrator.abandon().await.is_none() {
                    println!("{}", "No job is being watched.".dimmed());
                }
                SlashResult::Continue
            }
            "/status" => {
                self.print_status().await;
                SlashResult::Continue
            }
            "/login" => {
                println!("{}", self.gate.login().to_string().bright_yellow());
                SlashResult::Quit
            }
            "/logout" => {
                if let Err(e) = self.gate.logout(self.backend.as_ref()).await {
                    println!("{} {}", "Error:".red(), e);
                }
                println!("{}", "Logged out.".dimmed());
                SlashResult::Quit
            }
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                SlashResult::Continue
            }
        }
    }

    /// Print an action's failure; an authorization failure ends the session
    fn report_error(&self, error: &ClientError) -> SlashResult {
        if error.is_auth() {
            println!("{} {}", "!".red(), error);
            println!("{}", self.gate.login().to_string().bright_yellow());
            return SlashResult::Quit;
        }
        println!("{} {}", "Error:".red(), error);
        SlashResult::Continue
    }

    fn print_goal(&self) {
        if self.goal.is_blank() {
            println!("{}", "No goal set.".dimmed());
        } else {
            println!("{}", self.goal.get());
        }
    }

    async fn print_status(&self) {
        let line = self.orchestrator.status().current();
        println!("{}", render(&line));
        match self.orchestrator.active_job().await {
            Some(job_id) => println!("Watching job {}", job_id.bright_white()),
            None => println!("{}", "No job is being watched.".dimmed()),
        }
        if !self.gate.is_authenticated() {
            println!("{}", self.gate.login().to_string().bright_yellow());
        }
    }

    /// Print help message
    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:16} Show this help", "/help".yellow());
        println!("  {:16} Exit the shell", "/quit".yellow());
        println!("  {:16} Show or set the GitHub repository URL", "/repo [URL]".yellow());
        println!("  {:16} Show or set the goal (plain text also sets it)", "/goal [TEXT]".yellow());
        println!("  {:16} Rewrite the goal into a more precise prompt", "/enhance".yellow());
        println!("  {:16} Submit the repository and goal as a job", "/submit".yellow());
        println!("  {:16} Watch an existing job instead", "/watch JOB_ID".yellow());
        println!("  {:16} Stop watching the current job", "/abandon".yellow());
        println!("  {:16} Show the status line", "/status".yellow());
        println!("  {:16} Show the GitHub login URL and exit", "/login".yellow());
        println!("  {:16} End the session and exit", "/logout".yellow());
        println!();
    }
}

/// Print every replacement of the status line until the board goes away
fn spawn_status_printer(mut rx: watch::Receiver<StatusLine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let line = rx.borrow_and_update().clone();
            println!("{}", render(&line));
        }
    })
}

/// Colour a status line by its kind
pub fn render(line: &StatusLine) -> String {
    let text = line.text.as_str();
    match line.kind {
        StatusKind::Idle => text.dimmed().to_string(),
        StatusKind::Submitting | StatusKind::Running => text.bright_blue().to_string(),
        StatusKind::Succeeded => text.bright_green().to_string(),
        StatusKind::Failed => text.red().to_string(),
        StatusKind::AwaitingLogin | StatusKind::Warning => text.yellow().to_string(),
        StatusKind::Stopped => text.dimmed().to_string(),
    }
}

/// Result of handling a slash command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlashResult {
    Continue,
    Quit,
}
