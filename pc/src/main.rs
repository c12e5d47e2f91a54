//! Parivartan - client for the Code Parivartan transformation service
//!
//! CLI entry point: one-shot subcommands plus the interactive shell.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parivartan::cli::{Cli, Command, OutputFormat, generate_after_help};
use parivartan::config::Config;
use parivartan::shell::{self, render};
use parivartan::{
    AuthGate, Backend, HttpBackend, JobOrchestrator, PollOutcome, PollSettings, PollState, PromptEnhancer, StatusBoard,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parivartan")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("parivartan.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(server) = cli.server {
        debug!(%server, "main: overriding server base-url");
        config.server.base_url = server;
    }
    config.validate().context("Invalid configuration")?;

    info!("Parivartan loaded config: server={}", config.server.base_url);

    let cookie = config.session.resolve_cookie();
    if cookie.is_none() {
        debug!(env = %config.session.cookie_env, "main: no session cookie configured");
    }
    let backend: Arc<dyn Backend> = Arc::new(
        HttpBackend::new(&config.server, &config.session, cookie.as_deref()).context("Failed to create HTTP client")?,
    );
    let gate = AuthGate::new(config.server.login_url());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Enhance { goal }) => {
            debug!("main: matched Enhance command");
            cmd_enhance(backend, gate, &goal).await
        }
        Some(Command::Submit {
            repo,
            goal,
            enhance,
            detach,
        }) => {
            debug!(%repo, enhance, detach, "main: matched Submit command");
            cmd_submit(&config, backend, gate, &repo, &goal, enhance, detach).await
        }
        Some(Command::Status { job_id, format }) => {
            debug!(%job_id, ?format, "main: matched Status command");
            cmd_status(&config, backend, gate, &job_id, format).await
        }
        Some(Command::Login { no_browser }) => {
            debug!(no_browser, "main: matched Login command");
            cmd_login(&gate, no_browser)
        }
        Some(Command::Logout) => {
            debug!("main: matched Logout command");
            cmd_logout(backend, gate).await
        }
        Some(Command::Shell) | None => {
            debug!("main: launching shell");
            shell::run_interactive(&config, backend, gate).await
        }
    }
}

/// Print an enhanced version of a goal
async fn cmd_enhance(backend: Arc<dyn Backend>, gate: AuthGate, goal: &str) -> Result<()> {
    debug!("cmd_enhance: called");
    let enhancer = PromptEnhancer::new(backend, gate);
    let enhanced = enhancer.enhance(goal).await?;
    println!("{}", enhanced);
    Ok(())
}

/// Submit a job and, unless detached, watch it to the end
async fn cmd_submit(
    config: &Config,
    backend: Arc<dyn Backend>,
    gate: AuthGate,
    repo: &str,
    goal: &str,
    enhance: bool,
    detach: bool,
) -> Result<()> {
    debug!(%repo, enhance, detach, "cmd_submit: called");
    let goal = if enhance {
        let enhancer = PromptEnhancer::new(backend.clone(), gate.clone());
        let enhanced = enhancer.enhance(goal).await?;
        println!("{} {}", "Enhanced goal:".bright_cyan(), enhanced);
        enhanced
    } else {
        goal.to_string()
    };

    let orchestrator = orchestrator_for(config, backend, gate.clone());
    if detach {
        let job = orchestrator.submit(repo, &goal).await?;
        orchestrator.abandon().await;
        println!("{}", job.id());
        return Ok(());
    }

    let printer = spawn_status_printer(orchestrator.status());
    match orchestrator.submit(repo, &goal).await {
        Ok(job) => info!(job_id = %job.id(), "cmd_submit: watching job"),
        Err(e) => {
            printer.abort();
            return Err(e.into());
        }
    }
    follow(&orchestrator, &gate, printer, OutputFormat::Text).await
}

/// Watch an existing job to the end
async fn cmd_status(
    config: &Config,
    backend: Arc<dyn Backend>,
    gate: AuthGate,
    job_id: &str,
    format: OutputFormat,
) -> Result<()> {
    debug!(%job_id, ?format, "cmd_status: called");
    let orchestrator = orchestrator_for(config, backend, gate.clone());
    let printer = match format {
        OutputFormat::Text => spawn_status_printer(orchestrator.status()),
        OutputFormat::Json => tokio::spawn(async {}),
    };
    if let Err(e) = orchestrator.watch(job_id).await {
        printer.abort();
        return Err(e.into());
    }
    follow(&orchestrator, &gate, printer, format).await
}

/// Print the login URL and try to open it
fn cmd_login(gate: &AuthGate, no_browser: bool) -> Result<()> {
    debug!(no_browser, "cmd_login: called");
    let redirect = gate.login();
    println!("{}", redirect);

    if !no_browser && let Err(e) = open_in_browser(&redirect.url) {
        warn!(error = %e, "cmd_login: could not open browser");
        println!("{}", "Open the URL above in your browser to continue.".dimmed());
    }
    Ok(())
}

/// End the session on the server
async fn cmd_logout(backend: Arc<dyn Backend>, gate: AuthGate) -> Result<()> {
    debug!("cmd_logout: called");
    gate.logout(backend.as_ref()).await.context("Failed to log out")?;
    println!("Logged out.");
    Ok(())
}

fn orchestrator_for(config: &Config, backend: Arc<dyn Backend>, gate: AuthGate) -> JobOrchestrator {
    JobOrchestrator::new(
        backend,
        gate,
        StatusBoard::new(),
        PollSettings::from_config(&config.polling),
    )
}

/// Print status line replacements until one of them is final
fn spawn_status_printer(board: &StatusBoard) -> JoinHandle<()> {
    let mut rx = board.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let line = rx.borrow_and_update().clone();
            println!("{}", render(&line));
            if line.kind.is_final() {
                break;
            }
        }
    })
}

/// Wait for the current watch and turn its outcome into an exit status
async fn follow(
    orchestrator: &JobOrchestrator,
    gate: &AuthGate,
    printer: JoinHandle<()>,
    format: OutputFormat,
) -> Result<()> {
    let outcome = orchestrator.wait().await;
    // The final line is published before the watch ends, so the printer is on its way out
    if let Err(e) = printer.await {
        debug!(error = %e, "follow: status printer did not finish");
    }

    let Some(PollOutcome { job, state }) = outcome else {
        return Err(eyre::eyre!("Job watch ended unexpectedly"));
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&job).context("Failed to encode job")?);
    }

    match state {
        PollState::Succeeded { .. } => Ok(()),
        PollState::Failed { reason } => Err(eyre::eyre!("Job {} failed: {}", job.id(), reason)),
        PollState::AwaitingLogin => Err(eyre::eyre!("{}", gate.login())),
        PollState::Stopped { reason } => Err(eyre::eyre!("{}", reason)),
        PollState::Running { status } => Err(eyre::eyre!("Job {} is still {}", job.id(), status)),
    }
}

/// Best-effort hand-off of a URL to the desktop
fn open_in_browser(url: &str) -> Result<()> {
    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    debug!(%opener, %url, "open_in_browser: called");
    let status = std::process::Command::new(opener)
        .arg(url)
        .status()
        .context(format!("Failed to run {}", opener))?;
    if !status.success() {
        return Err(eyre::eyre!("{} exited with {}", opener, status));
    }
    Ok(())
}
