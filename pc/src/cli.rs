//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Parivartan - modernize a GitHub repository from a plain-language goal
#[derive(Parser)]
#[command(
    name = "parivartan",
    about = "Client for the Code Parivartan repository-transformation service",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Service base URL, overriding the config file
    #[arg(short, long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rewrite a goal into a more precise prompt
    Enhance {
        /// The modernization goal
        goal: String,
    },

    /// Submit a repository transformation job
    Submit {
        /// GitHub repository URL
        #[arg(value_name = "REPO")]
        repo: String,

        /// The modernization goal
        goal: String,

        /// Enhance the goal before submitting it
        #[arg(short, long)]
        enhance: bool,

        /// Print the job id and exit instead of watching the job
        #[arg(short, long)]
        detach: bool,
    },

    /// Watch a job submitted earlier until it finishes
    Status {
        /// Job id returned by submit
        #[arg(value_name = "JOB_ID")]
        job_id: String,

        /// Output format for the final result
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the GitHub login URL and open it in a browser
    Login {
        /// Only print the URL
        #[arg(long)]
        no_browser: bool,
    },

    /// End the current session
    Logout,

    /// Interactive shell (the default)
    Shell,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parivartan")
        .join("logs")
        .join("parivartan.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Session:\n");
    help.push_str("  Set PARIVARTAN_SESSION to the value of the service's session cookie,\n");
    help.push_str("  or run `parivartan login` to sign in with GitHub first.\n");

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));

    debug!("generate_after_help: returning help text");
    help
}

/// Output format for the status command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}
