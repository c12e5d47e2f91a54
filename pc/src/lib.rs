//! Parivartan - client core for the Code Parivartan transformation service
//!
//! The service takes a GitHub repository and a plain-language modernization goal,
//! runs an agent against the repository and answers with a pull request. This crate
//! is everything on the near side of that HTTP boundary.
//!
//! # Modules
//!
//! - [`api`] - Backend trait, HTTP transport and wire types
//! - [`auth`] - Session gate consulted before every protected action
//! - [`enhance`] - Prompt enhancement
//! - [`job`] - Job submission and the status polling loop
//! - [`status`] - The single user-visible status line
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`shell`] - Interactive shell

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod enhance;
pub mod job;
pub mod shell;
pub mod status;

pub use api::{Backend, ClientError, HttpBackend};
pub use auth::{AuthGate, LoginRedirect};
pub use config::Config;
pub use enhance::{Goal, PromptEnhancer};
pub use job::{Job, JobOrchestrator, JobResult, JobStatus, PollOutcome, PollSettings, PollState};
pub use status::{StatusBoard, StatusKind, StatusLine, StatusReporter};
