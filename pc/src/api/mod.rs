//! Backend API module
//!
//! The transport seam between the client workflows and the service's HTTP endpoints.

pub mod backend;
mod error;
mod http;
mod types;

pub use backend::Backend;
pub use error::ClientError;
pub use http::HttpBackend;
pub use types::{
    EnhanceRequest, EnhanceResponse, SubmitRequest, SubmitResponse, TaskResult, TaskStatusResponse, rejection_message,
};
