//! Wire types for the backend HTTP API

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/enhance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhanceRequest {
    pub prompt: String,
}

/// Body returned by `POST /api/enhance`
///
/// Every field is optional on the wire; the enhancer decides what a usable answer is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnhanceResponse {
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub enhanced_prompt: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

impl EnhanceResponse {
    /// A successful response carrying the enhanced text
    pub fn enhanced(text: impl Into<String>) -> Self {
        Self {
            success: Some(true),
            enhanced_prompt: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Body of `POST /api/submit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitRequest {
    pub repo_url: String,
    pub task_description: String,
}

/// Body returned by `POST /api/submit`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub job_id: Option<String>,

    /// e.g. "Task submitted successfully!"
    #[serde(default)]
    pub message: Option<String>,

    /// Human-readable progress sentence, not a job status token
    #[serde(default)]
    pub status: Option<String>,
}

impl SubmitResponse {
    /// A successful response carrying a job id
    pub fn accepted(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Default::default()
        }
    }
}

/// Body returned by `GET /api/task_status/{job_id}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub status: Option<String>,

    /// Object with `pr_url`/`message`, or a bare string when the worker raised
    #[serde(default)]
    pub result: Option<Value>,

    /// Progress note sent alongside non-terminal states
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskStatusResponse {
    /// Response with a status token and no result
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    /// Response with a status token and a result payload
    pub fn with_result(status: impl Into<String>, result: Value) -> Self {
        Self {
            status: Some(status.into()),
            result: Some(result),
            message: None,
        }
    }
}

/// Outcome fields extracted from a poll `result` payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResult {
    /// Pull-request URL, only when non-empty
    pub pr_url: Option<String>,

    /// Failure or informational message, only when non-empty
    pub message: Option<String>,
}

impl TaskResult {
    /// Extract the outcome from a raw `result` value
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self {
                pr_url: non_empty(map.get("pr_url").and_then(Value::as_str)),
                message: non_empty(
                    map.get("message")
                        .and_then(Value::as_str)
                        .or_else(|| map.get("error").and_then(Value::as_str)),
                ),
            },
            Some(Value::String(text)) => Self {
                pr_url: None,
                message: non_empty(Some(text.as_str())),
            },
            _ => Self::default(),
        }
    }
}

/// Error body shape shared by all endpoints
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    message: Option<String>,
}

/// Pick the most useful text out of a rejection body
///
/// Prefers `error`, then `message`, then a generic notice naming the HTTP code.
pub fn rejection_message(body: &str, status: u16) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    non_empty(parsed.error.as_deref())
        .or_else(|| non_empty(parsed.message.as_deref()))
        .unwrap_or_else(|| format!("request failed with HTTP {}", status))
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
