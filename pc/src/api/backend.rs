//! Backend trait definition

use async_trait::async_trait;

use super::{ClientError, EnhanceRequest, EnhanceResponse, SubmitRequest, SubmitResponse, TaskStatusResponse};

/// Transport to the transformation service
///
/// Each method maps one endpoint. Implementations report HTTP 401 as
/// [`ClientError::AuthRequired`], any other non-2xx as [`ClientError::ServerRejected`],
/// a missing response as [`ClientError::Network`] and an undecodable body as
/// [`ClientError::MalformedResponse`]. Judging whether a decoded body is usable is
/// left to the callers.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /api/enhance`
    async fn enhance(&self, request: EnhanceRequest) -> Result<EnhanceResponse, ClientError>;

    /// `POST /api/submit`
    async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, ClientError>;

    /// `GET /api/task_status/{job_id}`
    async fn task_status(&self, job_id: &str) -> Result<TaskStatusResponse, ClientError>;

    /// `GET /logout`
    async fn logout(&self) -> Result<(), ClientError>;
}
