//! HTTP transport to the transformation service
//!
//! Credentials travel in a cookie jar seeded from the configured session cookie;
//! the client never builds an authorization header of its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::rejection_message;
use super::{Backend, ClientError, EnhanceRequest, EnhanceResponse, SubmitRequest, SubmitResponse, TaskStatusResponse};
use crate::config::{ServerConfig, SessionConfig};

/// Backend client speaking HTTP with cookie-based session credentials
pub struct HttpBackend {
    server: ServerConfig,
    base: Url,
    http: Client,
}

impl HttpBackend {
    /// Create a new client from configuration
    ///
    /// `session_cookie` is the raw cookie value (without the name), usually taken
    /// from [`SessionConfig::resolve_cookie`].
    pub fn new(server: &ServerConfig, session: &SessionConfig, session_cookie: Option<&str>) -> Result<Self, ClientError> {
        debug!(base_url = %server.base_url, has_cookie = session_cookie.is_some(), "HttpBackend::new: called");
        let base = Url::parse(&server.base_url)
            .map_err(|e| ClientError::validation(format!("Invalid server URL '{}': {}", server.base_url, e)))?;

        let jar = Arc::new(Jar::default());
        if let Some(value) = session_cookie {
            debug!(cookie_name = %session.cookie_name, "HttpBackend::new: seeding session cookie");
            jar.add_cookie_str(&format!("{}={}", session.cookie_name, value), &base);
        }

        // Login and logout answer with redirects we never want to follow
        let mut builder = Client::builder().cookie_provider(jar).redirect(Policy::none());
        if let Some(timeout_ms) = server.request_timeout_ms {
            debug!(timeout_ms, "HttpBackend::new: applying request timeout");
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let http = builder.build()?;

        Ok(Self {
            server: server.clone(),
            base,
            http,
        })
    }

    /// Status URL for a job; the id always stays one percent-encoded path segment
    fn task_status_url(&self, job_id: &str) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::validation(format!("Server URL '{}' cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(["api", "task_status", job_id]);
        Ok(url)
    }

    /// Classify a response and decode its JSON body
    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        debug!(%status, "read_json: called");

        if status == StatusCode::UNAUTHORIZED {
            debug!("read_json: unauthorized (401)");
            return Err(ClientError::AuthRequired);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(&body, status.as_u16());
            debug!(%status, %message, "read_json: rejected");
            return Err(ClientError::ServerRejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn enhance(&self, request: EnhanceRequest) -> Result<EnhanceResponse, ClientError> {
        let url = self.server.endpoint("/api/enhance");
        debug!(%url, prompt_len = request.prompt.len(), "enhance: called");
        let response = self.http.post(&url).json(&request).send().await?;
        Self::read_json(response).await
    }

    async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, ClientError> {
        let url = self.server.endpoint("/api/submit");
        debug!(%url, repo_url = %request.repo_url, "submit: called");
        let response = self.http.post(&url).json(&request).send().await?;
        Self::read_json(response).await
    }

    async fn task_status(&self, job_id: &str) -> Result<TaskStatusResponse, ClientError> {
        let url = self.task_status_url(job_id)?;
        debug!(%url, "task_status: called");
        let response = self.http.get(url).send().await?;
        Self::read_json(response).await
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let url = self.server.logout_url();
        debug!(%url, "logout: called");
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status.is_success() || status.is_redirection() {
            debug!(%status, "logout: session cleared");
            return Ok(());
        }

        if status == StatusCode::UNAUTHORIZED {
            debug!("logout: unauthorized (401)");
            return Err(ClientError::AuthRequired);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(%status, "logout: server refused");
        Err(ClientError::ServerRejected {
            status: status.as_u16(),
            message: rejection_message(&body, status.as_u16()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer exactly one request on a local port with a canned response
    ///
    /// Returns the base URL to point a backend at and a handle yielding the raw
    /// request the server received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&received[..end]).to_lowercase();
                    let content_length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if received.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&received).into_owned()
        });

        (format!("http://{}", addr), handle)
    }

    fn backend_for(base_url: &str) -> HttpBackend {
        let server = ServerConfig {
            base_url: base_url.to_string(),
            request_timeout_ms: Some(5_000),
        };
        HttpBackend::new(&server, &SessionConfig::default(), Some("octo-session")).unwrap()
    }

    fn submit_request() -> SubmitRequest {
        SubmitRequest {
            repo_url: "https://github.com/octo/app".to_string(),
            task_description: "Add CI".to_string(),
        }
    }

    #[test]
    fn test_new_with_default_config() {
        let backend = HttpBackend::new(&ServerConfig::default(), &SessionConfig::default(), None);
        assert!(backend.is_ok());
    }

    #[test]
    fn test_new_with_cookie_and_timeout() {
        let server = ServerConfig {
            base_url: "https://parivartan.example.com".to_string(),
            request_timeout_ms: Some(30_000),
        };
        let backend = HttpBackend::new(&server, &SessionConfig::default(), Some("eyJ1c2VyIjoib2N0byJ9"));
        assert!(backend.is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let server = ServerConfig {
            base_url: "not a url".to_string(),
            request_timeout_ms: None,
        };
        let result = HttpBackend::new(&server, &SessionConfig::default(), None);
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Port 9 (discard) on localhost is closed on any sane test machine
        let server = ServerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: Some(2_000),
        };
        let backend = HttpBackend::new(&server, &SessionConfig::default(), None).unwrap();
        let result = backend.task_status("job-1").await;
        assert!(matches!(result, Err(ClientError::Network(_))));
    }

    #[tokio::test]
    async fn test_401_is_auth_required() {
        let (base, server) = serve_once("HTTP/1.1 401 UNAUTHORIZED", r#"{"error": "Unauthorized"}"#).await;

        let result = backend_for(&base).task_status("job-1").await;

        assert_eq!(result, Err(ClientError::AuthRequired));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_400_carries_error_text() {
        let (base, server) = serve_once(
            "HTTP/1.1 400 BAD REQUEST",
            r#"{"error": "Repository URL and task description are required."}"#,
        )
        .await;

        let result = backend_for(&base).submit(submit_request()).await;

        assert_eq!(
            result,
            Err(ClientError::ServerRejected {
                status: 400,
                message: "Repository URL and task description are required.".to_string()
            })
        );
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/submit HTTP/1.1"));
        assert!(request.contains(r#""task_description":"Add CI""#));
    }

    #[tokio::test]
    async fn test_500_carries_message_text() {
        let (base, server) = serve_once(
            "HTTP/1.1 500 INTERNAL SERVER ERROR",
            r#"{"status": "ERROR", "message": "Error 111 connecting to localhost:6379. Connection refused."}"#,
        )
        .await;

        let result = backend_for(&base).task_status("job-1").await;

        assert_eq!(
            result,
            Err(ClientError::ServerRejected {
                status: 500,
                message: "Error 111 connecting to localhost:6379. Connection refused.".to_string()
            })
        );
        assert!(result.unwrap_err().is_transient());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_2xx_is_malformed() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", "not json").await;

        let result = backend_for(&base)
            .enhance(EnhanceRequest {
                prompt: "Add CI".to_string(),
            })
            .await;

        assert!(matches!(result, Err(ClientError::MalformedResponse(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_status_request_sends_session_cookie() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"status": "PENDING"}"#).await;

        let response = backend_for(&base).task_status("job-1").await.unwrap();

        assert_eq!(response.status.as_deref(), Some("PENDING"));
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/task_status/job-1 HTTP/1.1"));
        assert!(request.to_lowercase().contains("cookie: session=octo-session"));
    }

    #[tokio::test]
    async fn test_job_id_is_one_encoded_segment() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"status": "PENDING"}"#).await;

        backend_for(&base).task_status("abc#frag").await.unwrap();

        let request = server.await.unwrap();
        assert!(
            request.starts_with("GET /api/task_status/abc%23frag HTTP/1.1"),
            "unexpected request: {}",
            request
        );
    }

    #[test]
    fn test_task_status_url_encoding() {
        let backend = backend_for("http://127.0.0.1:5001/");

        let url = backend.task_status_url("a/b?c#d").unwrap();
        assert_eq!(url.path(), "/api/task_status/a%2Fb%3Fc%23d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let prefixed = backend_for("https://parivartan.example.com/service");
        assert_eq!(
            prefixed.task_status_url("c0ffee").unwrap().as_str(),
            "https://parivartan.example.com/service/api/task_status/c0ffee"
        );
    }

    #[tokio::test]
    async fn test_logout_accepts_redirect() {
        let (base, server) = serve_once("HTTP/1.1 302 FOUND\r\nLocation: http://localhost:3000", "").await;

        assert_eq!(backend_for(&base).logout().await, Ok(()));
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /logout HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_logout_401_is_auth_required() {
        let (base, server) = serve_once("HTTP/1.1 401 UNAUTHORIZED", "").await;

        assert_eq!(backend_for(&base).logout().await, Err(ClientError::AuthRequired));
        server.await.unwrap();
    }
}
