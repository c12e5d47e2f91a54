//! Authentication gate
//!
//! The client's belief about whether the cookie-backed session is authorized.
//! It starts optimistic and is only ever corrected by the backend answering 401;
//! nothing here talks to the network.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::api::{Backend, ClientError};

/// Shared session state consulted before every protected action
///
/// Cloning is cheap and every clone observes the same session.
#[derive(Debug, Clone)]
pub struct AuthGate {
    authenticated: Arc<AtomicBool>,
    login_url: String,
}

impl AuthGate {
    /// Create a gate that assumes the session is valid until told otherwise
    pub fn new(login_url: impl Into<String>) -> Self {
        let login_url = login_url.into();
        debug!(%login_url, "AuthGate::new: called");
        Self {
            authenticated: Arc::new(AtomicBool::new(true)),
            login_url,
        }
    }

    /// Current belief about the session
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Record that the backend refused our credentials
    pub fn mark_unauthenticated(&self) {
        if self.authenticated.swap(false, Ordering::SeqCst) {
            info!("Session is no longer authenticated");
        } else {
            debug!("mark_unauthenticated: already unauthenticated");
        }
    }

    /// Fail with [`ClientError::AuthRequired`] unless the session is believed valid
    pub fn check(&self) -> Result<(), ClientError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            debug!("check: session unauthenticated, refusing protected action");
            Err(ClientError::AuthRequired)
        }
    }

    /// Pass a backend result through, flipping the session on an authorization failure
    pub fn observe<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ClientError::AuthRequired) = &result {
            self.mark_unauthenticated();
        }
        result
    }

    /// The login navigation target
    pub fn login(&self) -> LoginRedirect {
        debug!(url = %self.login_url, "login: called");
        LoginRedirect {
            url: self.login_url.clone(),
        }
    }

    /// End the session on the server and locally
    ///
    /// The local session is dropped even when the server cannot be reached.
    pub async fn logout(&self, backend: &dyn Backend) -> Result<(), ClientError> {
        debug!("logout: called");
        let result = backend.logout().await;
        self.mark_unauthenticated();
        result
    }
}

/// Where the user has to go to (re)establish a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    pub url: String,
}

impl fmt::Display for LoginRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Log in with GitHub at {}", self.url)
    }
}
