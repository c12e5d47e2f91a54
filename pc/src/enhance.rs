//! Prompt enhancement
//!
//! One request, one response: the goal goes to the service and, on success,
//! comes back rewritten. Nothing is retried automatically.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::api::{Backend, ClientError, EnhanceRequest};
use crate::auth::AuthGate;

/// The user's modernization goal, owned by the UI layer
///
/// Replacement is atomic, so overlapping enhancements never interleave text:
/// whichever response resolves last is what the goal ends up holding.
#[derive(Debug, Clone, Default)]
pub struct Goal {
    text: Arc<Mutex<String>>,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Arc::new(Mutex::new(text.into())),
        }
    }

    /// Snapshot of the current text
    pub fn get(&self) -> String {
        self.lock().clone()
    }

    /// Replace the whole text
    pub fn replace(&self, text: impl Into<String>) {
        *self.lock() = text.into();
    }

    pub fn is_blank(&self) -> bool {
        self.lock().trim().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.text.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sends goals to the enhancement endpoint
pub struct PromptEnhancer {
    backend: Arc<dyn Backend>,
    gate: AuthGate,
}

impl PromptEnhancer {
    pub fn new(backend: Arc<dyn Backend>, gate: AuthGate) -> Self {
        debug!("PromptEnhancer::new: called");
        Self { backend, gate }
    }

    /// Ask the service for an improved version of `goal`
    pub async fn enhance(&self, goal: &str) -> Result<String, ClientError> {
        debug!(goal_len = goal.len(), "enhance: called");
        if goal.trim().is_empty() {
            debug!("enhance: empty goal");
            return Err(ClientError::validation("Please enter a goal to enhance."));
        }
        self.gate.check()?;

        let request = EnhanceRequest {
            prompt: goal.to_string(),
        };
        let response = self.gate.observe(self.backend.enhance(request).await)?;

        match response.success {
            Some(true) => {}
            Some(false) => {
                let message = response
                    .error
                    .or(response.message)
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Failed to enhance prompt.".to_string());
                debug!(%message, "enhance: server reported failure");
                return Err(ClientError::ServerRejected { status: 200, message });
            }
            None => {
                debug!("enhance: missing success flag");
                return Err(ClientError::MalformedResponse(
                    "enhance response has no success flag".to_string(),
                ));
            }
        }

        match response.enhanced_prompt {
            Some(text) if !text.trim().is_empty() => {
                info!(enhanced_len = text.len(), "Prompt enhanced");
                Ok(text)
            }
            _ => {
                debug!("enhance: missing enhanced_prompt");
                Err(ClientError::MalformedResponse(
                    "enhance response has no enhanced_prompt".to_string(),
                ))
            }
        }
    }

    /// Enhance the goal in place, replacing its text end-to-end on success
    ///
    /// On failure the goal is left untouched.
    pub async fn enhance_goal(&self, goal: &Goal) -> Result<(), ClientError> {
        let current = goal.get();
        let enhanced = self.enhance(&current).await?;
        goal.replace(enhanced);
        Ok(())
    }
}
