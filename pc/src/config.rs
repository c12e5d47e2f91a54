//! Parivartan configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service endpoint configuration
    pub server: ServerConfig,

    /// Session cookie configuration
    pub session: SessionConfig,

    /// Job polling configuration
    pub polling: PollingConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.server.base_url)
            .context(format!("Invalid server base-url '{}'", self.server.base_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(eyre::eyre!(
                "Server base-url must use http or https, got '{}'",
                url.scheme()
            ));
        }

        if self.polling.interval_ms == 0 {
            return Err(eyre::eyre!("polling interval-ms must be greater than zero"));
        }

        if self.polling.max_polls == Some(0) {
            return Err(eyre::eyre!("polling max-polls must be greater than zero when set"));
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .parivartan.yml
        let local_config = PathBuf::from(".parivartan.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/parivartan/parivartan.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("parivartan").join("parivartan.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed here; the full [`Config::load`] reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".parivartan.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("parivartan").join("parivartan.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|path| path.exists())
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Service endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the service (scheme, host, port)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds; unset means wait indefinitely
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001".to_string(),
            request_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    /// Absolute URL for an endpoint path
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Where the browser must go to start the login flow
    pub fn login_url(&self) -> String {
        self.endpoint("/login")
    }

    /// Endpoint that clears the server-side session
    pub fn logout_url(&self) -> String {
        self.endpoint("/logout")
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie set by the service
    #[serde(rename = "cookie-name")]
    pub cookie_name: String,

    /// Environment variable holding the session cookie value
    #[serde(rename = "cookie-env")]
    pub cookie_env: String,

    /// Session cookie value stored in the config file (the environment wins)
    pub cookie: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            cookie_env: "PARIVARTAN_SESSION".to_string(),
            cookie: None,
        }
    }
}

impl SessionConfig {
    /// Resolve the session cookie value from the process environment
    pub fn resolve_cookie(&self) -> Option<String> {
        self.resolve_cookie_with(|name| std::env::var(name).ok())
    }

    /// Resolve the session cookie value using a custom variable lookup
    pub fn resolve_cookie_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |value: String| Some(value.trim().to_string()).filter(|v| !v.is_empty());
        lookup(&self.cookie_env)
            .and_then(non_blank)
            .or_else(|| self.cookie.clone().and_then(non_blank))
    }
}

/// Job polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between the answer to one poll and the next poll, in milliseconds
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Stop watching a job after this many polls; unset means never give up
    #[serde(rename = "max-polls")]
    pub max_polls: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_polls: None,
        }
    }
}

impl PollingConfig {
    /// Get the poll interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
