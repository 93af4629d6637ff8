//! Server-side configuration
//!
//! The in-codespace server is configured through the environment (the
//! codespace bootstrap exports `REPO_DIR` and optionally `AUTH_TOKEN` and
//! `PORT`) rather than a config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the in-codespace coderev server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_address: String,

    /// Port to listen on
    pub port: u16,

    /// Repository checkout the agent inspects
    pub repo_dir: PathBuf,

    /// Agent command to invoke
    pub agent_command: String,

    /// Hard deadline for a buffered agent run
    #[serde(with = "duration_secs")]
    pub ask_timeout: Duration,

    /// Hard deadline for a streaming agent run.
    ///
    /// Shorter than `ask_timeout`: streaming callers are interactive.
    #[serde(with = "duration_secs")]
    pub stream_timeout: Duration,

    /// Maximum length of stderr/stdout excerpts surfaced in errors
    pub excerpt_len: usize,

    /// Where /credentials writes the passed-through credential material
    pub credentials_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8976,
            repo_dir: PathBuf::from("."),
            agent_command: "claude".to_string(),
            ask_timeout: Duration::from_secs(120),
            stream_timeout: Duration::from_secs(90),
            excerpt_len: 500,
            credentials_path: dirs::home_dir()
                .unwrap_or_default()
                .join(".claude")
                .join(".credentials.json"),
        }
    }
}

impl ServerConfig {
    /// Build a config from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("REPO_DIR") {
            config.repo_dir = PathBuf::from(dir);
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        config
    }

    /// Socket address string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_deadline_shorter_than_buffered() {
        let config = ServerConfig::default();
        assert!(config.stream_timeout < config.ask_timeout);
    }

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8976");
    }
}
