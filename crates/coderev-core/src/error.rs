//! Core error types for coderev
//!
//! Every failure category the client can hit maps to its own variant so
//! callers can branch on the kind (poll again, abort, re-authenticate)
//! instead of pattern-matching on message strings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the coderev client side
#[derive(Error, Debug)]
pub enum ClientError {
    /// Codespace lifecycle error
    #[error("Codespace error: {0}")]
    Codespace(#[from] CodespaceError),

    /// Tunnel process error
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// Auth handshake error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// In-codespace API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Codespace-lifecycle errors
#[derive(Error, Debug)]
pub enum CodespaceError {
    /// Management API request failed (transport or HTTP status)
    #[error("Management API request failed: {0}")]
    Api(String),

    /// Codespace did not reach Available within the deadline
    #[error("Codespace {name} did not become Available within {waited:?} (last state: {last_state})")]
    BootTimeout {
        name: String,
        last_state: String,
        waited: Duration,
    },

    /// Codespace not found by name
    #[error("Codespace not found: {0}")]
    NotFound(String),

    /// API response did not carry an expected field
    #[error("Unexpected management API response: {0}")]
    Unexpected(String),
}

/// Tunnel-process errors
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Tunnel subprocess exited immediately after spawn
    #[error("Tunnel process exited during startup: {stderr}")]
    StartFailed { stderr: String },

    /// Spawning or signalling the tunnel process failed
    #[error("Tunnel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Auth-handshake errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// The one-time claim endpoint reported the token as already claimed
    #[error("Auth token already claimed by another client")]
    AlreadyClaimed,

    /// Token already claimed and no local cache entry exists.
    ///
    /// Terminal: the in-codespace server must be restarted to mint a new
    /// token.
    #[error(
        "Auth token already claimed and not in local cache. \
         Restart the codespace server to generate a new token."
    )]
    CredentialsUnavailable,

    /// Claim request failed for a reason other than "already claimed"
    #[error("Auth token claim failed: {0}")]
    Http(String),

    /// Token cache read/write failed
    #[error("Token cache error: {0}")]
    Cache(#[from] std::io::Error),

    /// No GitHub token could be resolved
    #[error("No GitHub token found. Set GITHUB_TOKEN or run `gh auth login`.")]
    NoGithubToken,

    /// No local agent OAuth credentials to pass through
    #[error("No agent OAuth credentials found. Run `claude /login` first.")]
    NoAgentCredentials,
}

/// In-codespace API client errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server did not answer the health probe within the deadline
    #[error("Server not ready within {waited:?}. Last error: {last_error}")]
    NotReady { waited: Duration, last_error: String },

    /// Transport-level request failure
    #[error("Request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("Server returned {code}: {detail}")]
    Status { code: u16, detail: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_wraps_each_concern() {
        let e: ClientError = CodespaceError::NotFound("cs-1".to_string()).into();
        assert!(matches!(e, ClientError::Codespace(_)));

        let e: ClientError = TunnelError::StartFailed {
            stderr: "boom".to_string(),
        }
        .into();
        assert!(matches!(e, ClientError::Tunnel(_)));

        let e: ClientError = AuthError::AlreadyClaimed.into();
        assert!(matches!(e, ClientError::Auth(_)));

        let e: ClientError = ApiError::Http("connection refused".to_string()).into();
        assert!(matches!(e, ClientError::Api(_)));

        let e: ClientError = ConfigError::Invalid("bad port".to_string()).into();
        assert!(matches!(e, ClientError::Config(_)));
    }

    #[test]
    fn test_messages_name_the_failing_concern() {
        let e: ClientError = CodespaceError::NotFound("cs-1".to_string()).into();
        assert!(e.to_string().contains("cs-1"));
        assert!(e.to_string().contains("Codespace"));
    }
}
