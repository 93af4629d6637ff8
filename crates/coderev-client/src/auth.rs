//! Auth token handshake and GitHub token resolution
//!
//! The in-codespace server mints its bearer token at startup and exposes
//! it over the network exactly once. The handshake always tries the claim
//! first (it succeeds if the server just started), persists a won token,
//! and otherwise falls back to the local cache. Losing the claim with no
//! cache entry is terminal; only a server restart mints a new token.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use coderev_core::error::AuthError;
use coderev_core::token_cache::TokenCache;

/// Timeout for the claim request
const CLAIM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Resolve the bearer token for a codespace, racing a fresh claim against
/// the persisted cache.
pub async fn get_auth_token(
    base_url: &str,
    codespace_name: &str,
    cache: &TokenCache,
) -> Result<String, AuthError> {
    match claim_auth_token(base_url).await {
        Ok(token) => {
            // Persist before returning so a later client restart can win
            cache.save(codespace_name, &token)?;
            Ok(token)
        }
        Err(AuthError::AlreadyClaimed) => {
            tracing::debug!("Auth token already claimed, falling back to cache");
            cache
                .load(codespace_name)
                .ok_or(AuthError::CredentialsUnavailable)
        }
        Err(e) => Err(e),
    }
}

/// Claim the one-time auth token from the server.
///
/// HTTP 410 is the distinguished "already claimed" signal; any other
/// non-success status or transport failure propagates as [`AuthError::Http`].
pub async fn claim_auth_token(base_url: &str) -> Result<String, AuthError> {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/auth-token", base_url))
        .timeout(CLAIM_TIMEOUT)
        .send()
        .await
        .map_err(|e| AuthError::Http(e.to_string()))?;

    match resp.status() {
        StatusCode::GONE => Err(AuthError::AlreadyClaimed),
        status if status.is_success() => {
            let body: TokenResponse = resp
                .json()
                .await
                .map_err(|e| AuthError::Http(format!("malformed claim response: {}", e)))?;
            Ok(body.token)
        }
        status => Err(AuthError::Http(format!(
            "unexpected status {} from claim endpoint",
            status
        ))),
    }
}

/// Resolve a GitHub token from the environment or the `gh` CLI
pub async fn github_token() -> Result<String, AuthError> {
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.is_empty() {
                return Ok(token);
            }
        }
    }

    if let Ok(output) = tokio::process::Command::new("gh")
        .args(["auth", "token"])
        .output()
        .await
    {
        if output.status.success() {
            let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !token.is_empty() {
                return Ok(token);
            }
        }
    }

    Err(AuthError::NoGithubToken)
}

/// Read the local agent's OAuth credentials for passthrough to the
/// codespace.
///
/// macOS keeps them in the keychain; elsewhere they live in
/// `~/.claude/.credentials.json`. Returns the inner `claudeAiOauth`
/// object.
pub async fn agent_credentials() -> Result<serde_json::Value, AuthError> {
    if cfg!(target_os = "macos") {
        if let Ok(output) = tokio::process::Command::new("security")
            .args(["find-generic-password", "-s", "Claude Code-credentials", "-w"])
            .output()
            .await
        {
            if output.status.success() {
                let raw = String::from_utf8_lossy(&output.stdout);
                if let Ok(data) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
                    if let Some(oauth) = data.get("claudeAiOauth") {
                        return Ok(oauth.clone());
                    }
                }
            }
        }
    } else if let Some(home) = dirs::home_dir() {
        let path = home.join(".claude").join(".credentials.json");
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            if let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) {
                if let Some(oauth) = data.get("claudeAiOauth") {
                    return Ok(oauth.clone());
                }
            }
        }
    }

    Err(AuthError::NoAgentCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_fresh_claim_persists_to_cache() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth-token");
                then.status(200)
                    .json_body(serde_json::json!({"token": "fresh-token"}));
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());

        let token = get_auth_token(&server.base_url(), "cs-1", &cache)
            .await
            .unwrap();
        assert_eq!(token, "fresh-token");
        assert_eq!(cache.load("cs-1").as_deref(), Some("fresh-token"));
    }

    #[tokio::test]
    async fn test_already_claimed_falls_back_to_cache() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth-token");
                then.status(410)
                    .json_body(serde_json::json!({"detail": "Auth token already claimed"}));
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());
        cache.save("cs-1", "cached-token").unwrap();

        let token = get_auth_token(&server.base_url(), "cs-1", &cache)
            .await
            .unwrap();
        assert_eq!(token, "cached-token");
    }

    #[tokio::test]
    async fn test_already_claimed_without_cache_is_terminal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth-token");
                then.status(410);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());

        let err = get_auth_token(&server.base_url(), "cs-1", &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialsUnavailable));
    }

    #[tokio::test]
    async fn test_unexpected_status_is_not_treated_as_claimed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth-token");
                then.status(500);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::with_dir(dir.path());
        // Even with a cached token, a 500 must propagate, not fall back
        cache.save("cs-1", "cached-token").unwrap();

        let err = get_auth_token(&server.base_url(), "cs-1", &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Http(_)));
    }
}
