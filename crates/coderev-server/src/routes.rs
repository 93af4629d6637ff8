//! HTTP surface
//!
//! Four route groups:
//! - `GET /health` and `POST /auth-token` are unauthenticated; everything
//!   a client needs before it holds a token.
//! - `/credentials`, `/ask`, `/ask/stream` require the bearer token.
//!
//! Authentication is checked before any slot acquisition, so a queued
//! request never blocks behind an unauthorized one.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use coderev_core::types::{AskRequest, AskResult, HealthReport};

use crate::error::ApiError;
use crate::executor;
use crate::state::AppState;

/// Assemble the full router over shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/credentials", post(set_credentials))
        .route("/ask", post(ask))
        .route("/ask/stream", post(ask_stream))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/auth-token", post(claim_token))
        .merge(protected)
        .with_state(state)
}

/// Reject requests without the exact configured bearer token.
///
/// Missing or malformed header is 401; a well-formed but wrong token is
/// 403, so a client can tell "forgot the header" from "stale token".
async fn require_bearer(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;
    if token != state.auth_token {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}

/// Capture trimmed stdout of a command, or empty on any failure
async fn capture(cmd: &str, args: &[&str], dir: &Path) -> String {
    match Command::new(cmd).args(args).current_dir(dir).output().await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => String::new(),
    }
}

/// Liveness and checkout identity. Degrades to empty fields rather than
/// failing when git or the agent binary is unavailable.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let repo_dir = &state.config.repo_dir;
    let branch = capture("git", &["rev-parse", "--abbrev-ref", "HEAD"], repo_dir).await;
    let commit = capture("git", &["rev-parse", "--short", "HEAD"], repo_dir).await;
    let agent_version = capture(&state.config.agent_command, &["--version"], repo_dir).await;

    Json(HealthReport {
        status: "ok".to_string(),
        repo_dir: repo_dir.display().to_string(),
        branch,
        commit,
        agent_version,
    })
}

/// Hand out the bearer token exactly once
async fn claim_token(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let mut claimed = state.claimed.lock().await;
    if *claimed {
        return Err(ApiError::TokenClaimed);
    }
    *claimed = true;
    info!("Auth token claimed");
    Ok(Json(json!({ "token": state.auth_token })))
}

/// Write passed-through agent credentials to the expected location
async fn set_credentials(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let path = &state.config.credentials_path;
    let payload = serde_json::to_vec_pretty(&json!({ "claudeAiOauth": body }))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }
    tokio::fs::write(path, payload)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }

    info!(path = %path.display(), "Credentials written");
    Ok(Json(json!({ "status": "ok" })))
}

/// Buffered ask: hold the execution slot for the whole agent run
async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResult>, ApiError> {
    executor::validate(&req)?;

    let _permit = state
        .slot
        .acquire()
        .await
        .map_err(|_| ApiError::Internal("execution slot closed".to_string()))?;

    info!(max_turns = req.max_turns, "Running buffered ask");
    let result = executor::run_buffered(&state.config, &req).await?;
    Ok(Json(result))
}

/// Streaming ask: the relay task owns the slot permit and releases it
/// after the terminal sentinel, so a disconnecting client cannot leak it
async fn ask_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    executor::validate(&req)?;

    let permit = state
        .slot
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::Internal("execution slot closed".to_string()))?;

    info!(max_turns = req.max_turns, "Running streaming ask");
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(executor::relay_stream(
        state.config.clone(),
        req,
        permit,
        tx,
    ));

    let stream =
        ReceiverStream::new(rx).map(|payload| Ok(Event::default().data(payload)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::generate_token;
    use coderev_core::config::ServerConfig;
    use std::time::Duration;

    async fn spawn_server(config: ServerConfig) -> (String, String) {
        let token = generate_token();
        let state = Arc::new(AppState::new(config, token.clone()));
        let router = build_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), token)
    }

    #[cfg(unix)]
    fn stub_agent(dir: &tempfile::TempDir, body: &str) -> ServerConfig {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        ServerConfig {
            agent_command: path.to_string_lossy().into_owned(),
            repo_dir: dir.path().to_path_buf(),
            ask_timeout: Duration::from_secs(5),
            stream_timeout: Duration::from_secs(5),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_health_is_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            repo_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let (base, _token) = spawn_server(config).await;

        let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(resp.status(), 200);
        let report: HealthReport = resp.json().await.unwrap();
        assert_eq!(report.status, "ok");
    }

    #[tokio::test]
    async fn test_token_claim_succeeds_exactly_once() {
        let (base, token) = spawn_server(ServerConfig::default()).await;
        let client = reqwest::Client::new();

        let first = client
            .post(format!("{}/auth-token", base))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), 200);
        let body: Value = first.json().await.unwrap();
        assert_eq!(body["token"].as_str().unwrap(), token);

        let second = client
            .post(format!("{}/auth-token", base))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), 410);
    }

    #[tokio::test]
    async fn test_missing_bearer_is_401_wrong_bearer_is_403() {
        let (base, _token) = spawn_server(ServerConfig::default()).await;
        let client = reqwest::Client::new();
        let req_body = json!({"question": "hi"});

        let missing = client
            .post(format!("{}/ask", base))
            .json(&req_body)
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 401);

        let wrong = client
            .post(format!("{}/ask", base))
            .bearer_auth("not-the-token")
            .json(&req_body)
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), 403);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let (base, token) = spawn_server(ServerConfig::default()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/ask", base))
            .bearer_auth(&token)
            .json(&json!({"question": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains("question"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ask_returns_agent_answer() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_agent(&dir, r#"echo '{"result": "approved", "num_turns": 1}'"#);
        let (base, token) = spawn_server(config).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .bearer_auth(&token)
            .json(&json!({"question": "ship it?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let result: AskResult = resp.json().await.unwrap();
        assert_eq!(result.answer, "approved");
        assert_eq!(result.usage.get("num_turns"), Some(&json!(1)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_returns_504_and_frees_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = stub_agent(
            &dir,
            r#"
if [ -e "$(dirname "$0")/ran" ]; then
  echo '{"result": "second run fine"}'
else
  touch "$(dirname "$0")/ran"
  sleep 30
fi
"#,
        );
        config.ask_timeout = Duration::from_millis(300);
        let (base, token) = spawn_server(config).await;
        let client = reqwest::Client::new();

        let timed_out = client
            .post(format!("{}/ask", base))
            .bearer_auth(&token)
            .json(&json!({"question": "slow one"}))
            .send()
            .await
            .unwrap();
        assert_eq!(timed_out.status(), 504);

        // The slot must be free for the next caller
        let next = client
            .post(format!("{}/ask", base))
            .bearer_auth(&token)
            .json(&json!({"question": "fast one"}))
            .send()
            .await
            .unwrap();
        assert_eq!(next.status(), 200);
        let result: AskResult = next.json().await.unwrap();
        assert_eq!(result.answer, "second run fine");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_delivers_frames_in_order_with_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_agent(&dir, "printf '{\"n\":1}\\n{\"n\":2}\\n'");
        let (base, token) = spawn_server(config).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/ask/stream", base))
            .bearer_auth(&token)
            .json(&json!({"question": "stream it"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.text().await.unwrap();

        let frames: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .collect();
        assert_eq!(frames, vec![r#"{"n":1}"#, r#"{"n":2}"#, "[DONE]"]);
    }

    #[tokio::test]
    async fn test_credentials_are_wrapped_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let creds_path = dir.path().join("creds").join("credentials.json");
        let config = ServerConfig {
            repo_dir: dir.path().to_path_buf(),
            credentials_path: creds_path.clone(),
            ..ServerConfig::default()
        };
        let (base, token) = spawn_server(config).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/credentials", base))
            .bearer_auth(&token)
            .json(&json!({"accessToken": "oat-123", "expiresAt": 99}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&creds_path).unwrap()).unwrap();
        assert_eq!(written["claudeAiOauth"]["accessToken"], "oat-123");
        assert_eq!(written["claudeAiOauth"]["expiresAt"], 99);
    }
}
