//! HTTP client for the in-codespace coderev server
//!
//! Talks to the server through the tunnel: readiness probing, credential
//! pass-through, buffered asks, and SSE stream consumption.

use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use tokio::time::Instant;

use coderev_core::config::ClientConfig;
use coderev_core::error::ApiError;
use coderev_core::types::{AskRequest, AskResult, HealthReport};

/// Timeout for a single health probe
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the credentials write
const CREDENTIALS_TIMEOUT: Duration = Duration::from_secs(10);

/// One complete SSE frame's payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A `data:` payload, verbatim
    Data(String),
    /// The literal `[DONE]` terminator
    Done,
}

/// Incremental parser for SSE byte streams.
///
/// Frames are separated by a blank line; a frame's payload is the joined
/// `data:` lines. Feeding may return zero or more complete frames; partial
/// frames stay buffered until the separator arrives.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: String,
}

impl SseFrameParser {
    /// Feed arbitrary bytes into the parser and drain complete frames
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut frames = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" {
                    frames.push(SseFrame::Done);
                } else {
                    frames.push(SseFrame::Data(payload));
                }
            }
        }

        frames
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

/// Client for the coderev server reachable at one base URL
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
    config: ClientConfig,
}

impl ApiClient {
    /// Client for `base_url` authenticating with `auth_token`.
    ///
    /// An empty token is valid for the unauthenticated endpoints only.
    pub fn new(
        base_url: impl Into<String>,
        auth_token: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Poll `/health` until the server answers or the deadline passes.
    ///
    /// The timeout error carries the last connect error for diagnosis.
    pub async fn wait_until_ready(&self) -> Result<HealthReport, ApiError> {
        let deadline = Instant::now() + self.config.health_timeout;
        let mut last_error = String::from("no response");

        loop {
            match self
                .http
                .get(self.url("/health"))
                .timeout(HEALTH_PROBE_TIMEOUT)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(health) => return Ok(health),
                    Err(e) => last_error = e.to_string(),
                },
                Ok(resp) => last_error = format!("status {}", resp.status()),
                Err(e) => last_error = e.to_string(),
            }

            if Instant::now() >= deadline {
                return Err(ApiError::NotReady {
                    waited: self.config.health_timeout,
                    last_error,
                });
            }
            tokio::time::sleep(self.config.health_interval).await;
        }
    }

    /// Pass credential material through to the server, verbatim
    pub async fn set_credentials(&self, credentials: &serde_json::Value) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url("/credentials"))
            .bearer_auth(&self.auth_token)
            .json(credentials)
            .timeout(CREDENTIALS_TIMEOUT)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        check_success(resp).await?;
        Ok(())
    }

    /// Submit a buffered ask and wait for the single structured result
    pub async fn ask(&self, req: &AskRequest) -> Result<AskResult, ApiError> {
        let resp = self
            .http
            .post(self.url("/ask"))
            .bearer_auth(&self.auth_token)
            .json(req)
            .timeout(self.config.ask_timeout)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        let resp = check_success(resp).await?;
        resp.json().await.map_err(|e| ApiError::Http(e.to_string()))
    }

    /// Submit a streaming ask, handing each event payload to `on_event`
    /// verbatim and in order. Returns when the `[DONE]` sentinel arrives
    /// or the stream ends.
    pub async fn ask_stream<F>(&self, req: &AskRequest, mut on_event: F) -> Result<(), ApiError>
    where
        F: FnMut(&str),
    {
        let resp = self
            .http
            .post(self.url("/ask/stream"))
            .bearer_auth(&self.auth_token)
            .json(req)
            .timeout(self.config.ask_timeout)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        let resp = check_success(resp).await?;

        let mut stream = resp.bytes_stream();
        let mut parser = SseFrameParser::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::Http(e.to_string()))?;
            for frame in parser.feed(&chunk) {
                match frame {
                    SseFrame::Done => return Ok(()),
                    SseFrame::Data(payload) => on_event(&payload),
                }
            }
        }

        Ok(())
    }
}

/// Map a non-success response to `ApiError::Status`, pulling the server's
/// `detail` field out of the body when present.
async fn check_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let detail = match resp.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("detail")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_string(),
        Err(_) => String::new(),
    };

    Err(ApiError::Status {
        code: status.as_u16(),
        detail: if detail.is_empty() {
            status
                .canonical_reason()
                .unwrap_or_else(|| status_fallback(status))
                .to_string()
        } else {
            detail
        },
    })
}

fn status_fallback(status: StatusCode) -> &'static str {
    if status.is_server_error() {
        "server error"
    } else {
        "request rejected"
    }
}
