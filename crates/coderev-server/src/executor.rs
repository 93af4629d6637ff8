//! Agent subprocess execution
//!
//! Builds the agent invocation from an `AskRequest` and runs it under a
//! hard wall-clock deadline, either buffered (one JSON document) or
//! streamed (newline-delimited events relayed in order).
//!
//! Children are spawned with `kill_on_drop`: a deadline expiry drops the
//! wait future and the runaway subprocess is killed rather than leaked.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;

use coderev_core::config::ServerConfig;
use coderev_core::types::{AskRequest, AskResult};

use crate::error::ApiError;

/// Tool capabilities granted to the agent. Read-only inspection only;
/// nothing here can mutate the checkout.
pub const ALLOWED_TOOLS: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "Bash(git diff*)",
    "Bash(git log*)",
    "Bash(git show*)",
    "Bash(git blame*)",
];

/// Terminal sentinel frame closing every event stream
pub const DONE_FRAME: &str = "[DONE]";

/// How long to wait for a well-behaved child to exit after stdout EOF
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Reject requests the agent cannot meaningfully run
pub fn validate(req: &AskRequest) -> Result<(), ApiError> {
    if req.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".into()));
    }
    if req.max_turns == 0 {
        return Err(ApiError::BadRequest("max_turns must be positive".into()));
    }
    Ok(())
}

/// Compose the agent prompt: diff-range directive, then file focus, then
/// the verbatim question.
pub fn build_prompt(req: &AskRequest) -> String {
    let mut parts = Vec::new();
    if let Some(range) = &req.diff_range {
        parts.push(format!("Consider the diff for range `{}`.", range));
    }
    if !req.files.is_empty() {
        parts.push(format!("Focus on these files: {}", req.files.join(", ")));
    }
    parts.push(req.question.clone());
    parts.join("\n\n")
}

/// Build the agent CLI argument list for one request
pub fn build_args(req: &AskRequest, stream: bool) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        build_prompt(req),
        "--allowedTools".to_string(),
        ALLOWED_TOOLS.join(","),
        "--max-turns".to_string(),
        req.max_turns.to_string(),
        "--output-format".to_string(),
        if stream { "stream-json" } else { "json" }.to_string(),
    ];
    if stream {
        // stream-json requires verbose output in print mode
        args.push("--verbose".to_string());
    }
    if let Some(model) = &req.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if let Some(session_id) = &req.session_id {
        args.push("--resume".to_string());
        args.push(session_id.clone());
    }
    args
}

fn agent_command(config: &ServerConfig, req: &AskRequest, stream: bool) -> Command {
    let mut cmd = Command::new(&config.agent_command);
    cmd.args(build_args(req, stream))
        .current_dir(&config.repo_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Run the agent to completion and parse its single JSON result.
///
/// Must be called while holding the execution slot; the elapsed time in
/// the returned result therefore excludes queue wait.
pub async fn run_buffered(config: &ServerConfig, req: &AskRequest) -> Result<AskResult, ApiError> {
    let started = Instant::now();

    let child = agent_command(config, req, false)
        .spawn()
        .map_err(|e| ApiError::UpstreamFailure(format!("failed to start agent: {}", e)))?;

    // Timeout drops the wait future, which drops (and kills) the child.
    let output = match tokio::time::timeout(config.ask_timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ApiError::Internal(e.to_string()))?,
        Err(_) => {
            tracing::warn!("Agent exceeded {:?}, killed", config.ask_timeout);
            return Err(ApiError::UpstreamTimeout(config.ask_timeout));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() && stdout.trim().is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ApiError::UpstreamFailure(excerpt(
            &stderr,
            config.excerpt_len,
        )));
    }

    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|_| ApiError::UpstreamProtocolError(excerpt(&stdout, config.excerpt_len)))?;

    Ok(result_from_json(&value, started.elapsed()))
}

/// Relay a streaming agent run into `tx`, one payload per output line.
///
/// Owns the execution slot permit for the whole stream and releases it
/// only after the terminal [`DONE_FRAME`] is sent, on every exit path:
/// normal EOF, deadline expiry, spawn failure, or the receiver going
/// away.
pub async fn relay_stream(
    config: ServerConfig,
    req: AskRequest,
    permit: OwnedSemaphorePermit,
    tx: mpsc::Sender<String>,
) {
    // Held until this function returns, i.e. past the sentinel send
    let _permit = permit;

    match agent_command(&config, &req, true).spawn() {
        Ok(mut child) => {
            let deadline = Instant::now() + config.stream_timeout;

            if let Some(stdout) = child.stdout.take() {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    tokio::select! {
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                let line = line.trim();
                                if line.is_empty() {
                                    continue;
                                }
                                if tx.send(line.to_string()).await.is_err() {
                                    // Client disconnected; stop the agent
                                    let _ = child.start_kill();
                                    break;
                                }
                            }
                            Ok(None) => {
                                let _ = tokio::time::timeout(REAP_TIMEOUT, child.wait()).await;
                                break;
                            }
                            Err(e) => {
                                tracing::warn!("Agent stdout read failed: {}", e);
                                break;
                            }
                        },
                        _ = tokio::time::sleep_until(deadline) => {
                            tracing::warn!(
                                "Agent stream exceeded {:?}, killing",
                                config.stream_timeout
                            );
                            let _ = child.start_kill();
                            let _ = tx.send(r#"{"error": "timeout"}"#.to_string()).await;
                            break;
                        }
                    }
                }
            }
        }
        Err(e) => {
            let frame = serde_json::json!({"error": format!("failed to start agent: {}", e)});
            let _ = tx.send(frame.to_string()).await;
        }
    }

    let _ = tx.send(DONE_FRAME.to_string()).await;
}

/// Assemble an `AskResult` from the agent's JSON document
fn result_from_json(value: &Value, elapsed: Duration) -> AskResult {
    let answer = value
        .get("result")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            // No result text; surface the agent's failure discriminator
            value
                .get("subtype")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "agent returned no result".to_string());

    let session_id = value
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    AskResult {
        answer,
        session_id,
        usage: extract_usage(value),
        duration_seconds: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
    }
}

/// Pull whichever usage metrics the agent reported into a sparse map.
/// Absent fields are omitted, never defaulted to zero.
fn extract_usage(value: &Value) -> std::collections::BTreeMap<String, Value> {
    let mut usage = std::collections::BTreeMap::new();

    for key in ["total_cost_usd", "cost_usd", "num_turns"] {
        if let Some(v) = value.get(key) {
            usage.insert(key.to_string(), v.clone());
        }
    }

    let token_source = value
        .get("usage")
        .and_then(Value::as_object)
        .map(|nested| Value::Object(nested.clone()));
    let token_source = token_source.as_ref().unwrap_or(value);
    for key in ["input_tokens", "output_tokens"] {
        if let Some(v) = token_source.get(key) {
            usage.insert(key.to_string(), v.clone());
        }
    }

    usage
}

fn excerpt(s: &str, max_len: usize) -> String {
    s.trim().chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderev_core::types::AskRequest;

    #[test]
    fn test_prompt_orders_diff_directive_before_question() {
        let mut req = AskRequest::new("what changed?");
        req.diff_range = Some("main..HEAD".to_string());
        req.files = vec!["src/lib.rs".to_string(), "src/api.rs".to_string()];

        let prompt = build_prompt(&req);
        let diff_pos = prompt.find("main..HEAD").unwrap();
        let files_pos = prompt.find("src/lib.rs").unwrap();
        let question_pos = prompt.find("what changed?").unwrap();
        assert!(diff_pos < files_pos);
        assert!(files_pos < question_pos);
    }

    #[test]
    fn test_prompt_without_directives_is_just_the_question() {
        let req = AskRequest::new("why is this slow?");
        assert_eq!(build_prompt(&req), "why is this slow?");
    }

    #[test]
    fn test_args_grant_only_read_only_tools() {
        let req = AskRequest::new("q");
        let args = build_args(&req, false);
        let tools_idx = args.iter().position(|a| a == "--allowedTools").unwrap();
        let tools = &args[tools_idx + 1];
        assert!(tools.contains("Read"));
        assert!(tools.contains("Bash(git diff*)"));
        assert!(!tools.contains("Write"));
        assert!(!tools.contains("Edit"));
    }

    #[test]
    fn test_args_buffered_vs_stream_format() {
        let req = AskRequest::new("q");
        let buffered = build_args(&req, false);
        assert!(buffered.contains(&"json".to_string()));
        assert!(!buffered.contains(&"--verbose".to_string()));

        let streamed = build_args(&req, true);
        assert!(streamed.contains(&"stream-json".to_string()));
        assert!(streamed.contains(&"--verbose".to_string()));
    }

    #[test]
    fn test_args_carry_resume_and_model() {
        let mut req = AskRequest::new("q");
        req.session_id = Some("sess-42".to_string());
        req.model = Some("sonnet".to_string());
        let args = build_args(&req, false);

        let resume_idx = args.iter().position(|a| a == "--resume").unwrap();
        assert_eq!(args[resume_idx + 1], "sess-42");
        let model_idx = args.iter().position(|a| a == "--model").unwrap();
        assert_eq!(args[model_idx + 1], "sonnet");
    }

    #[test]
    fn test_validate_rejects_empty_question() {
        let req = AskRequest::new("   ");
        assert!(matches!(validate(&req), Err(ApiError::BadRequest(_))));
        assert!(validate(&AskRequest::new("real question")).is_ok());
    }

    #[test]
    fn test_usage_extraction_is_sparse() {
        let value = serde_json::json!({
            "result": "fine",
            "total_cost_usd": 0.03,
            "usage": {"input_tokens": 100}
        });
        let usage = extract_usage(&value);
        assert_eq!(usage.get("total_cost_usd"), Some(&serde_json::json!(0.03)));
        assert_eq!(usage.get("input_tokens"), Some(&serde_json::json!(100)));
        assert!(!usage.contains_key("num_turns"));
        assert!(!usage.contains_key("output_tokens"));
    }

    #[test]
    fn test_answer_falls_back_to_subtype() {
        let value = serde_json::json!({"subtype": "error_max_turns", "num_turns": 10});
        let result = result_from_json(&value, Duration::from_secs(1));
        assert_eq!(result.answer, "error_max_turns");
        let empty = serde_json::json!({});
        assert_eq!(
            result_from_json(&empty, Duration::ZERO).answer,
            "agent returned no result"
        );
    }

    #[test]
    fn test_session_id_passthrough() {
        let value = serde_json::json!({"result": "ok", "session_id": "abc"});
        let result = result_from_json(&value, Duration::from_millis(1500));
        assert_eq!(result.session_id.as_deref(), Some("abc"));
        assert!(result.duration_seconds >= 0.0);
    }
}
