//! The `ask` command: the full provisioning-to-answer pipeline
//!
//! Find or create a codespace, tunnel to it, wait for the server, do the
//! token handshake, pass local agent credentials through, then run the
//! question buffered or streamed. The tunnel is torn down on every exit
//! path, including errors after it opened.

use serde_json::Value;

use coderev_client::api::ApiClient;
use coderev_client::auth::{agent_credentials, get_auth_token};
use coderev_client::Tunnel;
use coderev_core::error::ClientError;
use coderev_core::token_cache::TokenCache;
use coderev_core::types::{AskRequest, AskResult};

use crate::output::{print_info, print_success, print_warning};

/// Everything `ask` needs beyond repo and branch
pub struct AskArgs {
    pub question: String,
    pub files: Vec<String>,
    pub diff_range: Option<String>,
    pub model: Option<String>,
    pub max_turns: u32,
    pub session_id: Option<String>,
    pub stream: bool,
}

pub async fn ask(repo: &str, branch: &str, args: AskArgs) -> Result<(), ClientError> {
    let (mgr, config) = super::manager().await?;

    print_info(&format!("Finding codespace for {}@{}...", repo, branch));
    let cs_name = mgr
        .find_or_create(repo, branch, |msg| print_info(msg))
        .await?;
    print_success(&format!("Codespace ready: {}", cs_name));

    let mut tunnel = Tunnel::new(&cs_name, &config);
    tunnel.open().await?;

    // Everything past this point must not leak the tunnel process
    let result = run_ask(&tunnel, &cs_name, &config, &args).await;
    if let Err(e) = tunnel.close().await {
        print_warning(&format!("Tunnel teardown failed: {}", e));
    }
    result
}

async fn run_ask(
    tunnel: &Tunnel,
    cs_name: &str,
    config: &coderev_core::config::ClientConfig,
    args: &AskArgs,
) -> Result<(), ClientError> {
    let base_url = tunnel.local_url();

    print_info("Waiting for server...");
    let probe = ApiClient::new(base_url.as_str(), "", config.clone());
    let health = probe.wait_until_ready().await?;

    let cache = TokenCache::new();
    let auth_token = get_auth_token(&base_url, cs_name, &cache).await?;
    let client = ApiClient::new(base_url.as_str(), auth_token, config.clone());

    print_success(&format!(
        "Server ready -- repo: {}, branch: {}, commit: {}",
        health.repo_dir, health.branch, health.commit
    ));

    // Best effort: the codespace may already hold valid credentials
    match agent_credentials().await {
        Ok(creds) => client.set_credentials(&creds).await?,
        Err(e) => print_warning(&format!("Skipping credential passthrough: {}", e)),
    }

    let req = AskRequest {
        question: args.question.clone(),
        files: args.files.clone(),
        diff_range: args.diff_range.clone(),
        model: args.model.clone(),
        max_turns: args.max_turns,
        session_id: args.session_id.clone(),
    };

    if args.stream {
        ask_streamed(&client, &req).await
    } else {
        ask_buffered(&client, &req).await
    }
}

async fn ask_buffered(client: &ApiClient, req: &AskRequest) -> Result<(), ClientError> {
    print_info("Agent is thinking...");
    let result = client.ask(req).await?;

    println!();
    println!("{}", result.answer);
    println!();
    println!("{}", format_footer(&result));
    Ok(())
}

async fn ask_streamed(client: &ApiClient, req: &AskRequest) -> Result<(), ClientError> {
    client
        .ask_stream(req, |payload| {
            for text in assistant_text(payload) {
                print!("{}", text);
            }
        })
        .await?;
    println!();
    Ok(())
}

/// Pull printable assistant text blocks out of one stream event.
/// Non-JSON payloads and other event types produce nothing.
fn assistant_text(payload: &str) -> Vec<String> {
    let Ok(event) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };
    if event.get("type").and_then(Value::as_str) != Some("assistant") {
        return Vec::new();
    }
    event
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// One-line run summary: duration, then cost and turns when reported
fn format_footer(result: &AskResult) -> String {
    let mut parts = vec![format!("{}s", result.duration_seconds)];
    for key in ["cost_usd", "total_cost_usd"] {
        if let Some(cost) = result.usage.get(key).and_then(Value::as_f64) {
            parts.push(format!("${:.4}", cost));
            break;
        }
    }
    if let Some(turns) = result.usage.get("num_turns").and_then(Value::as_u64) {
        parts.push(format!("{} turns", turns));
    }
    parts.join(" | ")
}
