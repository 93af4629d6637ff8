//! coderev server daemon
//!
//! Runs inside the codespace next to the repository checkout. Serves the
//! agent HTTP API and prints the one-time auth token to its log so the
//! codespace bootstrap can capture it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coderev_core::config::ServerConfig;
use coderev_server::state::generate_token;
use coderev_server::{build_router, AppState};

#[derive(Parser)]
#[command(name = "coderev-server")]
#[command(about = "In-codespace agent execution server")]
#[command(version)]
struct Args {
    /// Bind address (overrides REPO_DIR/PORT environment defaults)
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Repository checkout the agent inspects
    #[arg(long)]
    repo_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(repo_dir) = args.repo_dir {
        config.repo_dir = repo_dir;
    }

    if !config.repo_dir.is_dir() {
        anyhow::bail!("repo dir {:?} does not exist", config.repo_dir);
    }

    // The bootstrap may inject a token; otherwise mint one
    let auth_token = match std::env::var("AUTH_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => {
            let token = generate_token();
            tracing::info!("Minted new auth token (claim it via POST /auth-token)");
            token
        }
    };

    let addr = config.bind_addr();
    tracing::info!(repo_dir = %config.repo_dir.display(), "coderev server starting on {}", addr);

    let state = Arc::new(AppState::new(config, auth_token));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .await
        .context("Server terminated")?;

    Ok(())
}
