//! coderev CLI
//!
//! Ask an agent questions about code on any branch via a GitHub
//! Codespace: provision, tunnel, authenticate, ask.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coderev_cli::commands::{self, AskArgs};
use coderev_cli::output::print_error;

#[derive(Parser)]
#[command(name = "coderev")]
#[command(author, version, about = "Ask an agent about code on any branch via GitHub Codespaces")]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about code in REPO on BRANCH
    Ask {
        /// Repository (`owner/repo`)
        repo: String,
        /// Branch to check out
        branch: String,
        /// The question
        question: String,
        /// Files to focus on (repeatable)
        #[arg(short, long = "files")]
        files: Vec<String>,
        /// Git diff range to consider (e.g. main..HEAD)
        #[arg(short, long = "diff")]
        diff_range: Option<String>,
        /// Model override (e.g. sonnet, opus)
        #[arg(short, long)]
        model: Option<String>,
        /// Max agent turns
        #[arg(long, default_value_t = 10)]
        max_turns: u32,
        /// Resume a prior agent session
        #[arg(long)]
        session: Option<String>,
        /// Stream the response as it is produced
        #[arg(long)]
        stream: bool,
    },

    /// List codespaces for REPO
    Status {
        /// Repository (`owner/repo`)
        repo: String,
    },

    /// Stop codespace(s) for REPO, optionally filtered by BRANCH
    Stop {
        /// Repository (`owner/repo`)
        repo: String,
        /// Only stop the codespace on this branch
        branch: Option<String>,
    },

    /// Stop idle codespaces; with --delete, also remove stopped ones
    Cleanup {
        /// Also delete stopped codespaces
        #[arg(long)]
        delete: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let result = match cli.command {
        Commands::Ask {
            repo,
            branch,
            question,
            files,
            diff_range,
            model,
            max_turns,
            session,
            stream,
        } => {
            commands::ask(
                &repo,
                &branch,
                AskArgs {
                    question,
                    files,
                    diff_range,
                    model,
                    max_turns,
                    session_id: session,
                    stream,
                },
            )
            .await
        }
        Commands::Status { repo } => commands::status(&repo).await,
        Commands::Stop { repo, branch } => commands::stop(&repo, branch.as_deref()).await,
        Commands::Cleanup { delete } => commands::cleanup(delete).await,
    };

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
