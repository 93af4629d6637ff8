//! Command implementations
//!
//! Each subcommand lives in its own module and returns
//! `Result<(), ClientError>`; main maps errors to colored output and a
//! non-zero exit.

mod ask;
mod cleanup;
mod status;
mod stop;

pub use ask::{ask, AskArgs};
pub use cleanup::cleanup;
pub use status::status;
pub use stop::stop;

use coderev_client::auth::github_token;
use coderev_client::CodespaceManager;
use coderev_core::config::{load_client_config, ClientConfig};
use coderev_core::error::ClientError;

/// Resolve config and a GitHub-authenticated codespace manager
pub(crate) async fn manager() -> Result<(CodespaceManager, ClientConfig), ClientError> {
    let config = load_client_config()?;
    let token = github_token().await?;
    let mgr = CodespaceManager::new(&token, config.clone())?;
    Ok((mgr, config))
}
