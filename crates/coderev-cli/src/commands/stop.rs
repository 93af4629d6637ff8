//! The `stop` command: stop running codespaces for a repository

use coderev_core::error::ClientError;
use coderev_core::types::SessionState;

use crate::output::print_info;

/// Stop every Available codespace for `repo`, optionally restricted to
/// one branch
pub async fn stop(repo: &str, branch: Option<&str>) -> Result<(), ClientError> {
    let (mgr, _config) = super::manager().await?;

    let codespaces = mgr.list_for_repo(repo).await?;
    let mut stopped = 0;
    for cs in codespaces {
        if let Some(branch) = branch {
            if cs.branch() != branch {
                continue;
            }
        }
        if cs.session_state() == SessionState::Available {
            print_info(&format!("Stopping {} ({})...", cs.name, cs.branch()));
            mgr.stop(&cs.name).await?;
            stopped += 1;
        }
    }

    println!("Stopped {} codespace(s).", stopped);
    Ok(())
}
