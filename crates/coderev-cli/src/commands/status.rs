//! The `status` command: list codespaces for one repository

use coderev_core::error::ClientError;

use crate::output::format_codespaces;

pub async fn status(repo: &str) -> Result<(), ClientError> {
    let (mgr, _config) = super::manager().await?;

    let codespaces = mgr.list_for_repo(repo).await?;
    if codespaces.is_empty() {
        println!("No codespaces found for {}", repo);
        return Ok(());
    }

    println!("{}", format_codespaces(&codespaces));
    Ok(())
}
