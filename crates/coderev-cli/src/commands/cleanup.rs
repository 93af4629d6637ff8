//! The `cleanup` command: stop idle codespaces across all repositories

use coderev_core::error::ClientError;
use coderev_core::types::SessionState;

use crate::output::print_info;

/// Stop every Available codespace; with `delete`, also remove stopped
/// ones
pub async fn cleanup(delete: bool) -> Result<(), ClientError> {
    let (mgr, _config) = super::manager().await?;

    let codespaces = mgr.list_all().await?;
    let mut stopped = 0;
    let mut deleted = 0;

    for cs in codespaces {
        match cs.session_state() {
            SessionState::Available => {
                print_info(&format!("Stopping {}...", cs.name));
                mgr.stop(&cs.name).await?;
                stopped += 1;
            }
            state if state.is_stopped() && delete => {
                print_info(&format!("Deleting {}...", cs.name));
                mgr.delete(&cs.name).await?;
                deleted += 1;
            }
            _ => {}
        }
    }

    println!("Stopped {}, deleted {} codespace(s).", stopped, deleted);
    Ok(())
}
